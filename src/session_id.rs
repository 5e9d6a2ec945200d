use std::fmt::{Debug, Formatter};

pub(crate) mod generator;

/// The number of random bytes in a session id.
/// It is divisible by three, such that the base64 encoding has no padding.
pub const ID_BYTES: usize = 24;

/// The length of an encoded session id, in characters.
pub const ID_LENGTH: usize = ID_BYTES / 3 * 4;

/// The type of the key under which drivers are expected to store a session.
pub type StorageKey = [u8; blake3::OUT_LEN];

/// A syntactically valid session id.
///
/// A session id is exactly [`ID_LENGTH`] characters long and consists only of characters of the
/// base64 alphabet `A-Z a-z 0-9 + /`. Values are only ever constructed by validating untrusted
/// input with [`SessionId::from_token`], or by an [`IdGenerator`](generator::IdGenerator).
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Validate an inbound token, e.g. the value of a session cookie.
    ///
    /// Returns `None` if the token has the wrong length or contains a character outside the
    /// alphabet. Invalid tokens are never repaired.
    ///
    /// ```rust
    /// # use locking_session::{SessionId, ID_LENGTH};
    /// assert!(SessionId::from_token(&"a".repeat(ID_LENGTH)).is_some());
    /// assert!(SessionId::from_token(&"a".repeat(ID_LENGTH - 1)).is_none());
    /// assert!(SessionId::from_token(&"-".repeat(ID_LENGTH)).is_none());
    /// ```
    pub fn from_token(token: &str) -> Option<Self> {
        if token.len() == ID_LENGTH && token.bytes().all(is_id_character) {
            Some(Self(token.to_owned()))
        } else {
            None
        }
    }

    /// Returns the token, as it should be sent to the client.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Applies a cryptographic hash function on the token to obtain the key a driver stores the
    /// session under. This way, the contents of a session store do not reveal valid cookies.
    pub fn storage_key(&self) -> StorageKey {
        blake3::hash(self.0.as_bytes()).into()
    }

    pub(crate) fn new_unchecked(token: String) -> Self {
        debug_assert!(
            Self::from_token(&token).is_some(),
            "generated an invalid session id"
        );
        Self(token)
    }
}

fn is_id_character(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'+' || byte == b'/'
}

impl Debug for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // Never print the token itself.
        let hex = blake3::hash(self.0.as_bytes()).to_hex();
        write!(f, "SessionId({}..)", &hex.as_str()[..8])
    }
}

/// The association between a session handle and a session id.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub enum IdBinding {
    /// No id was ever associated, e.g. for a new visitor.
    #[default]
    Unset,
    /// A previously bound id was found to map to no data, or its session was destroyed.
    /// It is treated as absent for all further writes.
    Expired,
    /// A valid, active id.
    Bound(SessionId),
}

impl IdBinding {
    /// Bind the given inbound token if it is a valid session id, otherwise leave the binding unset.
    pub fn from_inbound_token(token: Option<&str>) -> Self {
        token
            .and_then(SessionId::from_token)
            .map_or(Self::Unset, Self::Bound)
    }

    /// Returns the bound id, if any.
    pub fn bound(&self) -> Option<&SessionId> {
        match self {
            Self::Bound(id) => Some(id),
            Self::Unset | Self::Expired => None,
        }
    }

    /// Returns true if an id is bound.
    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Bound(_))
    }
}
