use super::{SessionId, ID_BYTES, ID_LENGTH};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;

/// A type with the ability to generate session ids.
pub trait IdGenerator {
    /// Generate a fresh session id.
    fn generate_id(&mut self) -> SessionId;
}

/// The default id generator with focus on security.
/// It draws [`ID_BYTES`] bytes from [`rand::thread_rng`], which is cryptographically secure,
/// and encodes them with the standard base64 alphabet.
/// This gives 6 bits of entropy per character.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn generate_id(&mut self) -> SessionId {
        let mut bytes = [0; ID_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        SessionId::new_unchecked(STANDARD.encode(bytes))
    }
}

/// A debug id generator that generates an ascending sequence of integers, formatted as strings padded with zeroes.
///
/// **This generator is predictable and must be used in tests only.**
#[derive(Debug, Default, Clone)]
#[allow(missing_copy_implementations)]
pub struct DebugIdGenerator {
    next_index: usize,
}

impl DebugIdGenerator {
    /// Create a debug id generator whose first id encodes `first_index`.
    pub fn starting_at(first_index: usize) -> Self {
        Self {
            next_index: first_index,
        }
    }
}

impl IdGenerator for DebugIdGenerator {
    fn generate_id(&mut self) -> SessionId {
        let id = format!("{:0width$}", self.next_index, width = ID_LENGTH);
        self.next_index += 1;
        SessionId::new_unchecked(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_ids_ascend() {
        let mut generator = DebugIdGenerator::starting_at(7);
        assert_eq!(
            generator.generate_id().as_str(),
            "00000000000000000000000000000007"
        );
        assert_eq!(
            generator.generate_id().as_str(),
            "00000000000000000000000000000008"
        );
    }
}
