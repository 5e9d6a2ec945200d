use crate::{IdBinding, SessionConfig};

/// The per-request state shared between a [`SessionHandle`](crate::SessionHandle) and the
/// enclosing request/response layer.
///
/// The context holds the inputs of the session (driver and configuration) as well as its
/// outputs: the cookie command for the response, and the ttl chosen by the last save.
/// It belongs to a single request; the session handle borrows it mutably for its whole lifetime.
#[derive(Debug)]
pub struct RequestContext<D> {
    pub(crate) driver: D,
    pub(crate) config: SessionConfig,
    pub(crate) cookie_command: SessionCookieCommand,
    pub(crate) persisted_ttl: Option<u64>,
}

/// Indicates how the client's session cookie should be updated by the response.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub enum SessionCookieCommand {
    /// Set the session cookie.
    Set {
        /// The name of the session cookie.
        name: String,
        /// The value of the session cookie.
        value: String,
        /// The path of the session cookie.
        path: String,
        /// The max-age of the session cookie in seconds, or `None` if the cookie should live
        /// until the browser is closed.
        max_age: Option<u64>,
    },
    /// Delete the session cookie.
    Delete {
        /// The name of the session cookie.
        name: String,
        /// The path of the session cookie.
        path: String,
    },
    /// Leave the session cookie as it is.
    #[default]
    DoNothing,
}

impl<D> RequestContext<D> {
    /// Create the context for a request.
    pub fn new(driver: D, config: SessionConfig) -> Self {
        Self {
            driver,
            config,
            cookie_command: SessionCookieCommand::DoNothing,
            persisted_ttl: None,
        }
    }

    /// Returns the session driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Returns the session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns how the response should update the session cookie.
    /// This reflects the last id change of the session during this request.
    pub fn cookie_command(&self) -> &SessionCookieCommand {
        &self.cookie_command
    }

    /// Returns the ttl in seconds that was sent to the driver by the last successful save
    /// during this request.
    pub fn persisted_ttl(&self) -> Option<u64> {
        self.persisted_ttl
    }

    /// Consume the context, returning the cookie command for the response.
    pub fn into_cookie_command(self) -> SessionCookieCommand {
        self.cookie_command
    }

    /// Records an id change for the response layer.
    pub(crate) fn publish_id(&mut self, id: &IdBinding) {
        self.cookie_command = match id {
            IdBinding::Bound(id) => SessionCookieCommand::Set {
                name: self.config.name.clone(),
                value: id.as_str().to_owned(),
                path: self.config.path.clone(),
                max_age: self.config.cookie_max_age(),
            },
            IdBinding::Expired => SessionCookieCommand::Delete {
                name: self.config.name.clone(),
                path: self.config.path.clone(),
            },
            IdBinding::Unset => SessionCookieCommand::DoNothing,
        };
    }
}
