//! Login credentials and connection configuration.

/// Credentials presented during the SASL exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Login {
    /// User name.
    pub user: String,
    /// Password.
    pub password: String,
}

impl Login {
    /// Create a login from a user/password pair.
    #[must_use]
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    /// The `PLAIN` mechanism response: NUL, user, NUL, password.
    #[must_use]
    pub(crate) fn plain_response(&self) -> Vec<u8> {
        let mut response = Vec::with_capacity(self.user.len() + self.password.len() + 2);
        response.push(0);
        response.extend_from_slice(self.user.as_bytes());
        response.push(0);
        response.extend_from_slice(self.password.as_bytes());
        response
    }
}

impl Default for Login {
    /// The conventional broker default account.
    fn default() -> Self { Self::new("guest", "guest") }
}

/// Everything the engine needs to bring a connection up.
///
/// The tune values are *proposals*: the handshake caps them against what the
/// server offers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Credentials for the SASL exchange.
    pub login: Login,
    /// Virtual host to open.
    pub vhost: String,
    /// Proposed channel limit; 0 leaves it to the server.
    pub channel_max: u16,
    /// Proposed maximum total frame size; 0 leaves it to the server.
    pub frame_max: u32,
    /// Proposed heartbeat interval in seconds; 0 asks for none.
    pub heartbeat: u16,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            login: Login::default(),
            vhost: "/".to_owned(),
            channel_max: 2047,
            frame_max: 131_072,
            heartbeat: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Login;

    #[test]
    fn plain_response_is_nul_delimited() {
        let login = Login::new("alice", "secret");
        assert_eq!(login.plain_response(), b"\0alice\0secret");
    }

    #[test]
    fn default_login_is_guest() {
        assert_eq!(Login::default(), Login::new("guest", "guest"));
    }
}
