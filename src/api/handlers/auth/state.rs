//! Session authenticator configuration.

const DEFAULT_SESSION_TTL_SECONDS: i64 = 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    session_ttl_seconds: i64,
    refresh_ttl_seconds: Option<i64>,
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            refresh_ttl_seconds: None,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    /// Refresh tokens never expire unless a TTL is set here.
    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: Option<i64>) -> Self {
        self.refresh_ttl_seconds = seconds;
        self
    }

    pub(crate) fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    pub(crate) fn refresh_ttl_seconds(&self) -> Option<i64> {
        self.refresh_ttl_seconds
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthConfig, DEFAULT_SESSION_TTL_SECONDS};

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new();

        assert_eq!(config.session_ttl_seconds(), DEFAULT_SESSION_TTL_SECONDS);
        assert_eq!(config.refresh_ttl_seconds(), None);

        let config = config
            .with_session_ttl_seconds(3600)
            .with_refresh_ttl_seconds(Some(604_800));

        assert_eq!(config.session_ttl_seconds(), 3600);
        assert_eq!(config.refresh_ttl_seconds(), Some(604_800));
    }

    #[test]
    fn auth_config_default_matches_new() {
        let config = AuthConfig::default();
        assert_eq!(
            config.session_ttl_seconds(),
            AuthConfig::new().session_ttl_seconds()
        );
    }
}
