//! CRM adapter configuration.

use tasklink_connector::error::{ConnectorError, ConnectorResult};

/// Configuration for [`crate::CrmClient`].
#[derive(Clone)]
pub struct CrmConfig {
    /// Base URL of the CRM REST API.
    pub base_url: String,
    /// API token, sent as a bearer credential.
    pub api_token: String,
    /// Base URL of the CRM web UI, used to build record deep links.
    pub portal_url: String,
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Per-request read timeout in seconds.
    pub read_timeout_secs: u64,
}

impl CrmConfig {
    /// Create a configuration with default timeouts.
    pub fn new(
        base_url: impl Into<String>,
        api_token: impl Into<String>,
        portal_url: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: api_token.into(),
            portal_url: portal_url.into(),
            connect_timeout_secs: 10,
            read_timeout_secs: 30,
        }
    }

    /// Validate the configuration before building a client.
    pub fn validate(&self) -> ConnectorResult<()> {
        if !self.base_url.starts_with("http") {
            return Err(ConnectorError::invalid_configuration(format!(
                "CRM base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.api_token.is_empty() {
            return Err(ConnectorError::invalid_configuration(
                "CRM api_token must not be empty",
            ));
        }
        Ok(())
    }
}

// Token never appears in logs.
impl std::fmt::Debug for CrmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrmConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &"***")
            .field("portal_url", &self.portal_url)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("read_timeout_secs", &self.read_timeout_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_rejects_bad_config() {
        assert!(CrmConfig::new("https://crm.example.com", "tok", "https://app.example.com")
            .validate()
            .is_ok());
        assert!(CrmConfig::new("crm.example.com", "tok", "https://app.example.com")
            .validate()
            .is_err());
        assert!(CrmConfig::new("https://crm.example.com", "", "https://app.example.com")
            .validate()
            .is_err());
    }

    #[test]
    fn debug_redacts_token() {
        let config = CrmConfig::new("https://crm.example.com", "secret-token", "https://app");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret-token"));
    }
}
