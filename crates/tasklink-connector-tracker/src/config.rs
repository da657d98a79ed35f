//! Tracker adapter configuration.

use tasklink_connector::error::{ConnectorError, ConnectorResult};

/// Configuration for [`crate::TrackerClient`].
#[derive(Clone)]
pub struct TrackerConfig {
    /// Base URL of the tracker REST API.
    pub base_url: String,
    /// API token, sent verbatim in the Authorization header.
    pub api_token: String,
    /// Workspace id whose members form the assignee directory.
    pub team_id: String,
    /// Case-insensitive substring identifying the intake list in a space.
    pub list_name_filter: String,
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Per-request read timeout in seconds.
    pub read_timeout_secs: u64,
}

impl TrackerConfig {
    /// Create a configuration with default timeouts and intake-list filter.
    pub fn new(
        base_url: impl Into<String>,
        api_token: impl Into<String>,
        team_id: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: api_token.into(),
            team_id: team_id.into(),
            list_name_filter: "support ticket form".to_string(),
            connect_timeout_secs: 10,
            read_timeout_secs: 30,
        }
    }

    /// Validate the configuration before building a client.
    pub fn validate(&self) -> ConnectorResult<()> {
        if !self.base_url.starts_with("http") {
            return Err(ConnectorError::invalid_configuration(format!(
                "tracker base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.api_token.is_empty() {
            return Err(ConnectorError::invalid_configuration(
                "tracker api_token must not be empty",
            ));
        }
        if self.team_id.is_empty() {
            return Err(ConnectorError::invalid_configuration(
                "tracker team_id must not be empty",
            ));
        }
        Ok(())
    }
}

// Token never appears in logs.
impl std::fmt::Debug for TrackerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &"***")
            .field("team_id", &self.team_id)
            .field("list_name_filter", &self.list_name_filter)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("read_timeout_secs", &self.read_timeout_secs)
            .finish()
    }
}
