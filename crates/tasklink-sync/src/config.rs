//! Reconciliation worker configuration.

/// Tunables for the reconciliation worker.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Wait window before re-checking an unsynced object, in seconds.
    ///
    /// Sized to exceed the typical latency between "task created downstream"
    /// and "registry record written", so a burst of property-change events
    /// does not trigger a storm of duplicate creations.
    pub recheck_window_secs: u64,

    /// How far back the update pass looks in property history, in seconds.
    pub history_window_secs: i64,

    /// Tracker list receiving created tasks when company routing fails.
    pub fallback_list_id: String,

    /// Custom field on tracker tasks holding the CRM record URL, if set.
    pub backref_field_id: Option<String>,

    /// Tag applied to tasks mirrored from tickets.
    pub ticket_tag: String,

    /// Tag applied when the description embeds a media-share clip.
    pub clip_tag: String,
}

impl SyncConfig {
    /// Create a configuration with default windows and tags.
    pub fn new(fallback_list_id: impl Into<String>) -> Self {
        Self {
            recheck_window_secs: 30,
            history_window_secs: 300,
            fallback_list_id: fallback_list_id.into(),
            backref_field_id: None,
            ticket_tag: "Ticket".to_string(),
            clip_tag: "Fathom".to_string(),
        }
    }

    /// Override the recheck wait window.
    #[must_use]
    pub fn with_recheck_window_secs(mut self, secs: u64) -> Self {
        self.recheck_window_secs = secs;
        self
    }

    /// Override the history lookback window.
    #[must_use]
    pub fn with_history_window_secs(mut self, secs: i64) -> Self {
        self.history_window_secs = secs;
        self
    }

    /// Set the back-reference custom field id.
    #[must_use]
    pub fn with_backref_field(mut self, field_id: impl Into<String>) -> Self {
        self.backref_field_id = Some(field_id.into());
        self
    }
}
