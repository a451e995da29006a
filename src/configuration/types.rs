use serde::Deserialize;

/// Container engine tunables.
///
/// `app_label` is the ownership label stamped on every container this
/// service creates; any enumeration of "our" containers filters on it
/// before trusting the remaining labels.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Image used when a launch request does not name one.
    pub default_image: String,
    /// Value of the `app` ownership label.
    pub app_label: String,
    /// Containers older than this are removed by the periodic sweep.
    pub container_max_age_secs: u64,
    /// Interval between container age sweeps.
    pub cleanup_interval_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            default_image: "kalilinux/kali-rolling".to_string(),
            app_label: "arena".to_string(),
            container_max_age_secs: 2 * 60 * 60,
            cleanup_interval_secs: 5 * 60,
        }
    }
}

/// Terminal session tunables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Hard session lifetime from creation.
    pub ttl_secs: u64,
    /// Interval between expiry sweeps.
    pub sweep_interval_secs: u64,
    /// Stop the bound container when the sweep closes a session.
    pub stop_on_expiry: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            ttl_secs: 2 * 60 * 60,
            sweep_interval_secs: 60,
            stop_on_expiry: true,
        }
    }
}

/// Matchmaking and duel tunables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DuelConfig {
    /// Queue entries expire after this long without being paired.
    pub queue_ttl_secs: u64,
    /// Direct challenges expire after this long without a response.
    pub challenge_ttl_secs: u64,
    /// Rating delta applied symmetrically when a winner is set.
    pub default_score_change: i64,
}

impl Default for DuelConfig {
    fn default() -> Self {
        DuelConfig {
            queue_ttl_secs: 5 * 60,
            challenge_ttl_secs: 24 * 60 * 60,
            default_score_change: 25,
        }
    }
}
