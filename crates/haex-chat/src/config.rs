use std::time::Duration;

/// Tunables for the chat stores. `Default` matches the platform's shipped
/// behavior; `from_env` lets deployments override individual knobs.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Size of the initial history window (most recent N messages).
    pub history_limit: usize,
    /// Attempts for initial list/history fetches before the error is
    /// retained as state.
    pub fetch_attempts: u32,
    /// A send still unresolved after this long is rolled back and reported
    /// as failed.
    pub send_timeout: Duration,
    /// Sender-side typing self-stop after this much keyboard inactivity.
    pub typing_self_timeout: Duration,
    /// Receiver-side expiry for typing entries that were never followed by
    /// a stop broadcast.
    pub typing_expiry: Duration,
    /// Cadence of the receiver-side expiry sweep.
    pub typing_sweep_interval: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: 50,
            fetch_attempts: 2,
            send_timeout: Duration::from_secs(15),
            typing_self_timeout: Duration::from_secs(3),
            typing_expiry: Duration::from_secs(5),
            typing_sweep_interval: Duration::from_secs(1),
        }
    }
}

impl ChatConfig {
    /// Reads `HAEX_*` overrides, falling back to defaults for anything
    /// unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            history_limit: parse_usize(
                std::env::var("HAEX_HISTORY_LIMIT").ok(),
                defaults.history_limit,
            ),
            fetch_attempts: parse_u32(
                std::env::var("HAEX_FETCH_ATTEMPTS").ok(),
                defaults.fetch_attempts,
            ),
            send_timeout: parse_millis(
                std::env::var("HAEX_SEND_TIMEOUT_MS").ok(),
                defaults.send_timeout,
            ),
            typing_self_timeout: parse_millis(
                std::env::var("HAEX_TYPING_SELF_TIMEOUT_MS").ok(),
                defaults.typing_self_timeout,
            ),
            typing_expiry: parse_millis(
                std::env::var("HAEX_TYPING_EXPIRY_MS").ok(),
                defaults.typing_expiry,
            ),
            typing_sweep_interval: parse_millis(
                std::env::var("HAEX_TYPING_SWEEP_MS").ok(),
                defaults.typing_sweep_interval,
            ),
        }
    }
}

fn parse_usize(raw: Option<String>, default: usize) -> usize {
    raw.and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_u32(raw: Option<String>, default: u32) -> u32 {
    raw.and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_millis(raw: Option<String>, default: Duration) -> Duration {
    raw.and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}
