//! Process configuration from environment variables.

use std::time::Duration;

use crate::media::QualityPreset;

pub const POLL_INTERVAL_ENV: &str = "SCENECAST_POLL_INTERVAL_MS";
pub const ANSWER_TIMEOUT_ENV: &str = "SCENECAST_ANSWER_TIMEOUT_SECS";
pub const STUN_SERVER_ENV: &str = "SCENECAST_STUN_SERVER";

const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_ANSWER_TIMEOUT_SECS: u64 = 30;
const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

#[derive(Debug, Clone)]
pub struct Config {
    /// Display geometry sampling interval.
    pub poll_interval: Duration,
    /// How long an offer may wait for its answer before the session
    /// gives up.
    pub answer_timeout: Duration,
    /// STUN server for the transport engine; `None` disables STUN.
    pub stun_server: Option<String>,
    /// Quality ladder from best to worst; viewer lower/raise requests
    /// step through it.
    pub quality_ladder: Vec<QualityPreset>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            answer_timeout: Duration::from_secs(DEFAULT_ANSWER_TIMEOUT_SECS),
            stun_server: Some(DEFAULT_STUN_SERVER.to_string()),
            quality_ladder: default_quality_ladder(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ms) = parse_env_u64(POLL_INTERVAL_ENV) {
            config.poll_interval = Duration::from_millis(ms.max(100));
        }
        if let Some(secs) = parse_env_u64(ANSWER_TIMEOUT_ENV) {
            config.answer_timeout = Duration::from_secs(secs.max(1));
        }
        if let Ok(value) = std::env::var(STUN_SERVER_ENV) {
            let trimmed = value.trim();
            config.stun_server = if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            };
        }
        config
    }
}

pub fn default_quality_ladder() -> Vec<QualityPreset> {
    vec![
        QualityPreset {
            width: 1920,
            height: 1080,
            bitrate_bps: 2_500_000,
        },
        QualityPreset {
            width: 1280,
            height: 720,
            bitrate_bps: 1_200_000,
        },
        QualityPreset {
            width: 854,
            height: 480,
            bitrate_bps: 600_000,
        },
    ]
}

fn parse_env_u64(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(target = "config", env = name, value = %raw, "ignoring unparseable value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use std::sync::Mutex;

    // Env vars are process-global; serialize the tests that touch them.
    static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    fn clear_env() {
        for name in [POLL_INTERVAL_ENV, ANSWER_TIMEOUT_ENV, STUN_SERVER_ENV] {
            unsafe { std::env::remove_var(name) };
        }
    }

    #[test]
    fn defaults_when_env_is_empty() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();

        let config = Config::from_env();
        assert_eq!(config.poll_interval, Duration::from_millis(1_000));
        assert_eq!(config.answer_timeout, Duration::from_secs(30));
        assert_eq!(config.stun_server.as_deref(), Some(DEFAULT_STUN_SERVER));
        assert_eq!(config.quality_ladder.len(), 3);
    }

    #[test]
    fn env_overrides_apply() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe {
            std::env::set_var(POLL_INTERVAL_ENV, "250");
            std::env::set_var(ANSWER_TIMEOUT_ENV, "5");
            std::env::set_var(STUN_SERVER_ENV, "stun:stun.example.net:3478");
        }

        let config = Config::from_env();
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.answer_timeout, Duration::from_secs(5));
        assert_eq!(
            config.stun_server.as_deref(),
            Some("stun:stun.example.net:3478")
        );
        clear_env();
    }

    #[test]
    fn empty_stun_server_disables_stun() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe { std::env::set_var(STUN_SERVER_ENV, "  ") };

        let config = Config::from_env();
        assert_eq!(config.stun_server, None);
        clear_env();
    }

    #[test]
    fn garbage_numbers_fall_back_to_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe { std::env::set_var(ANSWER_TIMEOUT_ENV, "soon") };

        let config = Config::from_env();
        assert_eq!(config.answer_timeout, Duration::from_secs(30));
        clear_env();
    }
}
