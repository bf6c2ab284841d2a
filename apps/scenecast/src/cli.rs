//! Command-line surface for the `scenecast` binary.

use clap::{Args, Parser};

use crate::telemetry::logging::{LogConfig, LogLevel};

#[derive(Debug, Parser)]
#[command(
    name = "scenecast",
    about = "Screen-share sender: negotiates a WebRTC session over a websocket relay",
    version
)]
pub struct Cli {
    /// Signaling relay endpoint (ws:// or wss://).
    #[arg(value_name = "SIGNALING_URL", env = "SCENECAST_SIGNALING_URL")]
    pub signaling_url: String,

    #[command(flatten)]
    pub logging: LoggingArgs,
}

#[derive(Debug, Args)]
pub struct LoggingArgs {
    /// Log verbosity.
    #[arg(long = "log-level", value_enum, default_value_t = LogLevel::Info, env = "SCENECAST_LOG_LEVEL")]
    pub log_level: LogLevel,

    /// Append logs to this file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", env = "SCENECAST_LOG_FILE")]
    pub log_file: Option<std::path::PathBuf>,
}

impl LoggingArgs {
    pub fn to_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level,
            file: self.log_file.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_url_and_logging_flags() {
        let cli = Cli::try_parse_from([
            "scenecast",
            "wss://relay.example.net/ws",
            "--log-level",
            "debug",
            "--log-file",
            "/tmp/scenecast.log",
        ])
        .unwrap();
        assert_eq!(cli.signaling_url, "wss://relay.example.net/ws");
        assert_eq!(cli.logging.log_level, LogLevel::Debug);
        assert_eq!(
            cli.logging.log_file.as_deref(),
            Some(std::path::Path::new("/tmp/scenecast.log"))
        );
    }

    #[test]
    fn url_is_required() {
        assert!(Cli::try_parse_from(["scenecast"]).is_err());
    }
}
