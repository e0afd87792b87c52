use std::{net::SocketAddr, time::Duration};

use anyhow::{ensure, Context, Result};
use clap::{builder::BoolishValueParser, Parser, ValueEnum};

use crate::message_log::DEFAULT_MESSAGE_LIMIT;

const DEFAULT_CHUNK_BUFFER: usize = 16;
const DEFAULT_LOG_FILTER: &str = "info";

/// How `letter`/`send` requests carrying an outdated submission sequence are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum StalePolicy {
    /// Ignore requests whose sequence no longer matches the connection.
    #[default]
    Reject,
    /// Apply every request regardless of the sequence it carries.
    Accept,
}

/// Engine settings shared by the broadcaster, sessions and endpoints.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub message_limit: usize,
    pub chunk_buffer: usize,
    pub stale_policy: StalePolicy,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            message_limit: DEFAULT_MESSAGE_LIMIT,
            chunk_buffer: DEFAULT_CHUNK_BUFFER,
            stale_policy: StalePolicy::default(),
        }
    }
}

/// Logging and span export settings consumed by [`crate::telemetry::Telemetry::init`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Used when `RUST_LOG` is unset.
    pub log_filter: String,
    pub otel_stdout: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            otel_stdout: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub metrics_addr: Option<SocketAddr>,
    pub shutdown_grace: Duration,
    pub chat: ChatConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Parser)]
#[command(
    name = "css-chat",
    author,
    version,
    about = "Chat server whose only client-side logic is following links"
)]
pub struct Cli {
    /// Address to bind the chat listener to.
    #[arg(long, env = "CSS_CHAT_LISTEN_ADDR", default_value = "0.0.0.0:3000")]
    listen_addr: String,

    /// Number of most recent messages kept and shown to every client.
    #[arg(long, env = "CSS_CHAT_MESSAGE_LIMIT", default_value_t = DEFAULT_MESSAGE_LIMIT)]
    message_limit: usize,

    /// Rendered chunks buffered per client before its session waits on the socket.
    #[arg(long, env = "CSS_CHAT_CHUNK_BUFFER", default_value_t = DEFAULT_CHUNK_BUFFER)]
    chunk_buffer: usize,

    /// Treatment of interaction links replayed from an outdated chunk.
    #[arg(long, env = "CSS_CHAT_STALE_POLICY", value_enum, default_value_t = StalePolicy::Reject)]
    stale_policy: StalePolicy,

    /// Optional address serving Prometheus metrics and a health check.
    #[arg(long, env = "CSS_CHAT_METRICS_ADDR")]
    metrics_addr: Option<String>,

    /// Grace period applied during shutdown.
    #[arg(long, env = "CSS_CHAT_SHUTDOWN_GRACE_SECS", default_value_t = 2)]
    shutdown_grace_secs: u64,

    /// Log filter directives applied when RUST_LOG is unset.
    #[arg(long, env = "CSS_CHAT_LOG", default_value = DEFAULT_LOG_FILTER)]
    log_filter: String,

    /// Export tracing spans to stdout through OpenTelemetry.
    #[arg(long, env = "CSS_CHAT_OTEL_STDOUT", value_parser = BoolishValueParser::new())]
    otel_stdout: bool,
}

impl TryFrom<Cli> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let listen_addr: SocketAddr = cli
            .listen_addr
            .parse()
            .with_context(|| format!("invalid listen address: {}", cli.listen_addr))?;
        let metrics_addr = cli
            .metrics_addr
            .as_deref()
            .map(|raw| {
                raw.parse::<SocketAddr>()
                    .with_context(|| format!("invalid metrics address: {raw}"))
            })
            .transpose()?;
        ensure!(cli.message_limit >= 1, "message limit must be at least 1");
        ensure!(cli.chunk_buffer >= 1, "chunk buffer must be at least 1");

        Ok(ServerConfig {
            listen_addr,
            metrics_addr,
            shutdown_grace: Duration::from_secs(cli.shutdown_grace_secs),
            chat: ChatConfig {
                message_limit: cli.message_limit,
                chunk_buffer: cli.chunk_buffer,
                stale_policy: cli.stale_policy,
            },
            telemetry: TelemetryConfig {
                log_filter: cli.log_filter,
                otel_stdout: cli.otel_stdout,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<ServerConfig> {
        let mut argv = vec!["css-chat"];
        argv.extend_from_slice(args);
        ServerConfig::try_from(Cli::try_parse_from(argv)?)
    }

    #[test_timeout::timeout]
    fn defaults_match_reference_server() {
        let config = parse(&[]).expect("defaults parse");
        assert_eq!(config.listen_addr.port(), 3000);
        assert_eq!(config.chat.message_limit, 10);
        assert_eq!(config.chat.stale_policy, StalePolicy::Reject);
        assert!(config.metrics_addr.is_none());
        assert_eq!(config.telemetry, TelemetryConfig::default());
    }

    #[test_timeout::timeout]
    fn telemetry_flags_reach_config() {
        let config = parse(&["--otel-stdout", "--log-filter", "css_chat=debug"])
            .expect("telemetry flags parse");
        assert!(config.telemetry.otel_stdout);
        assert_eq!(config.telemetry.log_filter, "css_chat=debug");
    }

    #[test_timeout::timeout]
    fn accepts_overrides() {
        let config = parse(&[
            "--message-limit",
            "2",
            "--stale-policy",
            "accept",
            "--metrics-addr",
            "127.0.0.1:9100",
        ])
        .expect("overrides parse");
        assert_eq!(config.chat.message_limit, 2);
        assert_eq!(config.chat.stale_policy, StalePolicy::Accept);
        assert_eq!(config.metrics_addr.map(|a| a.port()), Some(9100));
    }

    #[test_timeout::timeout]
    fn rejects_zero_limit_and_bad_addresses() {
        assert!(parse(&["--message-limit", "0"]).is_err());
        assert!(parse(&["--listen-addr", "nowhere"]).is_err());
        assert!(parse(&["--metrics-addr", "also-nowhere"]).is_err());
    }
}
