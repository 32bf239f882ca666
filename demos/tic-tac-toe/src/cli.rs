use std::time::Duration;

use clap::{Parser, ValueEnum};
use pairplay::prelude::{ConnectionPolicy, CoreConfig, RegistryConfig, SweepConfig};

#[derive(Parser, Debug)]
#[command(name = "tic-tac-toe", version, about = "Pairplay tic-tac-toe matchmaking server")]
pub struct Cli {
    /// Address to listen on
    #[arg(long, env = "PAIRPLAY_BIND", default_value = "127.0.0.1:8080")]
    pub bind: String,

    /// HMAC secret used to verify session tokens
    #[arg(long, env = "PAIRPLAY_JWT_SECRET")]
    pub jwt_secret: String,

    /// Delay between a game ending and its players being disconnected
    #[arg(long, env = "PAIRPLAY_TEARDOWN_GRACE_MS", default_value_t = 5_000)]
    pub teardown_grace_ms: u64,

    /// Dead-connection sweep interval (0 disables)
    #[arg(long, env = "PAIRPLAY_SWEEP_INTERVAL_MS", default_value_t = 10_000)]
    pub sweep_interval_ms: u64,

    /// Idle connection timeout (0 disables)
    #[arg(long, env = "PAIRPLAY_IDLE_TIMEOUT_MS", default_value_t = 60_000)]
    pub idle_timeout_ms: u64,

    #[arg(long, env = "PAIRPLAY_CONNECTION_POLICY", value_enum, default_value_t = Policy::SingleActive)]
    pub connection_policy: Policy,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Policy {
    SingleActive,
    KeepAll,
}

impl Cli {
    pub fn core_config(&self) -> CoreConfig {
        let policy = match self.connection_policy {
            Policy::SingleActive => ConnectionPolicy::SingleActive,
            Policy::KeepAll => ConnectionPolicy::KeepAll,
        };
        CoreConfig {
            teardown_grace: Duration::from_millis(self.teardown_grace_ms),
            registry: RegistryConfig { policy },
            ..CoreConfig::default()
        }
    }

    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig::with_interval(Duration::from_millis(self.sweep_interval_ms))
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_match_server_defaults() {
        let cli = Cli::try_parse_from(["tic-tac-toe", "--jwt-secret", "s"]).unwrap();
        assert_eq!(cli.bind, "127.0.0.1:8080");
        assert_eq!(cli.core_config().teardown_grace, Duration::from_secs(5));
        assert_eq!(cli.sweep_config().interval, Duration::from_secs(10));
        assert_eq!(cli.idle_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(cli.connection_policy, Policy::SingleActive);
    }

    #[test]
    fn test_cli_zero_idle_timeout_disables() {
        let cli = Cli::try_parse_from(["tic-tac-toe", "--jwt-secret", "s", "--idle-timeout-ms", "0"])
            .unwrap();
        assert_eq!(cli.idle_timeout(), None);
    }

    #[test]
    fn test_cli_keep_all_policy_maps_to_registry() {
        let cli = Cli::try_parse_from([
            "tic-tac-toe",
            "--jwt-secret",
            "s",
            "--connection-policy",
            "keep-all",
        ])
        .unwrap();
        assert_eq!(cli.core_config().registry.policy, ConnectionPolicy::KeepAll);
    }
}
