//! Match core configuration.

use std::time::Duration;

use pairplay_session::RegistryConfig;

use crate::ScoringConfig;

/// Settings for a [`MatchmakingCore`](crate::MatchmakingCore).
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// How long a finished session stays around (so clients can show the
    /// final board) before its participants are disconnected and purged.
    pub teardown_grace: Duration,

    /// How long a match request made before the player connected is
    /// kept. `None` keeps it until the player connects.
    pub pending_intent_ttl: Option<Duration>,

    pub scoring: ScoringConfig,

    pub registry: RegistryConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            teardown_grace: Duration::from_secs(5),
            pending_intent_ttl: Some(Duration::from_secs(5 * 60)),
            scoring: ScoringConfig::default(),
            registry: RegistryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pairplay_session::ConnectionPolicy;

    use super::*;

    #[test]
    fn test_core_config_default() {
        let config = CoreConfig::default();
        assert_eq!(config.teardown_grace, Duration::from_secs(5));
        assert_eq!(config.pending_intent_ttl, Some(Duration::from_secs(300)));
        assert_eq!(config.registry.policy, ConnectionPolicy::SingleActive);
        assert_eq!(config.scoring.win_points, 10);
    }
}
