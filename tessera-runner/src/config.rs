//! Runner Configuration
//!
//! Limits for filter parsing, relation hydration and event fan-out. Loaded
//! from environment variables with defaults suitable for development.

use tessera_events::BroadcastEventBus;

/// Default per-relation record cap for one-to-many hydration.
pub const DEFAULT_RELATION_RECORD_CAP: usize = 60;
/// Default maximum filter nesting depth.
pub const DEFAULT_MAX_FILTER_DEPTH: usize = 32;
/// Default maximum nested relation depth.
pub const DEFAULT_MAX_HYDRATION_DEPTH: usize = 3;
/// Default change-event channel capacity.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Pipeline limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Maximum related records attached per parent for one-to-many relations.
    pub relation_record_cap: usize,

    /// Maximum nesting depth of a filter expression.
    pub max_filter_depth: usize,

    /// Maximum depth of nested relation selections.
    pub max_hydration_depth: usize,

    /// Buffer size of the broadcast event bus.
    pub event_channel_capacity: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            relation_record_cap: DEFAULT_RELATION_RECORD_CAP,
            max_filter_depth: DEFAULT_MAX_FILTER_DEPTH,
            max_hydration_depth: DEFAULT_MAX_HYDRATION_DEPTH,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl RunnerConfig {
    /// Create RunnerConfig from environment variables.
    ///
    /// Environment variables:
    /// - `TESSERA_RELATION_RECORD_CAP` (default: 60)
    /// - `TESSERA_MAX_FILTER_DEPTH` (default: 32)
    /// - `TESSERA_MAX_HYDRATION_DEPTH` (default: 3)
    /// - `TESSERA_EVENT_CHANNEL_CAPACITY` (default: 1000)
    ///
    /// Unparseable or zero values fall back to the default.
    pub fn from_env() -> Self {
        Self {
            relation_record_cap: env_usize("TESSERA_RELATION_RECORD_CAP")
                .unwrap_or(DEFAULT_RELATION_RECORD_CAP),
            max_filter_depth: env_usize("TESSERA_MAX_FILTER_DEPTH")
                .unwrap_or(DEFAULT_MAX_FILTER_DEPTH),
            max_hydration_depth: env_usize("TESSERA_MAX_HYDRATION_DEPTH")
                .unwrap_or(DEFAULT_MAX_HYDRATION_DEPTH),
            event_channel_capacity: env_usize("TESSERA_EVENT_CHANNEL_CAPACITY")
                .unwrap_or(DEFAULT_EVENT_CHANNEL_CAPACITY),
        }
    }

    pub fn with_relation_record_cap(mut self, cap: usize) -> Self {
        self.relation_record_cap = cap;
        self
    }

    pub fn with_max_hydration_depth(mut self, depth: usize) -> Self {
        self.max_hydration_depth = depth;
        self
    }

    /// Broadcast event bus sized by `event_channel_capacity`.
    pub fn event_bus(&self) -> BroadcastEventBus {
        BroadcastEventBus::new(self.event_channel_capacity)
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .filter(|v| *v > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EnvVarGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let previous = std::env::var(key).ok();
            std::env::set_var(key, value);
            Self { key, previous }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match &self.previous {
                Some(value) => std::env::set_var(self.key, value),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn test_defaults() {
        let config = RunnerConfig::default();
        assert_eq!(config.relation_record_cap, 60);
        assert_eq!(config.max_filter_depth, 32);
        assert_eq!(config.max_hydration_depth, 3);
        assert_eq!(config.event_channel_capacity, 1000);
    }

    #[test]
    fn test_from_env_reads_and_falls_back() {
        let _cap = EnvVarGuard::set("TESSERA_RELATION_RECORD_CAP", "5");
        let _depth = EnvVarGuard::set("TESSERA_MAX_HYDRATION_DEPTH", "not-a-number");
        let _zero = EnvVarGuard::set("TESSERA_EVENT_CHANNEL_CAPACITY", "0");

        let config = RunnerConfig::from_env();
        assert_eq!(config.relation_record_cap, 5);
        assert_eq!(config.max_hydration_depth, DEFAULT_MAX_HYDRATION_DEPTH);
        assert_eq!(config.event_channel_capacity, DEFAULT_EVENT_CHANNEL_CAPACITY);
    }
}
