//! Dispatcher configuration.

use cadence_infra::cache::DEFAULT_DRIVER;

pub const DEFAULT_TTL: u64 = 60;
pub const TTL_ENV: &str = "CADENCE_CACHE_TTL";
pub const DRIVER_ENV: &str = "CADENCE_CACHE_DRIVER";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Seconds a cached response lives when the runnable sets no ttl.
    pub default_ttl: u64,
    /// Cache driver used when the runnable names none.
    pub default_cache_driver: String,
    /// Path segment events live under.
    pub event_namespace: String,
    /// Path segments replaced by `event_namespace` when deriving event names,
    /// searched in order.
    pub source_segments: Vec<String>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            default_cache_driver: DEFAULT_DRIVER.to_string(),
            event_namespace: "events".to_string(),
            source_segments: vec!["commands".to_string(), "queries".to_string(), "models".to_string()],
        }
    }
}

impl DispatcherConfig {
    /// Defaults overridden by `CADENCE_CACHE_TTL` / `CADENCE_CACHE_DRIVER`.
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ttl) = std::env::var(TTL_ENV).ok().and_then(|v| v.trim().parse().ok()) {
            config.default_ttl = ttl;
        }
        if let Ok(driver) = std::env::var(DRIVER_ENV) {
            if !driver.trim().is_empty() {
                config.default_cache_driver = driver.trim().to_string();
            }
        }
        config
    }

    pub fn with_default_ttl(mut self, seconds: u64) -> Self {
        self.default_ttl = seconds;
        self
    }

    pub fn with_default_cache_driver(mut self, driver: impl Into<String>) -> Self {
        self.default_cache_driver = driver.into();
        self
    }

    pub fn with_event_namespace(mut self, segment: impl Into<String>) -> Self {
        self.event_namespace = segment.into();
        self
    }

    pub fn with_source_segments<I, S>(mut self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source_segments = segments.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = DispatcherConfig::default();
        assert_eq!(config.default_ttl, 60);
        assert_eq!(config.default_cache_driver, "memory");
        assert_eq!(config.event_namespace, "events");
        assert_eq!(config.source_segments, vec!["commands", "queries", "models"]);
    }

    #[test]
    fn builders_override() {
        let config = DispatcherConfig::default()
            .with_default_ttl(5)
            .with_default_cache_driver("redis")
            .with_source_segments(["actions"]);
        assert_eq!(config.default_ttl, 5);
        assert_eq!(config.default_cache_driver, "redis");
        assert_eq!(config.source_segments, vec!["actions"]);
    }
}
