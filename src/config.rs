//! Engine configuration.
//!
//! [`EngineConfig`] carries the few tunables the engine has. Defaults match
//! the behavior the backends were written against; most embedders never
//! touch this beyond `EngineConfig::default()`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables shared by every provider instantiated from one
/// [`EngineContext`](crate::provider::EngineContext).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sampling cadence for polling-style devices, in milliseconds. Bounds
    /// end-to-end latency from physical input to callback.
    pub poll_interval_ms: u64,
    /// POV direction window in hundredths of a degree. The default of 9000
    /// (a quadrant) lets diagonals activate two adjacent directions.
    pub pov_tolerance: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            pov_tolerance: 9000,
        }
    }
}

impl EngineConfig {
    #[inline]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Parse a config from TOML text. Missing keys fall back to defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, crate::error::Error> {
        Ok(toml::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.poll_interval(), Duration::from_millis(10));
        assert_eq!(cfg.pov_tolerance, 9000);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg = EngineConfig::from_toml_str("poll_interval_ms = 4").unwrap();
        assert_eq!(cfg.poll_interval_ms, 4);
        assert_eq!(cfg.pov_tolerance, 9000);
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(EngineConfig::from_toml_str("poll_interval_ms = []").is_err());
    }

    #[test]
    fn json_roundtrip() {
        // Configs travel to UIs as JSON; keep the shape stable.
        let cfg = EngineConfig { poll_interval_ms: 2, pov_tolerance: 4500 };
        let json = serde_json::to_string(&cfg).unwrap();
        assert_eq!(serde_json::from_str::<EngineConfig>(&json).unwrap(), cfg);
    }
}
