//! Engine configuration.
//!
//! Plain serde-deserializable structs; callers load them from whatever
//! configuration layer they already have and pass them in.

use serde::{Deserialize, Serialize};

use crate::kernel::DistanceMetric;

/// Configuration for the data-parallel compute device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Whether the parallel device may be acquired at all.
    pub enabled: bool,
    /// Number of concurrent execution units. `None` uses every logical CPU.
    pub units: Option<usize>,
    /// Dimension at or above which per-item scoring switches to the
    /// grouped reduction path.
    pub group_reduction_threshold: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            units: None,
            group_reduction_threshold: 2048,
        }
    }
}

impl DeviceConfig {
    /// The number of execution units to acquire.
    pub fn resolved_units(&self) -> usize {
        self.units.unwrap_or_else(num_cpus::get).max(1)
    }
}

/// Configuration for the strategy manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Strategy names in preference order; the first available one wins.
    pub preference: Vec<String>,
    /// Distance metric applied by every local backend.
    pub metric: DistanceMetric,
    /// Number of probe searches per strategy in a benchmark run.
    pub benchmark_iterations: usize,
    /// Switch to the fastest strategy after a benchmark completes.
    /// Off by default; the benchmark is a validation tool, not a scheduler.
    pub auto_switch_on_benchmark: bool,
    /// Compute device settings for the parallel backend.
    pub device: DeviceConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            preference: vec![
                "parallel".to_string(),
                "sequential".to_string(),
                "remote".to_string(),
            ],
            metric: DistanceMetric::Cosine,
            benchmark_iterations: 10,
            auto_switch_on_benchmark: false,
            device: DeviceConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_preference_order() {
        let config = ManagerConfig::default();
        assert_eq!(config.preference, vec!["parallel", "sequential", "remote"]);
        assert_eq!(config.metric, DistanceMetric::Cosine);
        assert!(!config.auto_switch_on_benchmark);
    }

    #[test]
    fn test_device_units_resolution() {
        let config = DeviceConfig {
            units: Some(4),
            ..DeviceConfig::default()
        };
        assert_eq!(config.resolved_units(), 4);

        let config = DeviceConfig {
            units: Some(0),
            ..DeviceConfig::default()
        };
        assert_eq!(config.resolved_units(), 1);

        let config = DeviceConfig::default();
        assert!(config.resolved_units() >= 1);
    }

    #[test]
    fn test_config_deserialization() {
        let json = r#"{
            "preference": ["sequential"],
            "metric": "Euclidean",
            "benchmark_iterations": 3,
            "auto_switch_on_benchmark": true,
            "device": { "enabled": false, "units": 2, "group_reduction_threshold": 512 }
        }"#;

        let config: ManagerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.preference, vec!["sequential"]);
        assert_eq!(config.metric, DistanceMetric::Euclidean);
        assert!(!config.device.enabled);
    }
}
