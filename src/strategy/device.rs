//! Data-parallel compute device handle.
//!
//! The device is an explicitly owned resource acquired once and passed into
//! the parallel backend at construction. Dropping the backend drops the
//! device and its worker pool with it; there is no process-wide context
//! singleton hiding behind the backend.

use log::info;
use rayon::ThreadPool;

use crate::config::DeviceConfig;
use crate::error::{Result, XystonError};

/// A scoped handle to a grid of concurrent execution units.
pub struct ComputeDevice {
    pool: ThreadPool,
    units: usize,
    group_reduction_threshold: usize,
}

impl ComputeDevice {
    /// Acquire the device described by `config`.
    ///
    /// Fails when the device is disabled by configuration or the worker pool
    /// cannot be built; the caller decides whether that downgrades the
    /// parallel strategy to unavailable or aborts setup.
    pub fn acquire(config: &DeviceConfig) -> Result<Self> {
        if !config.enabled {
            return Err(XystonError::initialization(
                "parallel compute device disabled by configuration",
            ));
        }

        let units = config.resolved_units();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(units)
            .thread_name(|i| format!("xyston-device-{i}"))
            .build()
            .map_err(|e| {
                XystonError::initialization(format!("failed to acquire compute device: {e}"))
            })?;

        info!("acquired compute device with {units} execution units");
        Ok(Self {
            pool,
            units,
            group_reduction_threshold: config.group_reduction_threshold,
        })
    }

    /// Number of concurrent execution units.
    pub fn units(&self) -> usize {
        self.units
    }

    /// Dimension at which per-item scoring switches to grouped reduction.
    pub fn group_reduction_threshold(&self) -> usize {
        self.group_reduction_threshold
    }

    /// Run `op` inside the device's execution context.
    pub fn dispatch<R, F>(&self, op: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        self.pool.install(op)
    }
}

impl std::fmt::Debug for ComputeDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeDevice")
            .field("units", &self.units)
            .field("group_reduction_threshold", &self.group_reduction_threshold)
            .finish()
    }
}
