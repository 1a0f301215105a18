//! Strategy manager: registry, selection, switching, benchmarking.
//!
//! The manager owns the set of registered [`SearchStrategy`] implementations
//! and a single mutable field, the active strategy. Selection walks the
//! configured preference order and picks the first available backend;
//! switching re-initializes the target with the retained catalog and swaps
//! the active pointer under a lock, so concurrent callers never observe a
//! half-switched state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{info, warn};
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, EmbeddingRecord};
use crate::config::ManagerConfig;
use crate::error::{Result, XystonError};
use crate::strategy::parallel::ParallelSimilarityBackend;
use crate::strategy::remote::{RemoteIndexBackend, RemoteIndexClient};
use crate::strategy::sequential::SequentialSimilarityBackend;
use crate::strategy::{AttributeFilter, SearchResult, SearchStrategy, StatsSnapshot};

/// Seed for the deterministic benchmark probe vector.
const BENCHMARK_PROBE_SEED: u64 = 0xB5;

/// Latency measurement for one strategy in a benchmark run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyBenchmark {
    /// Strategy name.
    pub strategy: String,
    /// Mean search latency across all iterations.
    pub mean_latency: Duration,
}

/// Result of one [`StrategyManager::benchmark`] run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    /// Searches executed per strategy.
    pub iterations: usize,
    /// Per-strategy measurements, in registration order.
    pub measurements: Vec<StrategyBenchmark>,
}

impl BenchmarkReport {
    /// The strategy with the lowest mean latency, if any measurement exists.
    pub fn fastest(&self) -> Option<&StrategyBenchmark> {
        self.measurements
            .iter()
            .min_by_key(|m| m.mean_latency)
    }
}

struct ActiveStrategy {
    strategy: Arc<dyn SearchStrategy>,
    catalog: Arc<Catalog>,
}

/// Owns the strategy registry and the active-strategy state machine.
pub struct StrategyManager {
    config: ManagerConfig,
    strategies: Vec<Arc<dyn SearchStrategy>>,
    active: RwLock<Option<ActiveStrategy>>,
}

impl StrategyManager {
    /// Create a manager over an explicit strategy registry.
    ///
    /// Each strategy's availability probe runs once here so operators can
    /// see at startup which backends this host can serve.
    pub fn new(config: ManagerConfig, strategies: Vec<Arc<dyn SearchStrategy>>) -> Result<Self> {
        if strategies.is_empty() {
            return Err(XystonError::NoStrategyAvailable);
        }

        for (i, strategy) in strategies.iter().enumerate() {
            if strategies[..i].iter().any(|s| s.name() == strategy.name()) {
                return Err(XystonError::invalid_argument(format!(
                    "strategy '{}' registered twice",
                    strategy.name()
                )));
            }
            info!(
                "registered strategy '{}' (available: {})",
                strategy.name(),
                strategy.is_available()
            );
        }

        Ok(Self {
            config,
            strategies,
            active: RwLock::new(None),
        })
    }

    /// Create a manager wired with the three standard backends.
    ///
    /// The parallel backend is registered even when its device cannot be
    /// acquired; its probe keeps it out of selection. The remote backend is
    /// registered only when a client is supplied.
    pub fn with_default_backends(
        config: ManagerConfig,
        remote_client: Option<Arc<dyn RemoteIndexClient>>,
    ) -> Result<Self> {
        let mut strategies: Vec<Arc<dyn SearchStrategy>> = vec![
            Arc::new(ParallelSimilarityBackend::with_config(
                config.metric,
                &config.device,
            )),
            Arc::new(SequentialSimilarityBackend::new(config.metric)),
        ];
        if let Some(client) = remote_client {
            strategies.push(Arc::new(RemoteIndexBackend::new(client)));
        }

        Self::new(config, strategies)
    }

    /// Names of all registered strategies, in registration order.
    pub fn registered_strategies(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Name of the currently active strategy, if initialized.
    pub fn active_strategy_name(&self) -> Option<&'static str> {
        self.active.read().as_ref().map(|a| a.strategy.name())
    }

    fn find_strategy(&self, name: &str) -> Option<Arc<dyn SearchStrategy>> {
        self.strategies
            .iter()
            .find(|s| s.name() == name)
            .map(Arc::clone)
    }

    /// Pick the best strategy for this host.
    ///
    /// Walks the configured preference order first; if nothing on the list
    /// is available, falls back to any available registered strategy.
    pub fn select_best(&self) -> Result<Arc<dyn SearchStrategy>> {
        for name in &self.config.preference {
            if let Some(strategy) = self.find_strategy(name)
                && strategy.is_available()
            {
                return Ok(strategy);
            }
        }

        for strategy in &self.strategies {
            if strategy.is_available() {
                warn!(
                    "no preferred strategy available; falling back to '{}'",
                    strategy.name()
                );
                return Ok(Arc::clone(strategy));
            }
        }

        Err(XystonError::NoStrategyAvailable)
    }

    /// Ingest a catalog and activate the best available strategy.
    ///
    /// Calling this while already initialized is a logged no-op.
    pub fn initialize(&self, records: Vec<EmbeddingRecord>) -> Result<()> {
        // The write guard is held across the whole sequence so concurrent
        // initializers serialize; a later one observes the published state
        // and becomes a no-op instead of re-initializing the backend with a
        // catalog the manager never retains.
        let mut active = self.active.write();
        if let Some(active) = active.as_ref() {
            info!(
                "manager already initialized with strategy '{}'; ignoring",
                active.strategy.name()
            );
            return Ok(());
        }

        let catalog = Arc::new(Catalog::from_records(records)?);
        let strategy = self.select_best()?;
        strategy.initialize(&catalog)?;
        info!(
            "initialized strategy '{}' with {} records",
            strategy.name(),
            catalog.len()
        );

        *active = Some(ActiveStrategy { strategy, catalog });
        Ok(())
    }

    /// Explicitly switch the active strategy by name.
    ///
    /// The target is re-initialized with the retained catalog before the
    /// active pointer is swapped, so in-flight searches that captured the
    /// old strategy complete against it while new callers see the target.
    pub fn switch_strategy(&self, name: &str) -> Result<()> {
        let target = self
            .find_strategy(name)
            .ok_or_else(|| XystonError::unknown_strategy(name))?;
        if !target.is_available() {
            return Err(XystonError::unavailable_strategy(name));
        }

        let catalog = self
            .active
            .read()
            .as_ref()
            .map(|a| Arc::clone(&a.catalog))
            .ok_or_else(|| XystonError::not_initialized("manager"))?;

        // Initialization may be expensive; run it before taking the write
        // lock so searches keep flowing on the old strategy meanwhile.
        target.initialize(&catalog)?;

        let mut active = self.active.write();
        let previous = active
            .as_ref()
            .map(|a| a.strategy.name())
            .unwrap_or("none");
        info!("switching strategy: {previous} -> {name}");
        *active = Some(ActiveStrategy {
            strategy: target,
            catalog,
        });
        Ok(())
    }

    fn active_strategy(&self) -> Result<Arc<dyn SearchStrategy>> {
        self.active
            .read()
            .as_ref()
            .map(|a| Arc::clone(&a.strategy))
            .ok_or_else(|| XystonError::not_initialized("manager"))
    }

    /// Search the catalog with the active strategy.
    pub fn search(
        &self,
        query: &[f64],
        limit: usize,
        num_candidates: usize,
    ) -> Result<Vec<SearchResult>> {
        // Clone the active pointer and call outside the lock; a concurrent
        // switch never blocks behind a long search.
        self.active_strategy()?.search(query, limit, num_candidates)
    }

    /// Find records similar to a stored record with the active strategy.
    pub fn find_similar_to(
        &self,
        id: u64,
        limit: usize,
        num_candidates: usize,
    ) -> Result<Vec<SearchResult>> {
        self.active_strategy()?
            .find_similar_to(id, limit, num_candidates)
    }

    /// Attribute-filtered search with the active strategy.
    pub fn hybrid_search(
        &self,
        query: &[f64],
        filter: &AttributeFilter,
        limit: usize,
        num_candidates: usize,
    ) -> Result<Vec<SearchResult>> {
        self.active_strategy()?
            .hybrid_search(query, filter, limit, num_candidates)
    }

    /// Run repeated probe searches against every available strategy and
    /// report mean latency per strategy.
    ///
    /// The probe vector is deterministic, so runs are comparable. The report
    /// validates the configured preference order empirically; it does not
    /// change the active strategy unless `auto_switch_on_benchmark` is set,
    /// and even then only after the whole report is complete.
    pub fn benchmark(&self, iterations: usize) -> Result<BenchmarkReport> {
        if iterations == 0 {
            return Err(XystonError::invalid_argument(
                "benchmark iterations must be greater than zero",
            ));
        }

        let catalog = self
            .active
            .read()
            .as_ref()
            .map(|a| Arc::clone(&a.catalog))
            .ok_or_else(|| XystonError::not_initialized("manager"))?;

        let mut rng = StdRng::seed_from_u64(BENCHMARK_PROBE_SEED);
        let probe: Vec<f64> = (0..catalog.dim())
            .map(|_| rng.random_range(-1.0..1.0))
            .collect();
        let limit = catalog.len().min(10);
        let num_candidates = catalog.len().min(100).max(limit);

        let mut measurements = Vec::new();
        for strategy in &self.strategies {
            if !strategy.is_available() {
                continue;
            }
            if let Err(e) = strategy.initialize(&catalog) {
                warn!(
                    "skipping '{}' in benchmark: initialization failed: {e}",
                    strategy.name()
                );
                continue;
            }

            let mut total = Duration::ZERO;
            let mut completed = 0usize;
            for _ in 0..iterations {
                let start = Instant::now();
                match strategy.search(&probe, limit, num_candidates) {
                    Ok(_) => {
                        total += start.elapsed();
                        completed += 1;
                    }
                    Err(e) => {
                        warn!("benchmark search failed on '{}': {e}", strategy.name());
                    }
                }
            }

            if completed > 0 {
                measurements.push(StrategyBenchmark {
                    strategy: strategy.name().to_string(),
                    mean_latency: total / completed as u32,
                });
            }
        }

        let report = BenchmarkReport {
            iterations,
            measurements,
        };

        if self.config.auto_switch_on_benchmark
            && let Some(fastest) = report.fastest()
            && self.active_strategy_name() != Some(fastest.strategy.as_str())
            && let Err(e) = self.switch_strategy(&fastest.strategy)
        {
            warn!("auto-switch to '{}' failed: {e}", fastest.strategy);
        }

        Ok(report)
    }

    /// Run [`benchmark`](Self::benchmark) with the configured iteration count.
    pub fn run_configured_benchmark(&self) -> Result<BenchmarkReport> {
        self.benchmark(self.config.benchmark_iterations)
    }

    /// Collect stats snapshots from every available strategy.
    ///
    /// A failure reading one strategy's stats is logged and that entry
    /// omitted; one broken strategy cannot block reporting for the others.
    pub fn all_stats(&self) -> Vec<StatsSnapshot> {
        let mut snapshots = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            if !strategy.is_available() {
                continue;
            }
            match strategy.stats() {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => warn!("failed to read stats for '{}': {e}", strategy.name()),
            }
        }
        snapshots
    }
}
