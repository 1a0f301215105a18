//! Sequential (single-threaded) similarity backend.
//!
//! Runs the shared kernels on the calling thread. Always available, so it is
//! the default fallback when no parallel device can be acquired, and it
//! doubles as the correctness oracle for the parallel backend in tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;
use parking_lot::RwLock;

use crate::catalog::Catalog;
use crate::error::{Result, XystonError};
use crate::kernel::DistanceMetric;
use crate::kernel::topk::TopK;
use crate::strategy::{
    AttributeFilter, PerformanceProfile, RuntimeStats, SearchResult, SearchStrategy, StatsSnapshot,
    results_from_scored, validate_search_args,
};

/// Brute-force backend executing on the caller's thread.
pub struct SequentialSimilarityBackend {
    metric: DistanceMetric,
    context: RwLock<Option<Arc<Catalog>>>,
    stats: RuntimeStats,
}

impl SequentialSimilarityBackend {
    /// Create an uninitialized backend for the given metric.
    pub fn new(metric: DistanceMetric) -> Self {
        Self {
            metric,
            context: RwLock::new(None),
            stats: RuntimeStats::default(),
        }
    }

    fn catalog(&self) -> Result<Arc<Catalog>> {
        self.context
            .read()
            .clone()
            .ok_or_else(|| XystonError::not_initialized(self.name()))
    }

    /// Rank `positions` of the catalog against `query`, best-first.
    fn rank_positions<I>(
        &self,
        catalog: &Catalog,
        query: &[f64],
        positions: I,
        num_candidates: usize,
    ) -> Vec<crate::kernel::topk::Scored>
    where
        I: Iterator<Item = usize>,
    {
        let mut topk = TopK::new(num_candidates, self.metric.score_order());
        for position in positions {
            let score = self
                .metric
                .score_unchecked(query, catalog.vector_at(position));
            topk.offer(position, score);
        }
        topk.into_sorted()
    }

    fn validate_query(&self, catalog: &Catalog, query: &[f64]) -> Result<()> {
        if query.len() != catalog.dim() {
            return Err(XystonError::invalid_argument(format!(
                "query dimension {} does not match catalog dimension {}",
                query.len(),
                catalog.dim()
            )));
        }
        Ok(())
    }
}

impl SearchStrategy for SequentialSimilarityBackend {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn profile(&self) -> PerformanceProfile {
        PerformanceProfile {
            expected_latency: Duration::from_millis(50),
            memory_footprint_mb: self
                .context
                .read()
                .as_ref()
                .map(|c| c.memory_footprint_mb())
                .unwrap_or(0.0),
            requires_parallel_device: false,
            requires_network: false,
        }
    }

    fn initialize(&self, catalog: &Arc<Catalog>) -> Result<()> {
        let mut context = self.context.write();
        if let Some(existing) = context.as_ref()
            && Arc::ptr_eq(existing, catalog)
        {
            debug!("sequential backend already initialized with this catalog");
            return Ok(());
        }

        self.stats
            .record_catalog(catalog.len(), catalog.memory_footprint_mb());
        *context = Some(Arc::clone(catalog));
        Ok(())
    }

    fn search(
        &self,
        query: &[f64],
        limit: usize,
        num_candidates: usize,
    ) -> Result<Vec<SearchResult>> {
        validate_search_args(limit, num_candidates)?;
        let catalog = self.catalog()?;
        self.validate_query(&catalog, query)?;

        let start = Instant::now();
        let mut scored = self.rank_positions(&catalog, query, 0..catalog.len(), num_candidates);
        scored.truncate(limit);
        let results = results_from_scored(&catalog, &scored);
        self.stats.record_search(start.elapsed());

        Ok(results)
    }

    fn find_similar_to(
        &self,
        id: u64,
        limit: usize,
        num_candidates: usize,
    ) -> Result<Vec<SearchResult>> {
        validate_search_args(limit, num_candidates)?;
        let catalog = self.catalog()?;
        let probe_position = catalog
            .position_of(id)
            .ok_or_else(|| XystonError::invalid_argument(format!("unknown record id {id}")))?;

        let start = Instant::now();
        let query = catalog.vector_at(probe_position).to_vec();
        // One extra candidate covers the probe record itself.
        let mut scored =
            self.rank_positions(&catalog, &query, 0..catalog.len(), num_candidates + 1);
        scored.retain(|s| s.position != probe_position);
        scored.truncate(limit);
        let results = results_from_scored(&catalog, &scored);
        self.stats.record_search(start.elapsed());

        Ok(results)
    }

    fn hybrid_search(
        &self,
        query: &[f64],
        filter: &AttributeFilter,
        limit: usize,
        num_candidates: usize,
    ) -> Result<Vec<SearchResult>> {
        validate_search_args(limit, num_candidates)?;
        let catalog = self.catalog()?;
        self.validate_query(&catalog, query)?;

        let start = Instant::now();
        // Filter before compute: only matching positions are ever scored.
        let allowed = (0..catalog.len())
            .filter(|&p| filter.matches(catalog.attributes_at(p)))
            .collect::<Vec<_>>();

        let mut scored =
            self.rank_positions(&catalog, query, allowed.into_iter(), num_candidates);
        scored.truncate(limit);
        let results = results_from_scored(&catalog, &scored);
        self.stats.record_search(start.elapsed());

        Ok(results)
    }

    fn stats(&self) -> Result<StatsSnapshot> {
        Ok(self.stats.snapshot(self.name()))
    }
}
