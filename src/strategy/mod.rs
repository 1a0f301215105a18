//! Search strategy contract and the types shared by every backend.
//!
//! A strategy is any implementation of [`SearchStrategy`]: a capability set
//! of `{initialize, search, find_similar_to, hybrid_search, stats}` plus a
//! static availability probe. There is no base class and no shared mutable
//! state; each backend owns its own execution context and the manager treats
//! them uniformly through trait objects.

pub mod device;
pub mod parallel;
pub mod remote;
pub mod sequential;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::error::{Result, XystonError};
use crate::kernel::topk::Scored;

/// One ranked hit returned from a search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Id of the matching catalog record.
    pub id: u64,
    /// Metric score; for similarity metrics higher is more similar.
    pub score: f64,
    /// The record's opaque attribute map.
    pub attributes: HashMap<String, String>,
}

/// Exact-match filter over record attributes.
///
/// `Some(value)` entries require the attribute to be present and equal;
/// `None` entries are ignored constraints (the caller passed "don't care"
/// for that key). An empty filter matches every record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributeFilter {
    #[serde(default)]
    pub equals: HashMap<String, Option<String>>,
}

impl AttributeFilter {
    /// Build a filter from concrete key/value requirements.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            equals: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), Some(v.into())))
                .collect(),
        }
    }

    /// True if the record's attributes satisfy every bound constraint.
    pub fn matches(&self, attributes: &HashMap<String, String>) -> bool {
        self.equals.iter().all(|(key, expected)| match expected {
            Some(expected) => attributes
                .get(key)
                .map(|actual| actual == expected)
                .unwrap_or(false),
            None => true,
        })
    }

    /// True if no constraint is bound.
    pub fn is_empty(&self) -> bool {
        self.equals.values().all(|v| v.is_none())
    }
}

/// Static performance characteristics of a strategy, used for selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceProfile {
    /// Ballpark latency for one search against a typical catalog.
    pub expected_latency: Duration,
    /// Local memory the strategy holds for the catalog, in megabytes.
    pub memory_footprint_mb: f64,
    /// Requires a data-parallel compute device on this host.
    pub requires_parallel_device: bool,
    /// Requires network reachability to an external index.
    pub requires_network: bool,
}

/// Read-only view of a strategy's runtime counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Name of the strategy that produced this snapshot.
    pub strategy: String,
    /// Number of catalog entries currently served.
    pub total_catalog_size: usize,
    /// Local memory held for the catalog, in megabytes.
    pub memory_footprint_mb: f64,
    /// Mean latency across all recorded searches.
    pub average_latency: Duration,
    /// Monotonically increasing search counter.
    pub total_search_count: u64,
}

/// Mutable per-strategy counters, updated atomically after every search.
///
/// Readers never take a lock, so a stats snapshot cannot block an in-flight
/// search and vice versa.
#[derive(Debug, Default)]
pub struct RuntimeStats {
    catalog_size: AtomicUsize,
    memory_footprint_bits: AtomicU64,
    total_searches: AtomicU64,
    cumulative_latency_micros: AtomicU64,
}

impl RuntimeStats {
    /// Record the catalog served after a (re-)initialization.
    pub fn record_catalog(&self, size: usize, memory_footprint_mb: f64) {
        self.catalog_size.store(size, Ordering::Relaxed);
        self.memory_footprint_bits
            .store(memory_footprint_mb.to_bits(), Ordering::Relaxed);
    }

    /// Record one completed search.
    pub fn record_search(&self, latency: Duration) {
        self.total_searches.fetch_add(1, Ordering::Relaxed);
        self.cumulative_latency_micros
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    /// Produce a consistent-enough snapshot for reporting.
    pub fn snapshot(&self, strategy: &str) -> StatsSnapshot {
        let total = self.total_searches.load(Ordering::Relaxed);
        let cumulative = self.cumulative_latency_micros.load(Ordering::Relaxed);
        let average_latency = if total > 0 {
            Duration::from_micros(cumulative / total)
        } else {
            Duration::ZERO
        };

        StatsSnapshot {
            strategy: strategy.to_string(),
            total_catalog_size: self.catalog_size.load(Ordering::Relaxed),
            memory_footprint_mb: f64::from_bits(
                self.memory_footprint_bits.load(Ordering::Relaxed),
            ),
            average_latency,
            total_search_count: total,
        }
    }
}

/// Uniform contract implemented by every search backend.
pub trait SearchStrategy: Send + Sync {
    /// Stable identifier used for registration, switching, and stats.
    fn name(&self) -> &'static str;

    /// Capability probe: can this strategy serve requests on this host?
    ///
    /// Probed proactively at registration time; the manager never selects a
    /// strategy whose probe is false, instead of wrapping every call in
    /// reactive error handling.
    fn is_available(&self) -> bool;

    /// Static performance characteristics for selection ranking.
    fn profile(&self) -> PerformanceProfile;

    /// Prepare the strategy's execution context from a catalog.
    ///
    /// Idempotent: a second call on an already-initialized strategy is a
    /// no-op. Must complete before any search is observed to succeed.
    fn initialize(&self, catalog: &Arc<Catalog>) -> Result<()>;

    /// Rank the catalog against a query vector.
    ///
    /// A pool of `num_candidates` items is ranked and the best `limit` are
    /// returned, ordered best-first for the configured metric.
    fn search(&self, query: &[f64], limit: usize, num_candidates: usize)
    -> Result<Vec<SearchResult>>;

    /// Rank against the stored vector of `id`, excluding `id` itself.
    fn find_similar_to(
        &self,
        id: u64,
        limit: usize,
        num_candidates: usize,
    ) -> Result<Vec<SearchResult>>;

    /// Search restricted to records matching an exact-match attribute filter.
    ///
    /// Filtering happens before scoring: excluded records are never scored.
    fn hybrid_search(
        &self,
        query: &[f64],
        filter: &AttributeFilter,
        limit: usize,
        num_candidates: usize,
    ) -> Result<Vec<SearchResult>>;

    /// Read-only stats snapshot; never blocks on in-flight searches.
    fn stats(&self) -> Result<StatsSnapshot>;
}

/// Validate the shared `(limit, num_candidates)` argument contract.
pub(crate) fn validate_search_args(limit: usize, num_candidates: usize) -> Result<()> {
    if limit == 0 {
        return Err(XystonError::invalid_argument(
            "limit must be greater than zero",
        ));
    }
    if num_candidates < limit {
        return Err(XystonError::invalid_argument(format!(
            "num_candidates ({num_candidates}) must be at least limit ({limit})"
        )));
    }
    Ok(())
}

/// Materialize scored catalog positions into caller-facing results.
pub(crate) fn results_from_scored(catalog: &Catalog, scored: &[Scored]) -> Vec<SearchResult> {
    scored
        .iter()
        .map(|s| SearchResult {
            id: catalog.id_at(s.position),
            score: s.score,
            attributes: catalog.attributes_at(s.position).clone(),
        })
        .collect()
}
