//! Remote indexed-store backend.
//!
//! Delegates search to an external index that performs its own approximate
//! nearest-neighbor search server-side. Higher latency than the local
//! backends but no local memory cost, and its failures are transient
//! (network, timeout) rather than permanent: a failed call surfaces as
//! [`XystonError::RemoteDegraded`] and the strategy stays selectable.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::error::{Result, XystonError};
use crate::strategy::{
    AttributeFilter, PerformanceProfile, RuntimeStats, SearchResult, SearchStrategy, StatsSnapshot,
    validate_search_args,
};

/// How the remote index should locate the query embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RemoteQueryMode {
    /// Search with an explicit query vector.
    ByVector(Vec<f64>),
    /// Search with the stored embedding of an indexed record.
    ByRecordId(u64),
}

/// One search request forwarded to the remote index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteQuery {
    /// Query embedding source.
    pub mode: RemoteQueryMode,
    /// Exact-match attribute filter, applied server-side.
    pub filter: AttributeFilter,
    /// Maximum number of hits wanted by the caller.
    pub limit: usize,
    /// Size of the candidate pool the index should consider.
    pub num_candidates: usize,
}

/// One hit returned by the remote index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteHit {
    /// Record id in the remote index.
    pub id: u64,
    /// Server-side similarity score.
    pub score: f64,
    /// Record attributes as stored remotely.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// Transport client for the remote index; the caller supplies the transport.
pub trait RemoteIndexClient: Send + Sync {
    /// Cheap reachability probe used for availability checks.
    fn ping(&self) -> bool;

    /// Execute one search against the remote index.
    fn query(&self, request: &RemoteQuery) -> Result<Vec<RemoteHit>>;
}

/// Backend that forwards every operation to a [`RemoteIndexClient`].
pub struct RemoteIndexBackend {
    client: Arc<dyn RemoteIndexClient>,
    ready: AtomicBool,
    stats: RuntimeStats,
}

impl RemoteIndexBackend {
    /// Create a backend over the given transport client.
    pub fn new(client: Arc<dyn RemoteIndexClient>) -> Self {
        Self {
            client,
            ready: AtomicBool::new(false),
            stats: RuntimeStats::default(),
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        if !self.ready.load(Ordering::Acquire) {
            return Err(XystonError::not_initialized(self.name()));
        }
        Ok(())
    }

    fn run_query(&self, request: &RemoteQuery) -> Result<Vec<RemoteHit>> {
        self.client.query(request).map_err(|e| match e {
            degraded @ XystonError::RemoteDegraded(_) => degraded,
            invalid @ XystonError::InvalidArgument(_) => invalid,
            other => XystonError::remote_degraded(other.to_string()),
        })
    }

    fn hits_to_results(&self, mut hits: Vec<RemoteHit>, limit: usize) -> Vec<SearchResult> {
        // Ranking happens server-side; only truncation is applied here.
        if hits.len() > limit {
            hits.truncate(limit);
        }
        hits.into_iter()
            .map(|h| SearchResult {
                id: h.id,
                score: h.score,
                attributes: h.attributes,
            })
            .collect()
    }
}

impl SearchStrategy for RemoteIndexBackend {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn is_available(&self) -> bool {
        self.client.ping()
    }

    fn profile(&self) -> PerformanceProfile {
        PerformanceProfile {
            expected_latency: Duration::from_millis(120),
            memory_footprint_mb: 0.0,
            requires_parallel_device: false,
            requires_network: true,
        }
    }

    fn initialize(&self, catalog: &Arc<Catalog>) -> Result<()> {
        // The data is already resident in the remote index; initialization
        // only records bookkeeping and marks readiness.
        debug!(
            "remote backend ready; catalog of {} records served remotely",
            catalog.len()
        );
        self.stats.record_catalog(catalog.len(), 0.0);
        self.ready.store(true, Ordering::Release);
        Ok(())
    }

    fn search(
        &self,
        query: &[f64],
        limit: usize,
        num_candidates: usize,
    ) -> Result<Vec<SearchResult>> {
        validate_search_args(limit, num_candidates)?;
        self.ensure_ready()?;

        let start = Instant::now();
        let hits = self.run_query(&RemoteQuery {
            mode: RemoteQueryMode::ByVector(query.to_vec()),
            filter: AttributeFilter::default(),
            limit,
            num_candidates,
        })?;
        let results = self.hits_to_results(hits, limit);
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
        self.ensure_ready()?;

        let start = Instant::now();
        // One extra candidate covers the probe record itself.
        let hits = self.run_query(&RemoteQuery {
            mode: RemoteQueryMode::ByRecordId(id),
            filter: AttributeFilter::default(),
            limit: limit + 1,
            num_candidates: num_candidates + 1,
        })?;
        let hits = hits.into_iter().filter(|h| h.id != id).collect();
        let results = self.hits_to_results(hits, limit);
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
        self.ensure_ready()?;

        let start = Instant::now();
        let hits = self.run_query(&RemoteQuery {
            mode: RemoteQueryMode::ByVector(query.to_vec()),
            filter: filter.clone(),
            limit,
            num_candidates,
        })?;
        let results = self.hits_to_results(hits, limit);
        self.stats.record_search(start.elapsed());

        Ok(results)
    }

    fn stats(&self) -> Result<StatsSnapshot> {
        Ok(self.stats.snapshot(self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EmbeddingRecord;
    use parking_lot::Mutex;

    /// Scripted in-memory client for exercising the backend.
    struct ScriptedClient {
        reachable: AtomicBool,
        responses: Mutex<Vec<Result<Vec<RemoteHit>>>>,
        requests: Mutex<Vec<RemoteQuery>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<Result<Vec<RemoteHit>>>) -> Self {
            Self {
                reachable: AtomicBool::new(true),
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl RemoteIndexClient for ScriptedClient {
        fn ping(&self) -> bool {
            self.reachable.load(Ordering::Relaxed)
        }

        fn query(&self, request: &RemoteQuery) -> Result<Vec<RemoteHit>> {
            self.requests.lock().push(request.clone());
            self.responses.lock().remove(0)
        }
    }

    fn hit(id: u64, score: f64) -> RemoteHit {
        RemoteHit {
            id,
            score,
            attributes: HashMap::new(),
        }
    }

    fn tiny_catalog() -> Arc<Catalog> {
        Arc::new(
            Catalog::from_records(vec![
                EmbeddingRecord::new(1, vec![1.0, 0.0]),
                EmbeddingRecord::new(2, vec![0.0, 1.0]),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn test_initialize_is_a_noop_marker() {
        let client = Arc::new(ScriptedClient::new(Vec::new()));
        let backend = RemoteIndexBackend::new(client);

        assert!(backend.search(&[1.0, 0.0], 1, 1).is_err());
        backend.initialize(&tiny_catalog()).unwrap();

        let snapshot = backend.stats().unwrap();
        assert_eq!(snapshot.total_catalog_size, 2);
        assert_eq!(snapshot.memory_footprint_mb, 0.0);
    }

    #[test]
    fn test_search_delegates_and_truncates() {
        let client = Arc::new(ScriptedClient::new(vec![Ok(vec![
            hit(5, 0.9),
            hit(6, 0.8),
            hit(7, 0.7),
        ])]));
        let backend = RemoteIndexBackend::new(client.clone());
        backend.initialize(&tiny_catalog()).unwrap();

        let results = backend.search(&[1.0, 0.0], 2, 3).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, 5);

        let requests = client.requests.lock();
        assert_eq!(requests.len(), 1);
        assert!(matches!(requests[0].mode, RemoteQueryMode::ByVector(_)));
        assert_eq!(requests[0].num_candidates, 3);
    }

    #[test]
    fn test_find_similar_to_excludes_probe_id() {
        let client = Arc::new(ScriptedClient::new(vec![Ok(vec![
            hit(9, 1.0),
            hit(3, 0.8),
            hit(4, 0.6),
        ])]));
        let backend = RemoteIndexBackend::new(client);
        backend.initialize(&tiny_catalog()).unwrap();

        let results = backend.find_similar_to(9, 2, 3).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.id != 9));
    }

    #[test]
    fn test_failures_surface_as_degraded() {
        let io_error = std::io::Error::new(std::io::ErrorKind::TimedOut, "dial timeout");
        let client = Arc::new(ScriptedClient::new(vec![
            Err(XystonError::from(io_error)),
            Ok(vec![hit(1, 0.5)]),
        ]));
        let backend = RemoteIndexBackend::new(client);
        backend.initialize(&tiny_catalog()).unwrap();

        let error = backend.search(&[1.0, 0.0], 1, 1).unwrap_err();
        assert!(error.is_transient());

        // The next call goes through; one failure never disqualifies the
        // strategy.
        assert!(backend.is_available());
        let results = backend.search(&[1.0, 0.0], 1, 1).unwrap();
        assert_eq!(results[0].id, 1);
    }

    #[test]
    fn test_unreachable_client_reports_unavailable() {
        let client = Arc::new(ScriptedClient::new(Vec::new()));
        client.reachable.store(false, Ordering::Relaxed);
        let backend = RemoteIndexBackend::new(client);
        assert!(!backend.is_available());
    }

    #[test]
    fn test_hybrid_filter_forwarded() {
        let client = Arc::new(ScriptedClient::new(vec![Ok(Vec::new())]));
        let backend = RemoteIndexBackend::new(client.clone());
        backend.initialize(&tiny_catalog()).unwrap();

        let filter = AttributeFilter::from_pairs([("quality", "major")]);
        let results = backend.hybrid_search(&[1.0, 0.0], &filter, 2, 4).unwrap();
        assert!(results.is_empty());

        let requests = client.requests.lock();
        assert_eq!(
            requests[0].filter.equals.get("quality"),
            Some(&Some("major".to_string()))
        );
    }
}
