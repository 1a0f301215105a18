//! Data-parallel similarity backend.
//!
//! Catalog vectors live in one contiguous flat buffer prepared at
//! initialization; each search partitions the catalog across the compute
//! device's execution units, keeps a per-partition top-K, and multi-way
//! merges the partials into the global ranking.
//!
//! Two dispatch shapes are used depending on the vector dimension:
//! - small D: one work item per catalog entry, partitioned into per-unit
//!   chunks;
//! - large D (at or above the device's group-reduction threshold): one group
//!   per entry, with the dot/norm accumulation split into blocks scored in
//!   parallel and combined by a halved-stride tree reduction.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use parking_lot::RwLock;
use rayon::prelude::*;

use crate::catalog::Catalog;
use crate::config::DeviceConfig;
use crate::error::{Result, XystonError};
use crate::kernel::topk::{Scored, TopK, merge_partials};
use crate::kernel::{DistanceMetric, simd};
use crate::strategy::device::ComputeDevice;
use crate::strategy::{
    AttributeFilter, PerformanceProfile, RuntimeStats, SearchResult, SearchStrategy, StatsSnapshot,
    results_from_scored, validate_search_args,
};

/// Block size for the grouped reduction path, in vector components.
const REDUCTION_BLOCK: usize = 256;

/// Similarity backend executing on a data-parallel compute device.
pub struct ParallelSimilarityBackend {
    metric: DistanceMetric,
    device: Option<ComputeDevice>,
    context: RwLock<Option<Arc<Catalog>>>,
    stats: RuntimeStats,
}

impl ParallelSimilarityBackend {
    /// Create a backend over an already-acquired device.
    pub fn new(metric: DistanceMetric, device: ComputeDevice) -> Self {
        Self {
            metric,
            device: Some(device),
            context: RwLock::new(None),
            stats: RuntimeStats::default(),
        }
    }

    /// Create a backend, attempting device acquisition from configuration.
    ///
    /// Acquisition failure is not an error here: the backend is constructed
    /// in a permanently unavailable state and the manager's capability probe
    /// keeps it out of selection.
    pub fn with_config(metric: DistanceMetric, config: &DeviceConfig) -> Self {
        let device = match ComputeDevice::acquire(config) {
            Ok(device) => Some(device),
            Err(e) => {
                warn!("parallel backend unavailable: {e}");
                None
            }
        };

        Self {
            metric,
            device,
            context: RwLock::new(None),
            stats: RuntimeStats::default(),
        }
    }

    fn device(&self) -> Result<&ComputeDevice> {
        self.device.as_ref().ok_or_else(|| {
            XystonError::initialization("parallel compute device was not acquired")
        })
    }

    fn catalog(&self) -> Result<Arc<Catalog>> {
        self.context
            .read()
            .clone()
            .ok_or_else(|| XystonError::not_initialized(self.name()))
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

    /// Rank the given catalog positions on the device, best-first, keeping
    /// at most `num_candidates` entries.
    fn rank_positions(
        &self,
        catalog: &Catalog,
        query: &[f64],
        positions: Vec<usize>,
        num_candidates: usize,
    ) -> Result<Vec<Scored>> {
        let device = self.device()?;
        let order = self.metric.score_order();
        let metric = self.metric;
        let grouped = catalog.dim() >= device.group_reduction_threshold();

        let result = device.dispatch(|| {
            if grouped {
                // One group per item: the reduction inside grouped_score is
                // what runs data-parallel here.
                let mut topk = TopK::new(num_candidates, order);
                for position in positions {
                    let score = grouped_score(metric, query, catalog.vector_at(position));
                    topk.offer(position, score);
                }
                topk.into_sorted()
            } else {
                // One work item per catalog entry, chunked per execution unit.
                let chunk = positions.len().div_ceil(device.units()).max(1);
                let partials: Vec<Vec<Scored>> = positions
                    .par_chunks(chunk)
                    .map(|partition| {
                        let mut local = TopK::new(num_candidates, order);
                        for &position in partition {
                            let score =
                                metric.score_unchecked(query, catalog.vector_at(position));
                            local.offer(position, score);
                        }
                        local.into_sorted()
                    })
                    .collect();

                merge_partials(&partials, num_candidates, order)
            }
        });

        Ok(result)
    }
}

/// Score one item with the dimension split into parallel blocks.
///
/// Block partials are combined with a halved-stride tree reduction, the same
/// shape an intra-group reduction takes on a compute grid.
fn grouped_score(metric: DistanceMetric, query: &[f64], item: &[f64]) -> f64 {
    match metric {
        DistanceMetric::Cosine => {
            let mut partials: Vec<(f64, f64, f64)> = query
                .par_chunks(REDUCTION_BLOCK)
                .zip(item.par_chunks(REDUCTION_BLOCK))
                .map(|(q, i)| simd::dot_and_norms(q, i))
                .collect();

            let mut len = partials.len();
            while len > 1 {
                let half = len.div_ceil(2);
                for i in 0..(len - half) {
                    let (dot, norm_a, norm_b) = partials[i + half];
                    partials[i].0 += dot;
                    partials[i].1 += norm_a;
                    partials[i].2 += norm_b;
                }
                len = half;
            }

            let (dot, norm_a_sq, norm_b_sq) = partials[0];
            if norm_a_sq == 0.0 || norm_b_sq == 0.0 {
                0.0
            } else {
                dot / (norm_a_sq.sqrt() * norm_b_sq.sqrt())
            }
        }
        DistanceMetric::Euclidean => {
            let mut partials: Vec<f64> = query
                .par_chunks(REDUCTION_BLOCK)
                .zip(item.par_chunks(REDUCTION_BLOCK))
                .map(|(q, i)| simd::squared_l2_distance(q, i))
                .collect();

            let mut len = partials.len();
            while len > 1 {
                let half = len.div_ceil(2);
                for i in 0..(len - half) {
                    partials[i] += partials[i + half];
                }
                len = half;
            }

            partials[0].sqrt()
        }
    }
}

impl SearchStrategy for ParallelSimilarityBackend {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn is_available(&self) -> bool {
        self.device.is_some()
    }

    fn profile(&self) -> PerformanceProfile {
        PerformanceProfile {
            expected_latency: Duration::from_millis(5),
            memory_footprint_mb: self
                .context
                .read()
                .as_ref()
                .map(|c| c.memory_footprint_mb())
                .unwrap_or(0.0),
            requires_parallel_device: true,
            requires_network: false,
        }
    }

    fn initialize(&self, catalog: &Arc<Catalog>) -> Result<()> {
        // Fail before taking the lock: no device, no strategy.
        self.device()?;

        // The write guard is the idempotency lock; concurrent initializers
        // serialize here and later ones observe the published context.
        let mut context = self.context.write();
        if let Some(existing) = context.as_ref()
            && Arc::ptr_eq(existing, catalog)
        {
            debug!("parallel backend already initialized with this catalog");
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
        let mut scored = self.rank_positions(
            &catalog,
            query,
            (0..catalog.len()).collect(),
            num_candidates,
        )?;
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
        let mut scored = self.rank_positions(
            &catalog,
            &query,
            (0..catalog.len()).collect(),
            num_candidates + 1,
        )?;
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
        // Filter before compute: the predicate runs on the host and the
        // device pass only ever visits the allowed index array.
        let allowed: Vec<usize> = (0..catalog.len())
            .filter(|&p| filter.matches(catalog.attributes_at(p)))
            .collect();

        if allowed.is_empty() {
            self.stats.record_search(start.elapsed());
            return Ok(Vec::new());
        }

        let mut scored = self.rank_positions(&catalog, query, allowed, num_candidates)?;
        scored.truncate(limit);
        let results = results_from_scored(&catalog, &scored);
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
    use crate::strategy::sequential::SequentialSimilarityBackend;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn small_device() -> DeviceConfig {
        DeviceConfig {
            units: Some(3),
            ..DeviceConfig::default()
        }
    }

    fn random_catalog(count: usize, dim: usize, seed: u64) -> Arc<Catalog> {
        let mut rng = StdRng::seed_from_u64(seed);
        let records = (0..count)
            .map(|i| {
                let vector = (0..dim).map(|_| rng.random_range(-1.0..1.0)).collect();
                EmbeddingRecord::new(i as u64, vector)
            })
            .collect();
        Arc::new(Catalog::from_records(records).unwrap())
    }

    #[test]
    fn test_unavailable_without_device() {
        let config = DeviceConfig {
            enabled: false,
            ..DeviceConfig::default()
        };
        let backend = ParallelSimilarityBackend::with_config(DistanceMetric::Cosine, &config);

        assert!(!backend.is_available());
        let catalog = random_catalog(4, 8, 1);
        assert!(matches!(
            backend.initialize(&catalog),
            Err(XystonError::Initialization(_))
        ));
    }

    #[test]
    fn test_search_before_initialize_fails() {
        let backend =
            ParallelSimilarityBackend::with_config(DistanceMetric::Cosine, &small_device());
        let result = backend.search(&[1.0; 8], 3, 5);
        assert!(matches!(result, Err(XystonError::NotInitialized(_))));
    }

    #[test]
    fn test_matches_sequential_oracle() {
        let catalog = random_catalog(200, 24, 7);
        let parallel =
            ParallelSimilarityBackend::with_config(DistanceMetric::Cosine, &small_device());
        let sequential = SequentialSimilarityBackend::new(DistanceMetric::Cosine);
        parallel.initialize(&catalog).unwrap();
        sequential.initialize(&catalog).unwrap();

        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..5 {
            let query: Vec<f64> = (0..24).map(|_| rng.random_range(-1.0..1.0)).collect();
            let expected = sequential.search(&query, 10, 50).unwrap();
            let actual = parallel.search(&query, 10, 50).unwrap();

            assert_eq!(
                actual.iter().map(|r| r.id).collect::<Vec<_>>(),
                expected.iter().map(|r| r.id).collect::<Vec<_>>()
            );
            for (a, e) in actual.iter().zip(expected.iter()) {
                assert!((a.score - e.score).abs() <= 1e-6);
            }
        }
    }

    #[test]
    fn test_grouped_reduction_path_matches_oracle() {
        // Threshold of 1 forces every search down the grouped path.
        let config = DeviceConfig {
            units: Some(3),
            group_reduction_threshold: 1,
            ..DeviceConfig::default()
        };
        let catalog = random_catalog(40, 384, 11);
        let parallel = ParallelSimilarityBackend::with_config(DistanceMetric::Cosine, &config);
        let sequential = SequentialSimilarityBackend::new(DistanceMetric::Cosine);
        parallel.initialize(&catalog).unwrap();
        sequential.initialize(&catalog).unwrap();

        let mut rng = StdRng::seed_from_u64(5);
        let query: Vec<f64> = (0..384).map(|_| rng.random_range(-1.0..1.0)).collect();

        let expected = sequential.search(&query, 8, 20).unwrap();
        let actual = parallel.search(&query, 8, 20).unwrap();

        assert_eq!(
            actual.iter().map(|r| r.id).collect::<Vec<_>>(),
            expected.iter().map(|r| r.id).collect::<Vec<_>>()
        );
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert!((a.score - e.score).abs() <= 1e-6);
        }
    }

    #[test]
    fn test_grouped_score_zero_vector_policy() {
        let query = vec![0.0; 512];
        let item = vec![1.0; 512];
        assert_eq!(grouped_score(DistanceMetric::Cosine, &query, &item), 0.0);
    }

    #[test]
    fn test_hybrid_search_skips_excluded_items() {
        let mut records = Vec::new();
        for i in 0..20u64 {
            let mut attributes = std::collections::HashMap::new();
            attributes.insert(
                "parity".to_string(),
                if i % 2 == 0 { "even" } else { "odd" }.to_string(),
            );
            records.push(EmbeddingRecord::with_attributes(
                i,
                vec![i as f64, 1.0, 0.5],
                attributes,
            ));
        }
        let catalog = Arc::new(Catalog::from_records(records).unwrap());

        let backend =
            ParallelSimilarityBackend::with_config(DistanceMetric::Cosine, &small_device());
        backend.initialize(&catalog).unwrap();

        let filter = AttributeFilter::from_pairs([("parity", "odd")]);
        let results = backend
            .hybrid_search(&[1.0, 0.0, 0.0], &filter, 20, 20)
            .unwrap();

        assert_eq!(results.len(), 10);
        assert!(results.iter().all(|r| r.id % 2 == 1));
    }

    #[test]
    fn test_find_similar_to_excludes_probe() {
        let catalog = random_catalog(50, 16, 3);
        let backend =
            ParallelSimilarityBackend::with_config(DistanceMetric::Cosine, &small_device());
        backend.initialize(&catalog).unwrap();

        let results = backend.find_similar_to(7, 10, 20).unwrap();
        assert!(results.iter().all(|r| r.id != 7));
        assert_eq!(results.len(), 10);
    }

    #[test]
    fn test_concurrent_searches() {
        let catalog = random_catalog(100, 16, 21);
        let backend = Arc::new(ParallelSimilarityBackend::with_config(
            DistanceMetric::Cosine,
            &small_device(),
        ));
        backend.initialize(&catalog).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let backend = Arc::clone(&backend);
                std::thread::spawn(move || {
                    let query = vec![(i as f64) * 0.1 + 0.1; 16];
                    backend.search(&query, 5, 20).unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().len(), 5);
        }
        assert_eq!(backend.stats().unwrap().total_search_count, 4);
    }
}
