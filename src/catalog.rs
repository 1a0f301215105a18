//! Embedding catalog: the immutable collection a strategy searches over.
//!
//! A [`Catalog`] is built once from caller-supplied [`EmbeddingRecord`]s and
//! never mutated afterwards; strategies share it behind an `Arc` and the only
//! way to change the data is to build a new catalog and re-initialize.
//! Vectors are stored in one contiguous row-major buffer so backends can hand
//! the whole thing to their execution context in a single transfer.

use std::collections::HashMap;

use ahash::AHashMap;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Result, XystonError};

/// One embedding supplied by the caller at ingest time.
///
/// `attributes` are opaque key/value pairs (the caller's own vocabulary);
/// the engine only ever applies exact-match predicates to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Unique identifier within one catalog.
    pub id: u64,
    /// Opaque attribute map, passed through to search results.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    /// The embedding itself. All records in a catalog share one dimension.
    pub vector: Vec<f64>,
}

impl EmbeddingRecord {
    /// Create a record without attributes.
    pub fn new(id: u64, vector: Vec<f64>) -> Self {
        Self {
            id,
            attributes: HashMap::new(),
            vector,
        }
    }

    /// Create a record with attributes.
    pub fn with_attributes(
        id: u64,
        vector: Vec<f64>,
        attributes: HashMap<String, String>,
    ) -> Self {
        Self {
            id,
            attributes,
            vector,
        }
    }
}

/// Immutable, validated collection of embeddings with a flat vector buffer.
#[derive(Debug)]
pub struct Catalog {
    ids: Vec<u64>,
    attributes: Vec<HashMap<String, String>>,
    flat: Vec<f64>,
    dim: usize,
    position_by_id: AHashMap<u64, usize>,
}

impl Catalog {
    /// Build a catalog from raw records.
    ///
    /// The dimension is fixed by the first accepted record. A record whose
    /// dimension differs is a hard initialization error; a record containing
    /// non-finite components, or one reusing an already-seen id, is logged
    /// and skipped without failing the whole ingest.
    pub fn from_records(records: Vec<EmbeddingRecord>) -> Result<Self> {
        if records.is_empty() {
            return Err(XystonError::initialization(
                "cannot build a catalog from zero records",
            ));
        }

        let mut ids = Vec::with_capacity(records.len());
        let mut attributes = Vec::with_capacity(records.len());
        let mut flat: Vec<f64> = Vec::new();
        let mut position_by_id = AHashMap::with_capacity(records.len());
        let mut dim: Option<usize> = None;

        for record in records {
            if !record.vector.iter().all(|x| x.is_finite()) {
                warn!(
                    "skipping record {}: vector contains non-finite components",
                    record.id
                );
                continue;
            }

            match dim {
                None => {
                    if record.vector.is_empty() {
                        return Err(XystonError::initialization(
                            "embedding vectors must be non-empty",
                        ));
                    }
                    dim = Some(record.vector.len());
                    flat.reserve(record.vector.len() * 64);
                }
                Some(d) if record.vector.len() != d => {
                    return Err(XystonError::initialization(format!(
                        "dimension mismatch in record {}: expected {d}, got {}",
                        record.id,
                        record.vector.len()
                    )));
                }
                Some(_) => {}
            }

            if position_by_id.contains_key(&record.id) {
                warn!("skipping record {}: duplicate id", record.id);
                continue;
            }

            position_by_id.insert(record.id, ids.len());
            ids.push(record.id);
            attributes.push(record.attributes);
            flat.extend_from_slice(&record.vector);
        }

        let dim = dim.ok_or_else(|| {
            XystonError::initialization("no valid records remained after ingest validation")
        })?;

        Ok(Self {
            ids,
            attributes,
            flat,
            dim,
            position_by_id,
        })
    }

    /// Number of embeddings in the catalog.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True if the catalog holds no embeddings.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The shared vector dimensionality.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// The contiguous row-major vector buffer (`len() * dim()` values).
    pub fn flat_vectors(&self) -> &[f64] {
        &self.flat
    }

    /// The vector stored at a catalog position.
    pub fn vector_at(&self, position: usize) -> &[f64] {
        &self.flat[position * self.dim..(position + 1) * self.dim]
    }

    /// The record id at a catalog position.
    pub fn id_at(&self, position: usize) -> u64 {
        self.ids[position]
    }

    /// The attribute map at a catalog position.
    pub fn attributes_at(&self, position: usize) -> &HashMap<String, String> {
        &self.attributes[position]
    }

    /// Look up the position of a record id.
    pub fn position_of(&self, id: u64) -> Option<usize> {
        self.position_by_id.get(&id).copied()
    }

    /// Approximate resident size of the vector buffer in megabytes.
    pub fn memory_footprint_mb(&self) -> f64 {
        (self.flat.len() * std::mem::size_of::<f64>()) as f64 / (1024.0 * 1024.0)
    }
}
