//! # Xyston
//!
//! A pluggable vector-similarity search engine for Rust.
//!
//! ## Features
//!
//! - Pure Rust implementation
//! - SIMD-accelerated cosine and Euclidean kernels
//! - Interchangeable search strategies behind one trait
//! - Data-parallel and sequential in-process backends
//! - Remote index delegation
//! - Runtime strategy selection, switching, and benchmarking

pub mod catalog;
pub mod config;
pub mod error;
pub mod kernel;
pub mod manager;
pub mod strategy;

pub mod prelude {
    pub use crate::catalog::{Catalog, EmbeddingRecord};
    pub use crate::config::{DeviceConfig, ManagerConfig};
    pub use crate::error::{Result, XystonError};
    pub use crate::kernel::DistanceMetric;
    pub use crate::manager::{BenchmarkReport, StrategyManager};
    pub use crate::strategy::{AttributeFilter, SearchResult, SearchStrategy, StatsSnapshot};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
