//! # playground-foundation
//!
//! Foundation layer for the query playground:
//! - Error: 에러 타입 (thiserror)
//! - Config: RunnerConfig / GcConfig (JSON)
//! - Tag: 버전 → digest 스냅샷 (read-only interface)
//! - Metrics: 관측 이벤트 싱크

pub mod config;
pub mod error;
pub mod metrics;
pub mod tag;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{load_json, GcConfig, RunnerConfig, DEFAULT_REPOSITORY};

// ============================================================================
// Tag (이미지 태그)
// ============================================================================
pub use tag::{ImageTag, ImageTagStorage, InMemoryTagStorage};

// ============================================================================
// Metrics (관측)
// ============================================================================
pub use metrics::{MetricsSink, NoopMetrics, Observation, TracingMetrics};
