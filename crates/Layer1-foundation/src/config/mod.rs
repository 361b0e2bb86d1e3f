//! Config - 통합 설정 관리
//!
//! - `runner.rs` - RunnerConfig / GcConfig

mod runner;

pub use runner::{load_json, GcConfig, RunnerConfig, DEFAULT_REPOSITORY};
