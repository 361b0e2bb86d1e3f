//! Runner Config - 로컬 Docker runner 설정
//!
//! JSON 파일에서 로드되며, 필드 이름은 camelCase를 사용합니다.

use crate::{Error, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 기본 upstream 이미지 저장소
pub const DEFAULT_REPOSITORY: &str = "clickhouse/clickhouse-server";

// ============================================================================
// Runner Config
// ============================================================================

/// 로컬 runner 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerConfig {
    /// Upstream 이미지 저장소
    #[serde(default = "default_repository")]
    pub repository: String,

    /// 컨테이너에 read-only로 마운트할 서버 설정 파일
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_config_path: Option<PathBuf>,

    /// 서버가 준비될 때까지 쿼리를 재시도하는 최대 횟수
    #[serde(default = "default_max_exec_retries")]
    pub max_exec_retries: u32,

    /// 재시도 간격 (ms)
    #[serde(default = "default_exec_retry_delay_ms")]
    pub exec_retry_delay_ms: u64,

    /// GC 설정 (없으면 GC 비활성화)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gc: Option<GcConfig>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            repository: default_repository(),
            custom_config_path: None,
            max_exec_retries: default_max_exec_retries(),
            exec_retry_delay_ms: default_exec_retry_delay_ms(),
            gc: None,
        }
    }
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// JSON 파일에서 로드 후 검증
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = load_json(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.repository.trim().is_empty() {
            return Err(Error::Config("repository must not be empty".to_string()));
        }
        if let Some(gc) = &self.gc {
            gc.validate()?;
        }
        Ok(())
    }

    /// Exec attempts per query; never less than one.
    pub fn exec_attempts(&self) -> u32 {
        self.max_exec_retries.max(1)
    }

    pub fn exec_retry_delay(&self) -> Duration {
        Duration::from_millis(self.exec_retry_delay_ms)
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = repository.into();
        self
    }

    pub fn custom_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.custom_config_path = Some(path.into());
        self
    }

    pub fn exec_retries(mut self, max: u32, delay: Duration) -> Self {
        self.max_exec_retries = max;
        self.exec_retry_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn gc(mut self, gc: GcConfig) -> Self {
        self.gc = Some(gc);
        self
    }
}

// ============================================================================
// GC Config
// ============================================================================

/// Garbage collector 정책
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcConfig {
    /// GC 실행 주기 (초)
    pub trigger_frequency_secs: u64,

    /// 컨테이너 최대 수명 (초). 없으면 hung container 정리를 건너뜀
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_ttl_secs: Option<u64>,

    /// 이미지 정리를 시작할 후보 이미지 수. 없으면 이미지 정리 비활성화
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_gc_count_threshold: Option<u32>,

    /// 정리 후 남겨둘 최근 태그된 이미지 수
    #[serde(default)]
    pub image_buffer_size: u32,
}

impl GcConfig {
    pub fn new(trigger_frequency: Duration) -> Self {
        Self {
            trigger_frequency_secs: trigger_frequency.as_secs(),
            container_ttl_secs: None,
            image_gc_count_threshold: None,
            image_buffer_size: 0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.trigger_frequency_secs == 0 {
            return Err(Error::Config(
                "gc.triggerFrequencySecs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn trigger_frequency(&self) -> Duration {
        Duration::from_secs(self.trigger_frequency_secs)
    }

    pub fn container_ttl(&self) -> Option<Duration> {
        self.container_ttl_secs.map(Duration::from_secs)
    }

    pub fn with_container_ttl(mut self, ttl: Duration) -> Self {
        self.container_ttl_secs = Some(ttl.as_secs());
        self
    }

    pub fn with_image_eviction(mut self, threshold: u32, buffer_size: u32) -> Self {
        self.image_gc_count_threshold = Some(threshold);
        self.image_buffer_size = buffer_size;
        self
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// JSON 파일 로드
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

fn default_repository() -> String {
    DEFAULT_REPOSITORY.to_string()
}

fn default_max_exec_retries() -> u32 {
    20
}

fn default_exec_retry_delay_ms() -> u64 {
    500
}
