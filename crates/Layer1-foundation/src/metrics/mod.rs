//! Metrics - 파이프라인 관측 이벤트
//!
//! 관측 전용이며 제어 흐름에 영향을 주지 않습니다.

use std::time::Duration;

/// 파이프라인/GC 관측 이벤트
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// 캐시된 이미지 확인 (cache hit)
    PullExistedImage {
        ok: bool,
        version: String,
        elapsed: Duration,
    },
    /// 새 이미지 pull + retag
    PullNewImage {
        ok: bool,
        version: String,
        elapsed: Duration,
    },
    CreateContainer {
        ok: bool,
        version: String,
        elapsed: Duration,
    },
    StartContainer {
        ok: bool,
        version: String,
        elapsed: Duration,
    },
    ExecCommand {
        ok: bool,
        version: String,
        elapsed: Duration,
    },
    RunQuery {
        ok: bool,
        version: String,
        elapsed: Duration,
    },
    RemoveContainer { ok: bool, elapsed: Duration },
    /// 컨테이너 GC 결과
    ContainersCollected {
        count: u64,
        space_reclaimed: u64,
        elapsed: Duration,
    },
    /// 이미지 GC 결과
    ImagesCollected {
        count: u64,
        space_reclaimed: u64,
        elapsed: Duration,
    },
}

impl Observation {
    /// 메트릭 이름
    pub fn name(&self) -> &'static str {
        match self {
            Self::PullExistedImage { .. } => "pull_existed_image",
            Self::PullNewImage { .. } => "pull_new_image",
            Self::CreateContainer { .. } => "create_container",
            Self::StartContainer { .. } => "start_container",
            Self::ExecCommand { .. } => "exec_command",
            Self::RunQuery { .. } => "run_query",
            Self::RemoveContainer { .. } => "remove_container",
            Self::ContainersCollected { .. } => "gc_containers_collected",
            Self::ImagesCollected { .. } => "gc_images_collected",
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            Self::PullExistedImage { elapsed, .. }
            | Self::PullNewImage { elapsed, .. }
            | Self::CreateContainer { elapsed, .. }
            | Self::StartContainer { elapsed, .. }
            | Self::ExecCommand { elapsed, .. }
            | Self::RunQuery { elapsed, .. }
            | Self::RemoveContainer { elapsed, .. }
            | Self::ContainersCollected { elapsed, .. }
            | Self::ImagesCollected { elapsed, .. } => *elapsed,
        }
    }
}

/// 메트릭 싱크 - fire-and-forget
pub trait MetricsSink: Send + Sync {
    fn observe(&self, observation: Observation);
}

/// tracing debug 이벤트로 기록하는 싱크
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetrics;

impl MetricsSink for TracingMetrics {
    fn observe(&self, observation: Observation) {
        let elapsed_ms = observation.elapsed().as_millis() as u64;
        match &observation {
            Observation::PullExistedImage { ok, version, .. }
            | Observation::PullNewImage { ok, version, .. }
            | Observation::CreateContainer { ok, version, .. }
            | Observation::StartContainer { ok, version, .. }
            | Observation::ExecCommand { ok, version, .. }
            | Observation::RunQuery { ok, version, .. } => {
                tracing::debug!(
                    target: "playground::metrics",
                    metric = observation.name(),
                    ok,
                    version = %version,
                    elapsed_ms,
                );
            }
            Observation::RemoveContainer { ok, .. } => {
                tracing::debug!(
                    target: "playground::metrics",
                    metric = observation.name(),
                    ok,
                    elapsed_ms,
                );
            }
            Observation::ContainersCollected {
                count,
                space_reclaimed,
                ..
            }
            | Observation::ImagesCollected {
                count,
                space_reclaimed,
                ..
            } => {
                tracing::debug!(
                    target: "playground::metrics",
                    metric = observation.name(),
                    count,
                    space_reclaimed,
                    elapsed_ms,
                );
            }
        }
    }
}

/// 아무것도 기록하지 않는 싱크
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn observe(&self, _observation: Observation) {}
}
