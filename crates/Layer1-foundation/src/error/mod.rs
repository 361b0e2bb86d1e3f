//! Error types for the playground
//!
//! 모든 에러를 중앙에서 관리

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Playground 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 설정 관련
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // 버전/태그 관련
    // ========================================================================
    #[error("Version not found: {0}")]
    VersionNotFound(String),

    // ========================================================================
    // 컨테이너 런타임 관련
    // ========================================================================
    #[error("{op} failed: {message}")]
    Runtime { op: String, message: String },

    /// Runtime answered 404 for the referenced object
    #[error("No such object: {0}")]
    RuntimeNotFound(String),

    // ========================================================================
    // 실행 관련
    // ========================================================================
    #[error("Cancelled")]
    Cancelled,

    #[error("Garbage collection failed: {0}")]
    Gc(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 런타임 호출 실패 에러 생성 헬퍼
    pub fn runtime(op: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Error::Runtime {
            op: op.into(),
            message: err.to_string(),
        }
    }

    /// Prefix the error with the context of the failed call.
    ///
    /// `Cancelled` and `VersionNotFound` pass through untouched so callers can
    /// still tell them apart after wrapping.
    pub fn context(self, prefix: impl Into<String>) -> Self {
        match self {
            Error::Cancelled | Error::VersionNotFound(_) => self,
            Error::Runtime { op, message } => Error::Runtime {
                op: format!("{}: {}", prefix.into(), op),
                message,
            },
            other => Error::Internal(format!("{}: {}", prefix.into(), other)),
        }
    }

    /// 취소된 요청인지 확인
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// 런타임 객체가 존재하지 않는 경우
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::RuntimeNotFound(_))
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
