//! 에러 타입
//!
//! 라이브러리 전체에서 사용하는 판별 가능한 에러 타입입니다.
//! 호출자는 `kind()`로 패턴 매칭하여 처리 방식을 결정합니다.
//!
//! - 소스 읽기 실패: 해당 소스만 건너뜀
//! - 인덱스 미준비: 검색 호출이 명시적으로 실패
//! - 백엔드 일시 오류: 재시도 후 `FatalBackend`로 승격
//! - 생성 출력 파싱 실패: 결정적 폴백 레코드로 해소 (치명적이지 않음)
//! - 영속 데이터 손상: 치명적, 부분 데이터를 서빙하지 않음

use thiserror::Error;

/// 라이브러리 Result 별칭
pub type Result<T> = std::result::Result<T, RiaError>;

/// 에러 종류 (패턴 매칭용)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SourceRead,
    NotReady,
    TransientBackend,
    FatalBackend,
    MalformedOutput,
    PersistenceCorruption,
    DimensionMismatch,
    InvalidInput,
    Io,
    Serialization,
}

/// ria-assist 에러
#[derive(Debug, Error)]
pub enum RiaError {
    /// 소스 문서를 읽지 못함 (배치는 계속 진행)
    #[error("Failed to read source {locator}: {reason}")]
    SourceRead { locator: String, reason: String },

    /// 벡터라이저 또는 인덱스가 아직 fit/build 되지 않음
    #[error("Index not ready: {0}")]
    NotReady(String),

    /// 타임아웃, 429, 5xx 등 재시도 가능한 백엔드 오류
    #[error("Transient generation backend error: {0}")]
    TransientBackend(String),

    /// 재시도 소진 또는 재시도 불가 응답
    #[error("Generation backend failed: {0}")]
    FatalBackend(String),

    /// 생성 백엔드 출력이 기대 스키마가 아님
    #[error("Malformed generation output: {0}")]
    MalformedOutput(String),

    /// 인덱스/메타데이터 쌍이 일치하지 않음
    #[error("Persistence corruption: {0}")]
    PersistenceCorruption(String),

    /// 벡터 차원 불일치
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// 잘못된 입력
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl RiaError {
    /// 에러 종류 반환
    pub fn kind(&self) -> ErrorKind {
        match self {
            RiaError::SourceRead { .. } => ErrorKind::SourceRead,
            RiaError::NotReady(_) => ErrorKind::NotReady,
            RiaError::TransientBackend(_) => ErrorKind::TransientBackend,
            RiaError::FatalBackend(_) => ErrorKind::FatalBackend,
            RiaError::MalformedOutput(_) => ErrorKind::MalformedOutput,
            RiaError::PersistenceCorruption(_) => ErrorKind::PersistenceCorruption,
            RiaError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            RiaError::InvalidInput(_) => ErrorKind::InvalidInput,
            RiaError::Io(_) => ErrorKind::Io,
            RiaError::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// 경계까지 전파되어야 하는 하드 실패인지 여부
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::FatalBackend | ErrorKind::PersistenceCorruption
        )
    }

    /// 재시도 대상인지 여부
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::TransientBackend
    }

    pub(crate) fn source_read(locator: impl Into<String>, reason: impl ToString) -> Self {
        RiaError::SourceRead {
            locator: locator.into(),
            reason: reason.to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_backend_exhaustion_and_corruption_are_fatal() {
        assert!(RiaError::FatalBackend("x".into()).is_fatal());
        assert!(RiaError::PersistenceCorruption("x".into()).is_fatal());

        assert!(!RiaError::NotReady("x".into()).is_fatal());
        assert!(!RiaError::TransientBackend("x".into()).is_fatal());
        assert!(!RiaError::MalformedOutput("x".into()).is_fatal());
        assert!(!RiaError::source_read("a.pdf", "gone").is_fatal());
    }

    #[test]
    fn test_kind_matches_variant() {
        let err = RiaError::DimensionMismatch {
            expected: 3,
            actual: 4,
        };
        assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
        assert!(err.to_string().contains("expected 3"));

        let io = RiaError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert_eq!(io.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_transient_detection() {
        assert!(RiaError::TransientBackend("429".into()).is_transient());
        assert!(!RiaError::FatalBackend("400".into()).is_transient());
    }
}
