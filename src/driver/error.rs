//! Driver Error Types
//!
//! 드라이버 에러 정의

use std::io;
use thiserror::Error;

// ============================================================================
// DriverError - 드라이버 에러
// ============================================================================

/// 드라이버 에러
#[derive(Error, Debug)]
pub enum DriverError {
    /// 연결 에러
    #[error("Connection error: {0}")]
    Connection(String),

    /// 세션 에러
    #[error("Session error: {0}")]
    Session(String),

    /// 닫힌 드라이버 사용 시도
    #[error("Driver is closed")]
    Closed,

    /// 풀 에러
    #[error("Pool error: {0}")]
    Pool(String),

    /// 설정 에러
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 타임아웃 에러
    #[error("Timeout: {0}")]
    Timeout(String),

    /// 선택 가능한 서버 없음
    #[error("No server available: {0}")]
    NoServerAvailable(String),

    /// 재개 토큰 누락 (문서에 _id 없음)
    #[error("Missing resume token: document has no _id field")]
    MissingResumeToken,

    /// 커서 페치 에러 (getMore / killCursors)
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// I/O 에러
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// 내부 에러
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DriverError {
    /// 연결 에러 생성
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// 세션 에러 생성
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// 풀 에러 생성
    pub fn pool(msg: impl Into<String>) -> Self {
        Self::Pool(msg.into())
    }

    /// 설정 에러 생성
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// 타임아웃 에러 생성
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// 서버 없음 에러 생성
    pub fn no_server_available(msg: impl Into<String>) -> Self {
        Self::NoServerAvailable(msg.into())
    }

    /// 페치 에러 생성
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    /// 내부 에러 생성
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// 일시적 에러 여부
    ///
    /// 풀 파퓰레이터는 일시적 에러를 백오프 후 재시도하며,
    /// 포그라운드 호출자에게 전파하지 않습니다.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_) | Self::Io(_))
    }

    /// 클라이언트 에러 여부
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Session(_) | Self::Closed | Self::MissingResumeToken
        )
    }
}

// ============================================================================
// Result Type
// ============================================================================

/// 드라이버 결과 타입
pub type DriverResult<T> = Result<T, DriverError>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_creation() {
        let err = DriverError::connection("Connection refused");
        assert!(matches!(err, DriverError::Connection(_)));

        let err = DriverError::no_server_available("no readable server");
        assert!(matches!(err, DriverError::NoServerAvailable(_)));

        let err = DriverError::fetch("cursor 42 not found");
        assert!(matches!(err, DriverError::Fetch(_)));
    }

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::connection("Connection refused");
        assert_eq!(err.to_string(), "Connection error: Connection refused");

        let err = DriverError::MissingResumeToken;
        assert_eq!(
            err.to_string(),
            "Missing resume token: document has no _id field"
        );

        assert_eq!(DriverError::Closed.to_string(), "Driver is closed");
    }

    #[test]
    fn test_driver_error_transient() {
        assert!(DriverError::connection("refused").is_transient());
        assert!(DriverError::timeout("handshake").is_transient());
        assert!(!DriverError::MissingResumeToken.is_transient());
        assert!(!DriverError::fetch("cursor gone").is_transient());
    }

    #[test]
    fn test_driver_error_client_error() {
        assert!(DriverError::configuration("bad uri").is_client_error());
        assert!(DriverError::Closed.is_client_error());
        assert!(DriverError::MissingResumeToken.is_client_error());
        assert!(!DriverError::connection("refused").is_client_error());
    }
}
