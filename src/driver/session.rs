//! Session Handle - 세션 핸들
//!
//! 커서와 호출자가 공동 소유하는 세션 핸들.
//! 암시적 세션은 커서가 닫힐 때 정확히 한 번 종료됩니다.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// 세션 ID 발급용 카운터
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// Session - 세션
// ============================================================================

/// 데이터베이스 세션 핸들
///
/// 복제가 저렴한 공유 핸들입니다. 호출자가 만든 명시적 세션은
/// 호출자가 수명을 관리하고, 드라이버가 만든 암시적 세션은
/// 커서가 닫힐 때 자동으로 종료됩니다.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    id: u64,
    implicit: bool,
    ended: AtomicBool,
}

impl Session {
    fn new(implicit: bool) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
                implicit,
                ended: AtomicBool::new(false),
            }),
        }
    }

    /// 암시적 세션 생성 (드라이버 소유)
    pub fn implicit() -> Self {
        Self::new(true)
    }

    /// 명시적 세션 생성 (호출자 소유)
    pub fn explicit() -> Self {
        Self::new(false)
    }

    /// 세션 ID
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// 암시적 세션 여부
    pub fn is_implicit(&self) -> bool {
        self.inner.implicit
    }

    /// 종료 여부
    pub fn is_ended(&self) -> bool {
        self.inner.ended.load(Ordering::Acquire)
    }

    /// 세션 종료
    ///
    /// 이 호출이 실제로 세션을 종료했으면 `true`를 반환합니다.
    /// 두 번째 호출부터는 항상 `false`입니다.
    pub fn end(&self) -> bool {
        !self.inner.ended.swap(true, Ordering::AcqRel)
    }

    /// 암시적 세션만 종료
    ///
    /// 커서 정리 경로에서 사용합니다. 명시적 세션은 건드리지 않습니다.
    pub fn end_if_implicit(&self) -> bool {
        if self.inner.implicit {
            self.end()
        } else {
            false
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
    fn test_session_ids_unique() {
        let a = Session::implicit();
        let b = Session::implicit();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_session_end_exactly_once() {
        let session = Session::implicit();
        assert!(!session.is_ended());

        // 첫 번째 종료만 true
        assert!(session.end());
        assert!(!session.end());
        assert!(session.is_ended());
    }

    #[test]
    fn test_session_end_once_across_clones() {
        let session = Session::implicit();
        let clone = session.clone();

        assert!(session.end());
        // 복제본에서도 이미 종료됨
        assert!(!clone.end());
        assert!(clone.is_ended());
    }

    #[test]
    fn test_explicit_session_not_ended_implicitly() {
        let session = Session::explicit();
        assert!(!session.is_implicit());

        // 암시적 종료 경로는 명시적 세션을 무시
        assert!(!session.end_if_implicit());
        assert!(!session.is_ended());

        assert!(session.end());
        assert!(session.is_ended());
    }

    #[test]
    fn test_implicit_session_ended_implicitly() {
        let session = Session::implicit();
        assert!(session.end_if_implicit());
        assert!(!session.end_if_implicit());
    }
}
