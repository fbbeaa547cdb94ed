//! Transport Seam - 전송 계층 경계
//!
//! 커맨드 인코딩/전송은 이 크레이트의 범위 밖이며,
//! 커서가 소비하는 최소 계약만 트레이트로 정의합니다.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::document::{Document, ResumeToken};
use super::error::DriverResult;

// ============================================================================
// Namespace - 네임스페이스
// ============================================================================

/// 네임스페이스 (데이터베이스.컬렉션)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    /// 데이터베이스 이름
    pub database: String,
    /// 컬렉션 이름
    pub collection: String,
}

impl Namespace {
    /// 새 네임스페이스 생성
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }

    /// `db.coll` 형식 문자열에서 파싱
    pub fn parse(s: &str) -> Option<Self> {
        let (database, collection) = s.split_once('.')?;
        if database.is_empty() || collection.is_empty() {
            return None;
        }
        Some(Self::new(database, collection))
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

// ============================================================================
// BatchResult - 배치 결과
// ============================================================================

/// 한 번의 라운드트립이 반환한 배치
///
/// 최초 쿼리와 이후의 모든 getMore가 같은 형태를 반환합니다.
#[derive(Debug, Clone)]
pub struct BatchResult {
    /// 서버가 부여한 커서 ID (0이면 서버 측에서 커서가 닫힘)
    pub cursor_id: i64,
    /// 결과의 네임스페이스 (서버가 알려준 경우)
    pub namespace: Option<Namespace>,
    /// 배치의 문서들 (순서 유지)
    pub documents: Vec<Document>,
    /// 배치 경계 기준 재개 토큰
    pub post_batch_resume_token: Option<ResumeToken>,
}

impl BatchResult {
    /// 새 배치 결과 생성
    pub fn new(cursor_id: i64, documents: Vec<Document>) -> Self {
        Self {
            cursor_id,
            namespace: None,
            documents,
            post_batch_resume_token: None,
        }
    }

    /// 네임스페이스 설정
    pub fn with_namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = Some(namespace);
        self
    }

    /// 배치 경계 재개 토큰 설정
    pub fn with_post_batch_resume_token(mut self, token: ResumeToken) -> Self {
        self.post_batch_resume_token = Some(token);
        self
    }

    /// 배치의 문서 수
    pub fn returned_count(&self) -> usize {
        self.documents.len()
    }
}

// ============================================================================
// QueryTransport - 쿼리 전송 계약
// ============================================================================

/// 커서가 의존하는 전송 계층 계약
///
/// 구현체는 고정된 서버(핀 서버)에 대해 커맨드를 인코딩하고
/// 전송하는 책임을 집니다.
#[async_trait]
pub trait QueryTransport: Send + Sync {
    /// 커서 확장 (getMore)
    ///
    /// 커서는 이 호출을 절대 재시도하지 않습니다. 재시도된 getMore는
    /// 문서 누락이나 중복을 일으킬 수 있습니다.
    async fn get_more(
        &self,
        namespace: &Namespace,
        cursor_id: i64,
        batch_size: Option<u32>,
    ) -> DriverResult<BatchResult>;

    /// 커서 정리 (killCursors)
    ///
    /// 서버 측에서 이미 닫힌 커서에 대해 멱등해야 합니다.
    async fn kill_cursor(&self, namespace: &Namespace, cursor_id: i64) -> DriverResult<()>;
}

// ============================================================================
// Tests
// ============================================================================
