//! Cursor - 커서
//!
//! 서버가 보관하는 결과 집합에 대한 클라이언트 측 반복자.
//! 고정된 서버(핀 서버)에 후속 getMore를 보내고, 반복이 어떤
//! 경로로 끝나든 서버 측 커서 자원을 해제합니다.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::stream::{self, Stream};

use super::document::{Document, ResumeToken};
use super::driver::ServerAddress;
use super::error::{DriverError, DriverResult};
use super::registry::CursorRegistry;
use super::session::Session;
use super::transport::{BatchResult, Namespace, QueryTransport};

// ============================================================================
// CursorOptions - 커서 옵션
// ============================================================================

/// 커서 옵션
#[derive(Debug, Clone, Default)]
pub struct CursorOptions {
    /// 원 쿼리의 limit (양수일 때만 의미 있음)
    pub limit: Option<u64>,
    /// getMore 배치 크기
    pub batch_size: Option<u32>,
    /// 재개 토큰 추적 여부 (변경 스트림류 커서)
    pub track_resume_tokens: bool,
}

impl CursorOptions {
    /// 빌더 패턴으로 옵션 생성
    pub fn builder() -> CursorOptionsBuilder {
        CursorOptionsBuilder::default()
    }
}

/// 커서 옵션 빌더
#[derive(Debug, Clone, Default)]
pub struct CursorOptionsBuilder {
    options: CursorOptions,
}

impl CursorOptionsBuilder {
    /// limit 설정 (0은 무제한으로 취급)
    pub fn limit(mut self, limit: u64) -> Self {
        self.options.limit = if limit > 0 { Some(limit) } else { None };
        self
    }

    /// 배치 크기 설정
    pub fn batch_size(mut self, batch_size: u32) -> Self {
        self.options.batch_size = Some(batch_size);
        self
    }

    /// 재개 토큰 추적 활성화
    pub fn track_resume_tokens(mut self, track: bool) -> Self {
        self.options.track_resume_tokens = track;
        self
    }

    /// 옵션 빌드
    pub fn build(self) -> CursorOptions {
        self.options
    }
}

// ============================================================================
// Cursor - 커서
// ============================================================================

/// 서버 결과 집합에 대한 반복자
///
/// 첫 배치(초기 쿼리 결과)로 생성되며, 버퍼가 비면 핀 서버에
/// getMore를 보냅니다. getMore는 절대 재시도하지 않습니다.
/// 반복 도중 버려져도 레지스트리를 통해 서버 측 커서가 정리됩니다.
pub struct Cursor {
    transport: Arc<dyn QueryTransport>,
    registry: Arc<CursorRegistry>,
    namespace: Namespace,
    address: ServerAddress,
    session: Option<Session>,
    /// 서버가 부여한 커서 ID (0이면 서버 측에서 닫힘)
    cursor_id: i64,
    /// 아직 소비되지 않은 문서
    buffer: VecDeque<Document>,
    /// 남은 limit 예산 (원 쿼리에 limit이 없으면 None)
    remaining: Option<u64>,
    limit: Option<u64>,
    batch_size: Option<u32>,
    track_resume_tokens: bool,
    /// 마지막으로 확인한 재개 토큰
    resume_token: Option<ResumeToken>,
    /// 현재 배치의 경계 토큰 (배치 소진 시 resume_token을 덮어씀)
    boundary_token: Option<ResumeToken>,
    /// 클라이언트 측에서 종료됨 (명시적 kill 또는 치명적 오류)
    killed: bool,
}

impl Cursor {
    /// 초기 쿼리 결과로 커서 생성
    pub fn new(
        transport: Arc<dyn QueryTransport>,
        registry: Arc<CursorRegistry>,
        address: ServerAddress,
        namespace: Namespace,
        initial: BatchResult,
        session: Option<Session>,
        options: CursorOptions,
    ) -> Self {
        let mut cursor = Self {
            transport,
            registry,
            namespace,
            address,
            session,
            cursor_id: 0,
            buffer: VecDeque::new(),
            remaining: options.limit,
            limit: options.limit,
            batch_size: options.batch_size,
            track_resume_tokens: options.track_resume_tokens,
            resume_token: None,
            boundary_token: None,
            killed: false,
        };
        if let Some(ns) = initial.namespace.clone() {
            cursor.namespace = ns;
        }
        cursor.registry.register(initial.cursor_id);
        cursor.apply_batch(initial);
        cursor
    }

    /// 커서 ID
    pub fn id(&self) -> i64 {
        self.cursor_id
    }

    /// 네임스페이스
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// 핀 서버 주소
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// 세션 핸들
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// 버퍼에 남은 문서 수
    pub fn buffered_count(&self) -> usize {
        self.buffer.len()
    }

    /// 서버 측에서 커서가 닫혔는지 여부
    pub fn is_exhausted(&self) -> bool {
        self.cursor_id == 0
    }

    /// 더 이상 어떤 fetch도 일어나지 않는 상태인지 여부
    ///
    /// 버퍼에 남은 문서는 여전히 소비할 수 있습니다.
    pub fn is_closed(&self) -> bool {
        self.killed || self.cursor_id == 0
    }

    /// 마지막으로 확인한 재개 토큰
    pub fn resume_token(&self) -> Option<&ResumeToken> {
        self.resume_token.as_ref()
    }

    /// 유효 배치 크기 (설정값이 양수면 그 값, 아니면 원 쿼리 limit)
    pub fn effective_batch_size(&self) -> Option<u32> {
        match self.batch_size {
            Some(size) if size > 0 => Some(size),
            _ => self.limit.map(|l| l.min(u32::MAX as u64) as u32),
        }
    }

    /// 다음 문서 한 건 가져오기
    ///
    /// 버퍼가 비어 있고 커서가 열려 있으면 getMore를 정확히 한 번
    /// 보냅니다. fetch 후에도 버퍼가 비어 있으면 (빈 배치) `None`을
    /// 반환하며, 이는 커서 소진과 다릅니다 — `is_closed`로 구분합니다.
    pub async fn try_next(&mut self) -> DriverResult<Option<Document>> {
        if let Some(doc) = self.buffer.pop_front() {
            return self.yield_document(doc).map(Some);
        }

        if self.is_closed() {
            self.end_session();
            return Ok(None);
        }

        // limit 예산 소진: fetch 대신 서버 자원을 조기 해제
        if self.remaining == Some(0) {
            self.kill_early().await?;
            return Ok(None);
        }

        self.fetch_more().await?;

        match self.buffer.pop_front() {
            Some(doc) => self.yield_document(doc).map(Some),
            None => Ok(None),
        }
    }

    /// 남은 문서를 모두 순회하며 visitor 호출
    pub async fn for_each<F>(&mut self, mut visitor: F) -> DriverResult<()>
    where
        F: FnMut(Document),
    {
        loop {
            match self.try_next().await? {
                Some(doc) => visitor(doc),
                None => {
                    if self.is_closed() && self.buffer.is_empty() {
                        return Ok(());
                    }
                    // 빈 배치: 커서는 열려 있으므로 계속 진행
                }
            }
        }
    }

    /// 남은 문서를 모두 수집
    pub async fn collect_remaining(&mut self) -> DriverResult<Vec<Document>> {
        let mut documents = Vec::new();
        self.for_each(|doc| documents.push(doc)).await?;
        Ok(documents)
    }

    /// 커서를 문서 스트림으로 변환
    ///
    /// 스트림은 커서가 닫히고 버퍼가 소진되면 끝납니다. 오류가
    /// 한 번 나오면 커서는 닫히고 스트림도 곧 끝납니다.
    pub fn into_stream(self) -> impl Stream<Item = DriverResult<Document>> {
        stream::unfold(self, |mut cursor| async move {
            loop {
                match cursor.try_next().await {
                    Ok(Some(doc)) => return Some((Ok(doc), cursor)),
                    Ok(None) => {
                        if cursor.is_closed() && cursor.buffer.is_empty() {
                            return None;
                        }
                        // 빈 배치, 커서는 열려 있음
                    }
                    Err(err) => return Some((Err(err), cursor)),
                }
            }
        })
    }

    /// 커서 명시적 종료
    ///
    /// 서버 측 커서가 살아 있으면 kill을 보냅니다. kill은 한 번만
    /// 재시도되며, 실패는 호출자에게 전달됩니다. 세션 정리는 kill
    /// 성공 여부와 무관하게 수행됩니다.
    pub async fn close(&mut self) -> DriverResult<()> {
        self.buffer.clear();
        self.boundary_token = None;

        let id = self.cursor_id;
        self.cursor_id = 0;
        self.killed = true;
        self.end_session();

        if id != 0 {
            self.registry.unregister(id);
            self.kill_with_retry(id).await?;
        }
        Ok(())
    }

    /// 문서 한 건을 내보내기 전 토큰/예산 갱신
    fn yield_document(&mut self, doc: Document) -> DriverResult<Document> {
        if self.track_resume_tokens {
            match ResumeToken::from_document(&doc) {
                Some(token) => self.resume_token = Some(token),
                None => {
                    // 토큰 연속성이 깨졌으므로 반복을 중단하고 정리
                    self.abandon();
                    return Err(DriverError::MissingResumeToken);
                }
            }
        }

        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }

        // 배치 소진: 경계 토큰이 문서 토큰을 덮어씀
        if self.buffer.is_empty() {
            if let Some(token) = self.boundary_token.take() {
                self.resume_token = Some(token);
            }
        }

        Ok(doc)
    }

    /// getMore 한 번 (재시도 없음)
    ///
    /// 실패하면 서버 측 커서를 최선책으로 정리한 뒤 원래 오류를
    /// 그대로 전달합니다. 정리 실패는 원래 오류를 가리지 않도록
    /// 로그만 남깁니다.
    async fn fetch_more(&mut self) -> DriverResult<()> {
        // 남은 limit 예산보다 큰 배치는 요청하지 않는다
        let batch_size = match (self.effective_batch_size(), self.remaining) {
            (Some(size), Some(remaining)) => Some(size.min(remaining.min(u32::MAX as u64) as u32)),
            (None, Some(remaining)) => Some(remaining.min(u32::MAX as u64) as u32),
            (size, None) => size,
        };
        match self
            .transport
            .get_more(&self.namespace, self.cursor_id, batch_size)
            .await
        {
            Ok(batch) => {
                self.apply_batch(batch);
                Ok(())
            }
            Err(err) => {
                let id = self.cursor_id;
                self.cursor_id = 0;
                self.killed = true;
                self.registry.unregister(id);
                if let Err(kill_err) = self.kill_with_retry(id).await {
                    tracing::warn!(
                        cursor_id = id,
                        namespace = %self.namespace,
                        error = %kill_err,
                        "Cursor cleanup after failed fetch did not succeed"
                    );
                }
                self.end_session();
                Err(err)
            }
        }
    }

    /// 배치를 커서 상태에 반영
    fn apply_batch(&mut self, batch: BatchResult) {
        let previous_id = self.cursor_id;
        self.cursor_id = batch.cursor_id;

        if previous_id != 0 && previous_id != batch.cursor_id {
            self.registry.unregister(previous_id);
            self.registry.register(batch.cursor_id);
        }

        let mut documents = batch.documents;
        if let Some(remaining) = self.remaining {
            documents.truncate(remaining as usize);
        }
        self.buffer.extend(documents);

        // 경계 토큰은 배치마다 무조건 교체된다. 빈 배치라도 경계는
        // 진행 정보를 실어 나르므로 즉시 반영한다.
        self.boundary_token = batch.post_batch_resume_token;
        if self.buffer.is_empty() {
            if let Some(token) = self.boundary_token.take() {
                self.resume_token = Some(token);
            }
        }

        if self.cursor_id == 0 {
            self.end_session();
        }
    }

    /// limit 소진 시 조기 kill
    ///
    /// kill 실패는 `close`와 마찬가지로 호출자에게 전달됩니다. 이때
    /// 서버 측 커서는 리퍼가 마저 정리하도록 레지스트리에 예약됩니다.
    async fn kill_early(&mut self) -> DriverResult<()> {
        let id = self.cursor_id;
        self.cursor_id = 0;
        self.killed = true;
        self.registry.unregister(id);
        let result = self.kill_with_retry(id).await;
        if result.is_err() {
            self.registry
                .schedule_kill(id, self.namespace.clone(), self.address.clone());
        }
        self.end_session();
        result
    }

    /// killCursors 전송 (일시적 오류는 한 번만 재시도)
    async fn kill_with_retry(&mut self, cursor_id: i64) -> DriverResult<()> {
        match self.transport.kill_cursor(&self.namespace, cursor_id).await {
            Ok(()) => Ok(()),
            Err(first) if first.is_transient() => self
                .transport
                .kill_cursor(&self.namespace, cursor_id)
                .await
                .map_err(|_| first),
            Err(err) => Err(err),
        }
    }

    /// 커서를 즉시 닫힘 상태로 만들고 서버 정리를 레지스트리에 위임
    fn abandon(&mut self) {
        let id = self.cursor_id;
        self.cursor_id = 0;
        self.killed = true;
        self.buffer.clear();
        self.boundary_token = None;
        if id != 0 {
            self.registry
                .schedule_kill(id, self.namespace.clone(), self.address.clone());
        }
        self.end_session();
    }

    /// 암시적 세션 종료 (여러 번 불려도 한 번만 종료됨)
    fn end_session(&mut self) {
        if let Some(session) = self.session.as_ref() {
            if session.end_if_implicit() {
                tracing::trace!(session_id = session.id(), "Implicit session ended");
            }
        }
    }
}

impl Drop for Cursor {
    /// 소진 전에 버려진 커서의 서버 자원 해제 예약
    ///
    /// Drop에서는 I/O를 하지 않습니다. kill은 레지스트리에 등록되고
    /// 백그라운드 리퍼가 수행합니다.
    fn drop(&mut self) {
        if self.cursor_id != 0 && !self.killed {
            self.registry
                .schedule_kill(self.cursor_id, self.namespace.clone(), self.address.clone());
        }
        self.end_session();
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("cursor_id", &self.cursor_id)
            .field("namespace", &self.namespace)
            .field("address", &self.address)
            .field("buffered", &self.buffer.len())
            .field("remaining", &self.remaining)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 배치 대본을 순서대로 재생하는 전송 계층
    struct ScriptedTransport {
        batches: Mutex<VecDeque<DriverResult<BatchResult>>>,
        get_more_calls: AtomicUsize,
        requested_sizes: Mutex<Vec<Option<u32>>>,
        kills: Mutex<Vec<i64>>,
        kill_failures: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(batches: Vec<DriverResult<BatchResult>>) -> Arc<Self> {
            Arc::new(Self {
                batches: Mutex::new(batches.into()),
                get_more_calls: AtomicUsize::new(0),
                requested_sizes: Mutex::new(Vec::new()),
                kills: Mutex::new(Vec::new()),
                kill_failures: AtomicUsize::new(0),
            })
        }

        fn failing_kills(self: Arc<Self>, failures: usize) -> Arc<Self> {
            self.kill_failures.store(failures, Ordering::SeqCst);
            self
        }

        fn killed_ids(&self) -> Vec<i64> {
            self.kills.lock().clone()
        }

        fn requested_sizes(&self) -> Vec<Option<u32>> {
            self.requested_sizes.lock().clone()
        }
    }

    #[async_trait::async_trait]
    impl QueryTransport for ScriptedTransport {
        async fn get_more(
            &self,
            _namespace: &Namespace,
            _cursor_id: i64,
            batch_size: Option<u32>,
        ) -> DriverResult<BatchResult> {
            self.get_more_calls.fetch_add(1, Ordering::SeqCst);
            self.requested_sizes.lock().push(batch_size);
            self.batches
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(BatchResult::new(0, vec![])))
        }

        async fn kill_cursor(&self, _namespace: &Namespace, cursor_id: i64) -> DriverResult<()> {
            if self.kill_failures.load(Ordering::SeqCst) > 0 {
                self.kill_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(DriverError::connection("kill failed"));
            }
            self.kills.lock().push(cursor_id);
            Ok(())
        }
    }

    fn make_cursor(
        transport: Arc<ScriptedTransport>,
        initial: BatchResult,
        options: CursorOptions,
    ) -> (Cursor, Arc<CursorRegistry>) {
        let registry = Arc::new(CursorRegistry::new());
        let cursor = Cursor::new(
            transport,
            registry.clone(),
            ServerAddress::new("localhost", 5280),
            Namespace::new("app", "events"),
            initial,
            Some(Session::implicit()),
            options,
        );
        (cursor, registry)
    }

    fn docs(ids: &[i64]) -> Vec<Document> {
        ids.iter().map(|id| doc! { "_id" => *id }).collect()
    }

    #[tokio::test]
    async fn test_single_batch_iteration() {
        let transport = ScriptedTransport::new(vec![]);
        let initial = BatchResult::new(0, docs(&[1, 2, 3]));
        let (mut cursor, _) = make_cursor(transport.clone(), initial, CursorOptions::default());

        let collected = cursor.collect_remaining().await.unwrap();
        assert_eq!(collected.len(), 3);
        assert!(cursor.is_exhausted());
        // cursor_id 0이면 getMore 없음
        assert_eq!(transport.get_more_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_multi_batch_iteration() {
        let transport = ScriptedTransport::new(vec![
            Ok(BatchResult::new(7, docs(&[3, 4]))),
            Ok(BatchResult::new(0, docs(&[5]))),
        ]);
        let initial = BatchResult::new(7, docs(&[1, 2]));
        let (mut cursor, registry) =
            make_cursor(transport.clone(), initial, CursorOptions::default());
        assert!(registry.is_live(7));

        let collected = cursor.collect_remaining().await.unwrap();
        let ids: Vec<_> = collected
            .iter()
            .map(|d| d.get("_id").cloned().unwrap())
            .collect();
        assert_eq!(
            ids,
            vec![
                Value::from(1),
                Value::from(2),
                Value::from(3),
                Value::from(4),
                Value::from(5)
            ]
        );
        assert_eq!(transport.get_more_calls.load(Ordering::SeqCst), 2);
        assert!(cursor.is_exhausted());
        // 서버 측 종료 후 레지스트리에서 해제
        assert!(!registry.is_live(7));
        assert_eq!(registry.scheduled_count(), 0);
    }

    #[tokio::test]
    async fn test_limit_triggers_early_kill() {
        let transport = ScriptedTransport::new(vec![]);
        let initial = BatchResult::new(42, docs(&[1, 2, 3, 4, 5]));
        let options = CursorOptions::builder().limit(2).build();
        let (mut cursor, _) = make_cursor(transport.clone(), initial, options);

        let collected = cursor.collect_remaining().await.unwrap();
        assert_eq!(collected.len(), 2);

        // limit 소진: getMore 대신 kill
        assert_eq!(transport.get_more_calls.load(Ordering::SeqCst), 0);
        assert_eq!(transport.killed_ids(), vec![42]);
        assert!(cursor.is_closed());
    }

    #[tokio::test]
    async fn test_limit_kill_failure_surfaced_and_rescheduled() {
        let transport = ScriptedTransport::new(vec![]).failing_kills(2);
        let initial = BatchResult::new(42, docs(&[1, 2, 3]));
        let options = CursorOptions::builder().limit(2).build();
        let (mut cursor, registry) = make_cursor(transport.clone(), initial, options);

        // 조기 kill 실패는 삼켜지지 않고 호출자에게 전달됨
        let err = cursor.collect_remaining().await.unwrap_err();
        assert!(err.is_transient());
        assert!(cursor.is_closed());

        // 서버 측 커서는 리퍼가 정리하도록 예약됨
        assert_eq!(registry.scheduled_count(), 1);
        assert_eq!(registry.drain_scheduled()[0].cursor_id, 42);
    }

    #[tokio::test]
    async fn test_get_more_request_capped_at_remaining_budget() {
        let transport = ScriptedTransport::new(vec![Ok(BatchResult::new(0, docs(&[3, 4, 5])))]);
        let initial = BatchResult::new(6, docs(&[1, 2]));
        let options = CursorOptions::builder().limit(5).batch_size(10).build();
        let (mut cursor, _) = make_cursor(transport.clone(), initial, options);

        let collected = cursor.collect_remaining().await.unwrap();
        assert_eq!(collected.len(), 5);
        // 배치 크기가 10이라도 남은 예산 3만 요청
        assert_eq!(transport.requested_sizes(), vec![Some(3)]);

        // 배치 크기 없이 limit만 있어도 동일하게 제한
        let transport = ScriptedTransport::new(vec![Ok(BatchResult::new(0, docs(&[2])))]);
        let initial = BatchResult::new(6, docs(&[1]));
        let options = CursorOptions::builder().limit(2).build();
        let (mut cursor, _) = make_cursor(transport.clone(), initial, options);

        cursor.collect_remaining().await.unwrap();
        assert_eq!(transport.requested_sizes(), vec![Some(1)]);
    }

    #[tokio::test]
    async fn test_limit_never_exceeded_across_batches() {
        let transport = ScriptedTransport::new(vec![Ok(BatchResult::new(9, docs(&[3, 4, 5])))]);
        let initial = BatchResult::new(9, docs(&[1, 2]));
        let options = CursorOptions::builder().limit(3).build();
        let (mut cursor, _) = make_cursor(transport.clone(), initial, options);

        let collected = cursor.collect_remaining().await.unwrap();
        assert_eq!(collected.len(), 3);
        assert_eq!(transport.killed_ids(), vec![9]);
    }

    #[tokio::test]
    async fn test_get_more_never_retried() {
        let transport = ScriptedTransport::new(vec![Err(DriverError::connection("reset"))]);
        let initial = BatchResult::new(11, docs(&[1]));
        let (mut cursor, _) = make_cursor(transport.clone(), initial, CursorOptions::default());

        assert!(cursor.try_next().await.unwrap().is_some());
        let err = cursor.try_next().await.unwrap_err();
        assert!(err.is_transient());

        // 재시도 없이 한 번만 호출
        assert_eq!(transport.get_more_calls.load(Ordering::SeqCst), 1);
        // 실패 후에도 서버 커서는 정리됨
        assert_eq!(transport.killed_ids(), vec![11]);
        assert!(cursor.is_closed());
    }

    #[tokio::test]
    async fn test_fetch_error_not_masked_by_kill_failure() {
        let transport =
            ScriptedTransport::new(vec![Err(DriverError::fetch("server error"))]).failing_kills(2);
        let initial = BatchResult::new(12, docs(&[1]));
        let (mut cursor, _) = make_cursor(transport.clone(), initial, CursorOptions::default());

        assert!(cursor.try_next().await.unwrap().is_some());
        let err = cursor.try_next().await.unwrap_err();
        // kill 실패가 원래 fetch 오류를 가리지 않음
        assert!(matches!(err, DriverError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_kill_retried_once_on_transient_error() {
        let transport = ScriptedTransport::new(vec![]).failing_kills(1);
        let initial = BatchResult::new(13, docs(&[1]));
        let (mut cursor, _) = make_cursor(transport.clone(), initial, CursorOptions::default());

        cursor.close().await.unwrap();
        // 첫 시도 실패, 재시도 성공
        assert_eq!(transport.killed_ids(), vec![13]);
    }

    #[tokio::test]
    async fn test_resume_token_per_document() {
        let transport = ScriptedTransport::new(vec![]);
        let initial = BatchResult::new(0, docs(&[1, 2]));
        let options = CursorOptions::builder().track_resume_tokens(true).build();
        let (mut cursor, _) = make_cursor(transport, initial, options);

        cursor.try_next().await.unwrap();
        assert_eq!(cursor.resume_token().unwrap().value(), &Value::from(1));

        cursor.try_next().await.unwrap();
        assert_eq!(cursor.resume_token().unwrap().value(), &Value::from(2));
    }

    #[tokio::test]
    async fn test_boundary_token_wins_over_document_token() {
        let transport = ScriptedTransport::new(vec![]);
        let initial = BatchResult::new(0, docs(&[1, 2]))
            .with_post_batch_resume_token(ResumeToken::new(Value::from("boundary")));
        let options = CursorOptions::builder().track_resume_tokens(true).build();
        let (mut cursor, _) = make_cursor(transport, initial, options);

        cursor.try_next().await.unwrap();
        // 배치 도중에는 문서 토큰
        assert_eq!(cursor.resume_token().unwrap().value(), &Value::from(1));

        cursor.try_next().await.unwrap();
        // 배치 소진: 경계 토큰이 마지막 문서 토큰을 덮어씀
        assert_eq!(
            cursor.resume_token().unwrap().value(),
            &Value::from("boundary")
        );
    }

    #[tokio::test]
    async fn test_empty_batch_advances_boundary_token() {
        let transport = ScriptedTransport::new(vec![Ok(BatchResult::new(5, vec![])
            .with_post_batch_resume_token(ResumeToken::new(Value::from("progress"))))]);
        let initial = BatchResult::new(5, vec![]);
        let options = CursorOptions::builder().track_resume_tokens(true).build();
        let (mut cursor, _) = make_cursor(transport, initial, options);

        // 빈 배치지만 경계 토큰은 진행을 반영
        assert!(cursor.try_next().await.unwrap().is_none());
        assert!(!cursor.is_closed());
        assert_eq!(
            cursor.resume_token().unwrap().value(),
            &Value::from("progress")
        );
    }

    #[tokio::test]
    async fn test_missing_resume_token_is_fatal() {
        let transport = ScriptedTransport::new(vec![]);
        let initial = BatchResult::new(21, vec![doc! { "_id" => 1 }, doc! { "name" => "x" }]);
        let options = CursorOptions::builder().track_resume_tokens(true).build();
        let (mut cursor, registry) = make_cursor(transport.clone(), initial, options);

        assert!(cursor.try_next().await.unwrap().is_some());
        let err = cursor.try_next().await.unwrap_err();
        assert!(matches!(err, DriverError::MissingResumeToken));
        assert!(err.is_client_error());

        // 추가 fetch 없이 중단, 정리는 레지스트리에 위임
        assert_eq!(transport.get_more_calls.load(Ordering::SeqCst), 0);
        assert!(cursor.is_closed());
        assert_eq!(registry.scheduled_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_id_ignored_without_tracking() {
        let transport = ScriptedTransport::new(vec![]);
        let initial = BatchResult::new(0, vec![doc! { "name" => "x" }]);
        let (mut cursor, _) = make_cursor(transport, initial, CursorOptions::default());

        // 토큰 추적이 꺼져 있으면 _id 없는 문서도 정상
        assert!(cursor.try_next().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_drop_schedules_kill() {
        let transport = ScriptedTransport::new(vec![]);
        let initial = BatchResult::new(99, docs(&[1, 2, 3]));
        let session = Session::implicit();
        let registry = Arc::new(CursorRegistry::new());
        let cursor = Cursor::new(
            transport.clone(),
            registry.clone(),
            ServerAddress::new("localhost", 5280),
            Namespace::new("app", "events"),
            initial,
            Some(session.clone()),
            CursorOptions::default(),
        );

        drop(cursor);

        // Drop은 I/O 없이 kill을 예약만 한다
        assert!(transport.killed_ids().is_empty());
        assert_eq!(registry.scheduled_count(), 1);
        let scheduled = registry.drain_scheduled();
        assert_eq!(scheduled[0].cursor_id, 99);
        // 암시적 세션도 종료됨
        assert!(session.is_ended());
    }

    #[tokio::test]
    async fn test_drop_after_exhaustion_schedules_nothing() {
        let transport = ScriptedTransport::new(vec![]);
        let initial = BatchResult::new(0, docs(&[1]));
        let registry = Arc::new(CursorRegistry::new());
        let cursor = Cursor::new(
            transport,
            registry.clone(),
            ServerAddress::new("localhost", 5280),
            Namespace::new("app", "events"),
            initial,
            None,
            CursorOptions::default(),
        );

        drop(cursor);
        assert_eq!(registry.scheduled_count(), 0);
    }

    #[tokio::test]
    async fn test_implicit_session_ended_exactly_once() {
        let transport = ScriptedTransport::new(vec![Ok(BatchResult::new(0, vec![]))]);
        let initial = BatchResult::new(33, docs(&[1]));
        let session = Session::implicit();
        let registry = Arc::new(CursorRegistry::new());
        let mut cursor = Cursor::new(
            transport,
            registry,
            ServerAddress::new("localhost", 5280),
            Namespace::new("app", "events"),
            initial,
            Some(session.clone()),
            CursorOptions::default(),
        );

        cursor.collect_remaining().await.unwrap();
        assert!(session.is_ended());

        // close와 drop을 거쳐도 추가 종료 시도 없음 (end는 한 번만 true)
        cursor.close().await.unwrap();
        drop(cursor);
        assert!(session.is_ended());
    }

    #[tokio::test]
    async fn test_explicit_session_left_open() {
        let transport = ScriptedTransport::new(vec![]);
        let initial = BatchResult::new(0, docs(&[1]));
        let session = Session::explicit();
        let registry = Arc::new(CursorRegistry::new());
        let mut cursor = Cursor::new(
            transport,
            registry,
            ServerAddress::new("localhost", 5280),
            Namespace::new("app", "events"),
            initial,
            Some(session.clone()),
            CursorOptions::default(),
        );

        cursor.collect_remaining().await.unwrap();
        drop(cursor);
        // 명시적 세션은 호출자 소유
        assert!(!session.is_ended());
    }

    #[tokio::test]
    async fn test_effective_batch_size_falls_back_to_limit() {
        let transport = ScriptedTransport::new(vec![]);
        let initial = BatchResult::new(0, vec![]);
        let options = CursorOptions::builder().limit(50).build();
        let (cursor, _) = make_cursor(transport, initial, options);
        assert_eq!(cursor.effective_batch_size(), Some(50));

        let transport = ScriptedTransport::new(vec![]);
        let initial = BatchResult::new(0, vec![]);
        let options = CursorOptions::builder().limit(50).batch_size(10).build();
        let (cursor, _) = make_cursor(transport, initial, options);
        assert_eq!(cursor.effective_batch_size(), Some(10));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_locally() {
        let transport = ScriptedTransport::new(vec![]);
        let initial = BatchResult::new(77, docs(&[1]));
        let (mut cursor, registry) = make_cursor(transport.clone(), initial, CursorOptions::default());

        cursor.close().await.unwrap();
        cursor.close().await.unwrap();
        // kill은 한 번만
        assert_eq!(transport.killed_ids(), vec![77]);
        assert!(!registry.is_live(77));
    }

    #[tokio::test]
    async fn test_into_stream() {
        use tokio_stream::StreamExt;

        let transport = ScriptedTransport::new(vec![Ok(BatchResult::new(0, docs(&[3, 4])))]);
        let initial = BatchResult::new(8, docs(&[1, 2]));
        let (cursor, _) = make_cursor(transport, initial, CursorOptions::default());

        let collected: Vec<_> = cursor.into_stream().collect::<Vec<_>>().await;
        assert_eq!(collected.len(), 4);
        assert!(collected.iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn test_stream_surfaces_error_then_ends() {
        use tokio_stream::StreamExt;

        let transport = ScriptedTransport::new(vec![Err(DriverError::connection("reset"))]);
        let initial = BatchResult::new(8, docs(&[1]));
        let (cursor, _) = make_cursor(transport, initial, CursorOptions::default());

        let collected: Vec<_> = cursor.into_stream().collect::<Vec<_>>().await;
        assert_eq!(collected.len(), 2);
        assert!(collected[0].is_ok());
        assert!(collected[1].is_err());
    }
}
