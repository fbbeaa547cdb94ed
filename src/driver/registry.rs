//! Cursor Registry - 커서 레지스트리
//!
//! 클러스터 수준에서 살아 있는 커서 ID를 추적하고, 명시적으로 닫히지
//! 않은 커서를 대역외(killCursors)로 정리합니다.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::driver::ServerAddress;
use super::error::{DriverError, DriverResult};
use super::transport::{Namespace, QueryTransport};

/// 리퍼 기본 주기
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(1);

// ============================================================================
// ScheduledKill - 예약된 정리
// ============================================================================

/// 대역외 정리가 예약된 커서
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledKill {
    /// 커서 ID
    pub cursor_id: i64,
    /// 커서의 네임스페이스
    pub namespace: Namespace,
    /// 커서가 고정된 서버
    pub address: ServerAddress,
}

// ============================================================================
// CursorRegistry - 커서 레지스트리
// ============================================================================

/// 살아 있는 커서 레지스트리
///
/// 커서는 생성 시 자신을 등록하고, 서버가 커서를 닫거나 클라이언트가
/// 정리하면 등록을 해제합니다. 소진되기 전에 버려진 커서는 정리를
/// 예약해 두고, 리퍼가 best-effort로 killCursors를 보냅니다.
#[derive(Debug, Default)]
pub struct CursorRegistry {
    /// 살아 있는 커서 ID
    live: Mutex<HashSet<i64>>,
    /// 정리 대기 커서
    scheduled: Mutex<Vec<ScheduledKill>>,
}

impl CursorRegistry {
    /// 새 레지스트리 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 커서 등록
    ///
    /// ID 0은 이미 닫힌 커서이므로 추적하지 않습니다.
    pub fn register(&self, cursor_id: i64) {
        if cursor_id != 0 {
            self.live.lock().insert(cursor_id);
        }
    }

    /// 커서 등록 해제
    pub fn unregister(&self, cursor_id: i64) {
        if cursor_id != 0 {
            self.live.lock().remove(&cursor_id);
        }
    }

    /// 커서 정리 예약
    ///
    /// 소유 핸들이 사라진 커서를 대역외 정리 대상으로 등록합니다.
    /// ID 0은 서버가 이미 닫았으므로 아무 일도 하지 않습니다.
    pub fn schedule_kill(&self, cursor_id: i64, namespace: Namespace, address: ServerAddress) {
        if cursor_id == 0 {
            return;
        }
        self.unregister(cursor_id);
        let mut scheduled = self.scheduled.lock();
        if !scheduled.iter().any(|k| k.cursor_id == cursor_id) {
            scheduled.push(ScheduledKill {
                cursor_id,
                namespace,
                address,
            });
        }
    }

    /// 예약된 정리 목록 비우기
    pub fn drain_scheduled(&self) -> Vec<ScheduledKill> {
        std::mem::take(&mut *self.scheduled.lock())
    }

    /// 살아 있는 커서 수
    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }

    /// 커서가 살아 있는지 확인
    pub fn is_live(&self, cursor_id: i64) -> bool {
        self.live.lock().contains(&cursor_id)
    }

    /// 정리 대기 수
    pub fn scheduled_count(&self) -> usize {
        self.scheduled.lock().len()
    }

    /// 예약된 커서를 모두 정리
    ///
    /// killCursors 실패는 로그만 남기고 삼킵니다. 정리에 성공한
    /// 커서 수를 반환합니다.
    pub async fn reap(&self, transport: &dyn QueryTransport) -> usize {
        let scheduled = self.drain_scheduled();
        let mut reaped = 0;
        for kill in scheduled {
            match transport
                .kill_cursor(&kill.namespace, kill.cursor_id)
                .await
            {
                Ok(()) => reaped += 1,
                Err(e) => {
                    tracing::warn!(
                        cursor_id = kill.cursor_id,
                        server = %kill.address,
                        error = %e,
                        "failed to reap abandoned cursor"
                    );
                }
            }
        }
        reaped
    }
}

// ============================================================================
// CursorReaper - 커서 리퍼
// ============================================================================

/// 커서 리퍼
///
/// 레지스트리에 예약된 정리를 주기적으로 수행하는 백그라운드 태스크.
/// 중지 후에는 재시작할 수 없습니다.
pub struct CursorReaper {
    registry: Arc<CursorRegistry>,
    transport: Arc<dyn QueryTransport>,
    interval: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
    running: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
    stop_signal: Arc<Notify>,
    stopped: AtomicBool,
}

impl CursorReaper {
    /// 새 리퍼 생성
    pub fn new(registry: Arc<CursorRegistry>, transport: Arc<dyn QueryTransport>) -> Self {
        Self::with_interval(registry, transport, DEFAULT_REAP_INTERVAL)
    }

    /// 주기를 지정해 리퍼 생성
    pub fn with_interval(
        registry: Arc<CursorRegistry>,
        transport: Arc<dyn QueryTransport>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            transport,
            interval,
            handle: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            stop_signal: Arc::new(Notify::new()),
            stopped: AtomicBool::new(false),
        }
    }

    /// 리퍼 시작
    pub fn start(&self) -> DriverResult<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(DriverError::internal("Cursor reaper cannot be restarted"));
        }
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(DriverError::internal("Cursor reaper already started"));
        }

        let registry = self.registry.clone();
        let transport = self.transport.clone();
        let interval = self.interval;
        let running = self.running.clone();
        let stop_requested = self.stop_requested.clone();
        let stop_signal = self.stop_signal.clone();

        let handle = tokio::spawn(async move {
            while !stop_requested.load(Ordering::Acquire) {
                tokio::select! {
                    _ = stop_signal.notified() => break,
                    _ = tokio::time::sleep(interval) => {
                        registry.reap(transport.as_ref()).await;
                    }
                }
            }
            running.store(false, Ordering::Release);
        });

        *self.handle.lock() = Some(handle);
        Ok(())
    }

    /// 리퍼 중지 요청 (논블로킹, 즉시 깨움)
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.stop_requested.store(true, Ordering::Release);
        self.stop_signal.notify_one();
    }

    /// 리퍼 태스크 종료 대기
    pub async fn join(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// 실행 중 여부
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for CursorReaper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorReaper")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
