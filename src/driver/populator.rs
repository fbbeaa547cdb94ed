//! Pool Populator - 풀 파퓰레이터
//!
//! 풀 크기를 최소치 이상으로 유지하는 백그라운드 태스크.
//! 체크아웃 경로를 막지 않고 부족분을 비동기로 복구합니다.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::error::{DriverError, DriverResult};
use super::pool::ConnectionPool;

/// 진행 없음 상태에서 신호를 기다리는 최대 시간 (신호 유실 안전망)
pub const POPULATE_WAIT: Duration = Duration::from_secs(3);

/// 연결 수립 실패 후 재시도 전 대기 시간
pub const ERROR_BACKOFF: Duration = Duration::from_secs(5);

// ============================================================================
// PoolPopulator - 풀 파퓰레이터
// ============================================================================

/// 풀 파퓰레이터
///
/// 풀당 하나씩 떠서 `populate`를 반복 호출합니다. 진행이 있으면
/// 즉시 다음 반복으로, 없으면 풀 상태 변화 신호를 기다립니다.
/// 수립 실패는 풀을 죽이지 않고 백오프 후 재시도합니다.
pub struct PoolPopulator {
    pool: Arc<ConnectionPool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    running: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
    stopped: AtomicBool,
}

impl PoolPopulator {
    /// 새 파퓰레이터 생성 (아직 시작 안 됨)
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self {
            pool,
            handle: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            stopped: AtomicBool::new(false),
        }
    }

    /// 파퓰레이터 시작
    ///
    /// 한 번 중지된 파퓰레이터는 다시 시작할 수 없습니다.
    pub fn start(&self) -> DriverResult<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(DriverError::pool("Populator has been stopped"));
        }
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(DriverError::pool("Populator is already running"));
        }

        let pool = self.pool.clone();
        let running = self.running.clone();
        let stop_requested = self.stop_requested.clone();

        let handle = tokio::spawn(async move {
            tracing::debug!(address = %pool.address(), "Pool populator started");

            while !stop_requested.load(Ordering::Acquire) && !pool.is_closed() {
                match pool.populate().await {
                    Ok(true) => {
                        // 진행 있음: 즉시 다음 반복
                    }
                    Ok(false) => {
                        pool.wait_for_populate_signal(POPULATE_WAIT).await;
                    }
                    Err(error) => {
                        tracing::warn!(
                            address = %pool.address(),
                            %error,
                            "Pool populate failed, backing off"
                        );
                        pool.wait_for_populate_signal(ERROR_BACKOFF).await;
                    }
                }
            }

            running.store(false, Ordering::Release);
            tracing::debug!(address = %pool.address(), "Pool populator stopped");
        });

        *self.handle.lock() = Some(handle);
        Ok(())
    }

    /// 파퓰레이터 중지 요청 (논블로킹)
    ///
    /// 태스크를 즉시 깨워 종료를 유도하고, 완료를 기다리지 않습니다.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.stop_requested.store(true, Ordering::Release);
        self.pool.signal_populate();
    }

    /// 백그라운드 태스크 종료 대기
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

impl std::fmt::Debug for PoolPopulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolPopulator")
            .field("address", self.pool.address())
            .field("running", &self.is_running())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
