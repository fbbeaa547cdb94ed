//! Connection Pool - 연결 풀
//!
//! 서버당 연결 풀. 체크아웃/체크인 경로와 별개로, 백그라운드
//! 파퓰레이터가 `populate`를 호출해 풀 크기를 최소치 이상으로
//! 유지합니다.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};

use super::driver::ServerAddress;
use super::error::{DriverError, DriverResult};

// ============================================================================
// PoolConfig - 풀 설정
// ============================================================================

/// 연결 풀 설정
///
/// | 필드 | 기본값 | 설명 |
/// |------|--------|------|
/// | `min_size` | 0 | 최소 연결 수 (0이면 파퓰레이터 비활성) |
/// | `max_size` | 100 | 최대 연결 수 |
/// | `checkout_timeout` | 10초 | 체크아웃 대기 타임아웃 |
/// | `max_idle_time` | 없음 | 유휴 연결 만료 시간 |
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// 최소 연결 수
    pub min_size: usize,
    /// 최대 연결 수
    pub max_size: usize,
    /// 체크아웃 대기 타임아웃
    pub checkout_timeout: Duration,
    /// 유휴 연결 만료 시간
    pub max_idle_time: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 0,
            max_size: 100,
            checkout_timeout: Duration::from_secs(10),
            max_idle_time: None,
        }
    }
}

impl PoolConfig {
    /// 빌더 패턴으로 풀 설정 생성
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }

    /// 유효 최소 크기 (max_size로 제한)
    pub fn effective_min_size(&self) -> usize {
        self.min_size.min(self.max_size)
    }
}

/// 풀 설정 빌더
#[derive(Debug, Clone, Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// 최소 연결 수 설정
    pub fn min_size(mut self, size: usize) -> Self {
        self.config.min_size = size;
        self
    }

    /// 최대 연결 수 설정
    pub fn max_size(mut self, size: usize) -> Self {
        self.config.max_size = size;
        self
    }

    /// 체크아웃 타임아웃 설정
    pub fn checkout_timeout(mut self, timeout: Duration) -> Self {
        self.config.checkout_timeout = timeout;
        self
    }

    /// 유휴 만료 시간 설정
    pub fn max_idle_time(mut self, idle: Duration) -> Self {
        self.config.max_idle_time = Some(idle);
        self
    }

    /// 설정 빌드
    pub fn build(self) -> PoolConfig {
        self.config
    }
}

// ============================================================================
// Connection - 연결
// ============================================================================

/// 풀이 관리하는 연결
///
/// 소켓/핸드셰이크는 [`ConnectionFactory`] 구현체의 책임이며,
/// 풀은 수명 관리만 담당합니다.
#[derive(Debug)]
pub struct Connection {
    /// 연결 ID
    id: u64,
    /// 서버 주소
    address: ServerAddress,
    /// 생성 시간
    created_at: Instant,
    /// 마지막 체크인 시간
    last_checked_in: Instant,
}

impl Connection {
    /// 새 연결 생성
    pub fn new(id: u64, address: ServerAddress) -> Self {
        let now = Instant::now();
        Self {
            id,
            address,
            created_at: now,
            last_checked_in: now,
        }
    }

    /// 연결 ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 서버 주소
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// 연결 나이
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// 마지막 체크인 이후 경과 시간
    pub fn idle_time(&self) -> Duration {
        self.last_checked_in.elapsed()
    }

    /// 유휴 만료 여부
    pub fn is_stale(&self, config: &PoolConfig) -> bool {
        match config.max_idle_time {
            Some(max_idle) => self.idle_time() > max_idle,
            None => false,
        }
    }

    fn mark_checked_in(&mut self) {
        self.last_checked_in = Instant::now();
    }
}

// ============================================================================
// ConnectionFactory - 연결 팩토리
// ============================================================================

/// 연결 생성 계약
///
/// TLS, 핸드셰이크, 인증은 이 경계 뒤에서 일어납니다.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// 서버에 새 연결 수립
    async fn establish(&self, id: u64, address: &ServerAddress) -> DriverResult<Connection>;
}

/// 기본 연결 팩토리
///
/// 네트워크 수립 없이 연결 핸들만 만듭니다. 실제 전송 계층은
/// 자체 팩토리를 꽂습니다.
#[derive(Debug, Default)]
pub struct BasicConnectionFactory;

#[async_trait]
impl ConnectionFactory for BasicConnectionFactory {
    async fn establish(&self, id: u64, address: &ServerAddress) -> DriverResult<Connection> {
        Ok(Connection::new(id, address.clone()))
    }
}

// ============================================================================
// PoolMetrics - 풀 메트릭
// ============================================================================

/// 풀 메트릭
#[derive(Debug, Clone, Default)]
pub struct PoolMetrics {
    /// 현재 전체 크기 (available + checked_out + 생성 중)
    pub size: usize,
    /// 체크아웃 가능한 연결 수
    pub available: usize,
    /// 체크아웃된 연결 수
    pub checked_out: usize,
    /// 총 체크아웃 횟수
    pub total_checkouts: u64,
    /// 총 생성된 연결 수
    pub total_created: u64,
    /// 총 닫힌 연결 수
    pub total_closed: u64,
}

// ============================================================================
// ConnectionPool - 연결 풀
// ============================================================================

/// 연결 풀
///
/// 내부 집합의 변경은 모두 풀 자체 락 아래에서 일어나며,
/// 어떤 락도 `.await`를 넘어 유지되지 않습니다.
pub struct ConnectionPool {
    /// 서버 주소
    address: ServerAddress,
    /// 풀 설정
    config: PoolConfig,
    /// 연결 팩토리
    factory: Arc<dyn ConnectionFactory>,
    /// 체크아웃 가능한 연결 (최근 체크인이 앞)
    available: Mutex<VecDeque<Connection>>,
    /// 체크아웃된 연결 ID
    checked_out: Mutex<HashSet<u64>>,
    /// 수립 진행 중인 연결 수
    pending: AtomicUsize,
    /// 남은 생성 용량 (max_size 허가, 수립 전에 예약)
    capacity: Semaphore,
    /// 다음 연결 ID
    next_id: AtomicU64,
    /// 닫힘 상태
    closed: AtomicBool,
    /// 파퓰레이터 깨우기 신호
    populate_signal: Notify,
    /// 체크아웃 대기자 깨우기 신호
    checkin_signal: Notify,
    /// 총 체크아웃 횟수
    total_checkouts: AtomicU64,
    /// 총 생성 횟수
    total_created: AtomicU64,
    /// 총 닫힌 횟수
    total_closed: AtomicU64,
}

impl ConnectionPool {
    /// 새 연결 풀 생성
    pub fn new(address: ServerAddress, config: PoolConfig) -> Self {
        Self::with_factory(address, config, Arc::new(BasicConnectionFactory))
    }

    /// 팩토리를 지정해 연결 풀 생성
    pub fn with_factory(
        address: ServerAddress,
        config: PoolConfig,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Self {
        let capacity = Semaphore::new(config.max_size);
        Self {
            address,
            config,
            factory,
            available: Mutex::new(VecDeque::new()),
            checked_out: Mutex::new(HashSet::new()),
            pending: AtomicUsize::new(0),
            capacity,
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            populate_signal: Notify::new(),
            checkin_signal: Notify::new(),
            total_checkouts: AtomicU64::new(0),
            total_created: AtomicU64::new(0),
            total_closed: AtomicU64::new(0),
        }
    }

    /// 서버 주소
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// 풀 설정
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// 닫힘 여부
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// 연결 체크아웃
    ///
    /// 유휴 연결 재사용(LIFO) → 여유가 있으면 새로 수립 → 둘 다
    /// 불가하면 체크인을 타임아웃까지 기다립니다.
    pub async fn checkout(&self) -> DriverResult<Connection> {
        let deadline = Instant::now() + self.config.checkout_timeout;

        loop {
            if self.is_closed() {
                return Err(DriverError::pool("Pool is closed"));
            }

            if let Some(conn) = self.take_available() {
                return Ok(self.finish_checkout(conn));
            }

            // 용량 예약과 수립은 한 단계: 허가를 먼저 집어 초과 생성을 막음
            if let Ok(permit) = self.capacity.try_acquire() {
                permit.forget();
                match self.establish_connection().await {
                    Ok(conn) => return Ok(self.finish_checkout(conn)),
                    Err(err) => {
                        self.capacity.add_permits(1);
                        return Err(err);
                    }
                }
            }

            // 풀 가득 참: 체크인 대기
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(DriverError::timeout("Connection checkout timed out"));
            }
            let _ = tokio::time::timeout(remaining, self.checkin_signal.notified()).await;
        }
    }

    /// 연결 체크인
    pub fn checkin(&self, mut conn: Connection) {
        {
            let mut checked_out = self.checked_out.lock();
            checked_out.remove(&conn.id());
        }

        if self.is_closed() || conn.is_stale(&self.config) {
            self.discard(conn);
            return;
        }

        conn.mark_checked_in();
        self.available.lock().push_front(conn);
        self.checkin_signal.notify_one();
        // 체크인은 파퓰레이터가 볼 상태 변화
        self.populate_signal.notify_one();
    }

    /// 깨진 연결 폐기
    ///
    /// 오류가 난 연결은 체크인 대신 이 경로로 돌려줍니다.
    /// 폐기로 최소치 아래로 내려가면 파퓰레이터를 깨웁니다.
    pub fn checkin_failed(&self, conn: Connection) {
        {
            let mut checked_out = self.checked_out.lock();
            checked_out.remove(&conn.id());
        }
        self.discard(conn);
        self.checkin_signal.notify_one();
        self.populate_signal.notify_one();
    }

    /// 풀 크기를 최소치 방향으로 한 단계 복구
    ///
    /// 최소치에 못 미치면 연결 하나를 수립해 유휴 목록에 넣고
    /// `true`를 반환합니다. 이미 충분하거나 풀이 닫혔으면 `false`.
    /// 구조 변경은 락 아래에서, 연결 수립은 락 밖에서 일어나므로
    /// 체크아웃/체크인과 동시에 호출해도 안전합니다.
    pub async fn populate(&self) -> DriverResult<bool> {
        if self.is_closed() {
            return Ok(false);
        }

        self.prune_idle();

        if self.total_size() >= self.config.effective_min_size() {
            return Ok(false);
        }

        let permit = match self.capacity.try_acquire() {
            Ok(permit) => permit,
            // 체크아웃이 용량을 전부 예약함: 진행 없음
            Err(_) => return Ok(false),
        };
        permit.forget();
        let conn = match self.establish_connection().await {
            Ok(conn) => conn,
            Err(err) => {
                self.capacity.add_permits(1);
                return Err(err);
            }
        };

        if self.is_closed() {
            self.discard(conn);
            return Ok(false);
        }

        self.available.lock().push_back(conn);
        self.checkin_signal.notify_one();
        Ok(true)
    }

    /// 파퓰레이터 신호 대기 (타임아웃은 신호 유실 대비 안전망)
    pub async fn wait_for_populate_signal(&self, timeout: Duration) {
        if self.is_closed() {
            return;
        }
        let _ = tokio::time::timeout(timeout, self.populate_signal.notified()).await;
    }

    /// 파퓰레이터 깨우기
    pub fn signal_populate(&self) {
        self.populate_signal.notify_one();
    }

    /// 풀 닫기
    ///
    /// 유휴 연결을 모두 폐기하고 파퓰레이터와 체크아웃 대기자를
    /// 즉시 깨웁니다. 이미 체크아웃된 연결은 체크인 시 폐기됩니다.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let drained: Vec<Connection> = self.available.lock().drain(..).collect();
        for conn in drained {
            self.discard(conn);
        }

        // notify_one은 대기자가 없어도 허가를 저장하므로,
        // 닫힘 직후 대기에 들어가는 파퓰레이터도 즉시 깨어난다
        self.populate_signal.notify_one();
        self.populate_signal.notify_waiters();
        self.checkin_signal.notify_waiters();
    }

    /// 전체 크기 (available + checked_out + 생성 중)
    pub fn total_size(&self) -> usize {
        self.available.lock().len()
            + self.checked_out.lock().len()
            + self.pending.load(Ordering::Acquire)
    }

    /// 체크아웃 가능한 연결 수
    pub fn available_count(&self) -> usize {
        self.available.lock().len()
    }

    /// 체크아웃된 연결 수
    pub fn checked_out_count(&self) -> usize {
        self.checked_out.lock().len()
    }

    /// 메트릭 조회
    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            size: self.total_size(),
            available: self.available_count(),
            checked_out: self.checked_out_count(),
            total_checkouts: self.total_checkouts.load(Ordering::Relaxed),
            total_created: self.total_created.load(Ordering::Relaxed),
            total_closed: self.total_closed.load(Ordering::Relaxed),
        }
    }

    /// 유휴 연결 가져오기 (만료된 연결은 폐기)
    fn take_available(&self) -> Option<Connection> {
        let mut stale = Vec::new();
        let conn = {
            let mut available = self.available.lock();
            loop {
                match available.pop_front() {
                    Some(conn) if conn.is_stale(&self.config) => stale.push(conn),
                    other => break other,
                }
            }
        };
        if !stale.is_empty() {
            for conn in stale {
                self.discard(conn);
            }
            // 만료 폐기로 최소치 아래로 내려갔을 수 있음
            self.populate_signal.notify_one();
        }
        conn
    }

    /// 만료된 유휴 연결 정리
    fn prune_idle(&self) {
        if self.config.max_idle_time.is_none() {
            return;
        }
        let stale: Vec<Connection> = {
            let mut available = self.available.lock();
            let mut kept = VecDeque::with_capacity(available.len());
            let mut stale = Vec::new();
            for conn in available.drain(..) {
                if conn.is_stale(&self.config) {
                    stale.push(conn);
                } else {
                    kept.push_back(conn);
                }
            }
            *available = kept;
            stale
        };
        if !stale.is_empty() {
            for conn in stale {
                self.discard(conn);
            }
            self.populate_signal.notify_one();
        }
    }

    /// 새 연결 수립 (락 밖에서 await)
    async fn establish_connection(&self) -> DriverResult<Connection> {
        self.pending.fetch_add(1, Ordering::AcqRel);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let result = self.factory.establish(id, &self.address).await;
        self.pending.fetch_sub(1, Ordering::AcqRel);

        let conn = result?;
        self.total_created.fetch_add(1, Ordering::Relaxed);
        Ok(conn)
    }

    fn finish_checkout(&self, conn: Connection) -> Connection {
        self.checked_out.lock().insert(conn.id());
        self.total_checkouts.fetch_add(1, Ordering::Relaxed);
        // 체크아웃으로 최소치 아래로 내려가면 파퓰레이터를 깨움
        if self.total_size() < self.config.effective_min_size() {
            self.populate_signal.notify_one();
        }
        conn
    }

    fn discard(&self, conn: Connection) {
        drop(conn);
        self.total_closed.fetch_add(1, Ordering::Relaxed);
        // 폐기된 연결의 용량 허가 반환
        self.capacity.add_permits(1);
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("address", &self.address)
            .field("size", &self.total_size())
            .field("available", &self.available_count())
            .field("checked_out", &self.checked_out_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
