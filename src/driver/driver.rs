//! Driver - 드라이버
//!
//! 드라이버 인스턴스 및 설정. 토폴로지, 서버당 연결 풀과
//! 파퓰레이터, 커서 레지스트리와 리퍼의 수명을 한데 묶습니다.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use super::cursor::{Cursor, CursorOptions};
use super::error::{DriverError, DriverResult};
use super::pool::{BasicConnectionFactory, Connection, ConnectionFactory, ConnectionPool, PoolConfig};
use super::populator::PoolPopulator;
use super::registry::{CursorRegistry, CursorReaper};
use super::session::Session;
use super::topology::{
    ReadPreference, Server, ServerRole, ServerSelector, ServerSet,
    DEFAULT_SERVER_SELECTION_TIMEOUT,
};
use super::transport::{BatchResult, Namespace, QueryTransport};

/// 기본 포트
pub const DEFAULT_PORT: u16 = 5280;

// ============================================================================
// AuthToken - 인증 토큰
// ============================================================================

/// 인증 토큰
#[derive(Debug, Clone, Default)]
pub enum AuthToken {
    /// 인증 없음
    #[default]
    None,
    /// Basic 인증 (사용자명/비밀번호)
    Basic {
        /// 사용자명
        username: String,
        /// 비밀번호
        password: String,
    },
    /// Bearer 토큰
    Bearer {
        /// 토큰 값
        token: String,
    },
}

impl AuthToken {
    /// Basic 인증 토큰 생성
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Bearer 토큰 생성
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: token.into(),
        }
    }

    /// 인증 없음
    pub fn none() -> Self {
        Self::None
    }

    /// 인증 스킴
    pub fn scheme(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Basic { .. } => "basic",
            Self::Bearer { .. } => "bearer",
        }
    }
}

// ============================================================================
// ServerAddress - 서버 주소
// ============================================================================

/// 서버 주소
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    /// 호스트
    pub host: String,
    /// 포트
    pub port: u16,
}

impl ServerAddress {
    /// 새 서버 주소 생성
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// URI에서 파싱
    pub fn from_uri(uri: &str) -> DriverResult<Self> {
        // papyrus://host:port 형식 파싱
        let uri = uri
            .trim_start_matches("papyrus://")
            .trim_start_matches("papyrus+s://")
            .trim_start_matches("papyrus+ssc://");

        let parts: Vec<&str> = uri.split(':').collect();
        match parts.len() {
            1 if !parts[0].is_empty() => Ok(Self::new(parts[0], DEFAULT_PORT)),
            2 => {
                let port = parts[1]
                    .parse()
                    .map_err(|_| DriverError::configuration("Invalid port"))?;
                Ok(Self::new(parts[0], port))
            }
            _ => Err(DriverError::configuration("Invalid server address")),
        }
    }

    /// 소켓 주소로 변환
    pub fn to_socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::new("localhost", DEFAULT_PORT)
    }
}

// ============================================================================
// DriverConfig - 드라이버 설정
// ============================================================================

/// 드라이버 설정
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// 시드 서버 주소 목록
    pub seeds: Vec<ServerAddress>,
    /// 인증 토큰
    pub auth: AuthToken,
    /// TLS 암호화
    pub encrypted: bool,
    /// 기본 읽기 선호
    pub read_preference: ReadPreference,
    /// 연결 풀 최소 크기
    pub min_pool_size: usize,
    /// 연결 풀 최대 크기
    pub max_pool_size: usize,
    /// 연결 체크아웃 타임아웃
    pub checkout_timeout: Duration,
    /// 유휴 연결 만료 시간
    pub max_idle_time: Option<Duration>,
    /// 서버 선택 제한 시간
    pub server_selection_timeout: Duration,
    /// User Agent
    pub user_agent: String,
    /// 기본 배치 크기
    pub default_batch_size: u32,
}

impl DriverConfig {
    /// URI에서 설정 생성
    ///
    /// `papyrus://host1:5280,host2:5280` 형식으로 시드 여러 개를
    /// 콤마로 나열할 수 있습니다.
    pub fn new(uri: &str, auth: AuthToken) -> DriverResult<Self> {
        let encrypted = uri.contains("+s://") || uri.contains("+ssc://");
        let hosts = uri
            .trim_start_matches("papyrus://")
            .trim_start_matches("papyrus+s://")
            .trim_start_matches("papyrus+ssc://");

        let mut seeds = Vec::new();
        for host in hosts.split(',') {
            seeds.push(ServerAddress::from_uri(host)?);
        }
        if seeds.is_empty() {
            return Err(DriverError::configuration("URI contains no seed address"));
        }

        Ok(Self {
            seeds,
            auth,
            encrypted,
            ..Default::default()
        })
    }

    /// 빌더 시작
    pub fn builder(uri: &str, auth: AuthToken) -> DriverResult<DriverConfigBuilder> {
        let config = Self::new(uri, auth)?;
        Ok(DriverConfigBuilder { config })
    }

    /// 풀 설정으로 변환
    pub fn pool_config(&self) -> PoolConfig {
        let mut builder = PoolConfig::builder()
            .min_size(self.min_pool_size)
            .max_size(self.max_pool_size)
            .checkout_timeout(self.checkout_timeout);
        if let Some(idle) = self.max_idle_time {
            builder = builder.max_idle_time(idle);
        }
        builder.build()
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            seeds: vec![ServerAddress::default()],
            auth: AuthToken::default(),
            encrypted: false,
            read_preference: ReadPreference::default(),
            min_pool_size: 0,
            max_pool_size: 100,
            checkout_timeout: Duration::from_secs(10),
            max_idle_time: None,
            server_selection_timeout: DEFAULT_SERVER_SELECTION_TIMEOUT,
            user_agent: format!("Papyrus/{}", env!("CARGO_PKG_VERSION")),
            default_batch_size: 1000,
        }
    }
}

// ============================================================================
// DriverConfigBuilder - 설정 빌더
// ============================================================================

/// 드라이버 설정 빌더
pub struct DriverConfigBuilder {
    config: DriverConfig,
}

impl DriverConfigBuilder {
    /// 기본 읽기 선호 설정
    pub fn with_read_preference(mut self, preference: ReadPreference) -> Self {
        self.config.read_preference = preference;
        self
    }

    /// 풀 최소 크기 설정
    pub fn with_min_pool_size(mut self, size: usize) -> Self {
        self.config.min_pool_size = size;
        self
    }

    /// 풀 최대 크기 설정
    pub fn with_max_pool_size(mut self, size: usize) -> Self {
        self.config.max_pool_size = size;
        self
    }

    /// 체크아웃 타임아웃 설정
    pub fn with_checkout_timeout(mut self, timeout: Duration) -> Self {
        self.config.checkout_timeout = timeout;
        self
    }

    /// 유휴 만료 시간 설정
    pub fn with_max_idle_time(mut self, idle: Duration) -> Self {
        self.config.max_idle_time = Some(idle);
        self
    }

    /// 서버 선택 제한 시간 설정
    pub fn with_server_selection_timeout(mut self, timeout: Duration) -> Self {
        self.config.server_selection_timeout = timeout;
        self
    }

    /// User Agent 설정
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// 기본 배치 크기 설정
    pub fn with_default_batch_size(mut self, size: u32) -> Self {
        self.config.default_batch_size = size;
        self
    }

    /// 빌드
    pub fn build(self) -> DriverConfig {
        self.config
    }
}

// ============================================================================
// Driver - 드라이버
// ============================================================================

/// 서버당 풀과 그 파퓰레이터
struct PoolEntry {
    pool: Arc<ConnectionPool>,
    populator: Option<Arc<PoolPopulator>>,
}

/// 문서 데이터베이스 드라이버
///
/// 토폴로지 뷰, 서버당 연결 풀(+파퓰레이터), 커서 레지스트리와
/// 리퍼를 소유합니다. `close`가 전체를 내립니다.
pub struct Driver {
    config: DriverConfig,
    transport: Arc<dyn QueryTransport>,
    factory: Arc<dyn ConnectionFactory>,
    topology: Arc<ServerSet>,
    pools: Mutex<HashMap<ServerAddress, PoolEntry>>,
    registry: Arc<CursorRegistry>,
    reaper: CursorReaper,
    open: RwLock<bool>,
}

impl Driver {
    /// 새 드라이버 생성
    ///
    /// 시드 주소는 역할 미상의 연결 가능 서버로 토폴로지에
    /// 올라가고, 이후 모니터링이 역할과 왕복 시간을 채웁니다.
    pub fn new(config: DriverConfig, transport: Arc<dyn QueryTransport>) -> DriverResult<Self> {
        Self::with_factory(config, transport, Arc::new(BasicConnectionFactory))
    }

    /// 연결 팩토리를 지정해 드라이버 생성
    pub fn with_factory(
        config: DriverConfig,
        transport: Arc<dyn QueryTransport>,
        factory: Arc<dyn ConnectionFactory>,
    ) -> DriverResult<Self> {
        if config.seeds.is_empty() {
            return Err(DriverError::configuration("No seed address configured"));
        }

        let seeds: Vec<Server> = config
            .seeds
            .iter()
            .map(|address| Server::new(address.clone(), ServerRole::Unknown))
            .collect();

        let registry = Arc::new(CursorRegistry::new());
        let reaper = CursorReaper::new(registry.clone(), transport.clone());
        reaper.start()?;

        Ok(Self {
            config,
            transport,
            factory,
            topology: Arc::new(ServerSet::from_servers(seeds)),
            pools: Mutex::new(HashMap::new()),
            registry,
            reaper,
            open: RwLock::new(true),
        })
    }

    /// 드라이버 설정
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// 토폴로지 뷰 (모니터가 갱신)
    pub fn topology(&self) -> &Arc<ServerSet> {
        &self.topology
    }

    /// 커서 레지스트리
    pub fn registry(&self) -> &Arc<CursorRegistry> {
        &self.registry
    }

    /// 기본 읽기 선호로 서버 선택
    pub async fn select_server(&self) -> DriverResult<Server> {
        self.select_server_with(&self.config.read_preference).await
    }

    /// 읽기 선호를 지정해 서버 선택
    pub async fn select_server_with(&self, preference: &ReadPreference) -> DriverResult<Server> {
        self.ensure_open()?;
        ServerSelector::new(preference.clone())
            .select(&self.topology, self.config.server_selection_timeout)
            .await
    }

    /// 서버 주소의 연결 풀 (없으면 생성하고 파퓰레이터 기동)
    pub fn pool_for(&self, address: &ServerAddress) -> DriverResult<Arc<ConnectionPool>> {
        self.ensure_open()?;

        let mut pools = self.pools.lock();
        if let Some(entry) = pools.get(address) {
            return Ok(entry.pool.clone());
        }

        let pool = Arc::new(ConnectionPool::with_factory(
            address.clone(),
            self.config.pool_config(),
            self.factory.clone(),
        ));

        let populator = if self.config.min_pool_size > 0 {
            let populator = Arc::new(PoolPopulator::new(pool.clone()));
            populator.start()?;
            Some(populator)
        } else {
            None
        };

        pools.insert(
            address.clone(),
            PoolEntry {
                pool: pool.clone(),
                populator,
            },
        );
        Ok(pool)
    }

    /// 선택된 서버에서 연결 체크아웃
    pub async fn checkout(&self, address: &ServerAddress) -> DriverResult<Connection> {
        let pool = self.pool_for(address)?;
        pool.checkout().await
    }

    /// 명시적 세션 시작 (호출자 소유)
    pub fn start_session(&self) -> DriverResult<Session> {
        self.ensure_open()?;
        Ok(Session::explicit())
    }

    /// 초기 쿼리 결과로 커서 생성
    ///
    /// 세션을 넘기지 않으면 드라이버가 암시적 세션을 만들고,
    /// 그 세션은 커서가 닫힐 때 자동으로 종료됩니다.
    pub fn open_cursor(
        &self,
        address: ServerAddress,
        namespace: Namespace,
        initial: BatchResult,
        session: Option<Session>,
        options: CursorOptions,
    ) -> DriverResult<Cursor> {
        self.ensure_open()?;
        let session = session.unwrap_or_else(Session::implicit);
        Ok(Cursor::new(
            self.transport.clone(),
            self.registry.clone(),
            address,
            namespace,
            initial,
            Some(session),
            options,
        ))
    }

    /// 드라이버 종료
    ///
    /// 파퓰레이터 중지 → 풀 닫기 → 리퍼 중지 후, 남아 있는 kill
    /// 예약을 마지막으로 한 번 처리합니다.
    pub async fn close(&self) {
        {
            let mut open = self.open.write();
            if !*open {
                return;
            }
            *open = false;
        }

        let entries: Vec<PoolEntry> = {
            let mut pools = self.pools.lock();
            pools.drain().map(|(_, entry)| entry).collect()
        };
        for entry in &entries {
            if let Some(populator) = &entry.populator {
                populator.stop();
            }
            entry.pool.close();
        }
        for entry in &entries {
            if let Some(populator) = &entry.populator {
                populator.join().await;
            }
        }

        self.reaper.stop();
        self.reaper.join().await;
        let reaped = self.registry.reap(self.transport.as_ref()).await;
        if reaped > 0 {
            tracing::debug!(count = reaped, "Final cursor sweep on driver close");
        }
    }

    /// 열린 상태 여부
    pub fn is_open(&self) -> bool {
        *self.open.read()
    }

    /// 메트릭 조회
    pub fn metrics(&self) -> DriverMetrics {
        let pools = self.pools.lock();
        let mut metrics = DriverMetrics {
            pool_count: pools.len(),
            ..Default::default()
        };
        for entry in pools.values() {
            let pool = entry.pool.metrics();
            metrics.total_connections += pool.size;
            metrics.available_connections += pool.available;
            metrics.checked_out_connections += pool.checked_out;
        }
        metrics.live_cursors = self.registry.live_count();
        metrics
    }

    fn ensure_open(&self) -> DriverResult<()> {
        if *self.open.read() {
            Ok(())
        } else {
            Err(DriverError::Closed)
        }
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("seeds", &self.config.seeds)
            .field("open", &self.is_open())
            .finish()
    }
}

// ============================================================================
// DriverMetrics - 드라이버 메트릭
// ============================================================================

/// 드라이버 메트릭
#[derive(Debug, Clone, Default)]
pub struct DriverMetrics {
    /// 풀 수
    pub pool_count: usize,
    /// 전체 연결 수
    pub total_connections: usize,
    /// 체크아웃 가능한 연결 수
    pub available_connections: usize,
    /// 체크아웃된 연결 수
    pub checked_out_connections: usize,
    /// 살아 있는 커서 수
    pub live_cursors: usize,
}

// ============================================================================
// Tests
// ============================================================================
