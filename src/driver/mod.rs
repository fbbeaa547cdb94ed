//! Driver Module
//!
//! 문서 데이터베이스 클라이언트 런타임
//!
//! # Subsystems
//!
//! - 커서: 재개 가능한 결과 반복과 서버 자원 정리 (Cursor, CursorRegistry, CursorReaper)
//! - 연결 풀: 서버당 풀과 백그라운드 최소치 복구 (ConnectionPool, PoolPopulator)
//! - 서버 선택: 읽기 선호와 레이턴시 윈도 기반 선택 (ReadPreference, ServerSelector)
//!
//! # Example
//!
//! ```ignore
//! use papyrus_driver::{AuthToken, Driver, DriverConfig, ReadPreference};
//!
//! // 클러스터 드라이버 (papyrus://)
//! let config = DriverConfig::builder(
//!     "papyrus://db1:5280,db2:5280",
//!     AuthToken::basic("app", "password"),
//! )?
//! .with_min_pool_size(2)
//! .with_read_preference(ReadPreference::nearest())
//! .build();
//! let driver = Driver::new(config, transport)?;
//!
//! // 읽기 선호에 따라 서버 선택
//! let server = driver.select_server().await?;
//!
//! // 초기 쿼리 결과로 커서 생성 후 순회
//! let mut cursor = driver.open_cursor(
//!     server.address,
//!     namespace,
//!     initial_batch,
//!     None,
//!     CursorOptions::default(),
//! )?;
//! while let Some(doc) = cursor.try_next().await? {
//!     println!("{:?}", doc);
//! }
//!
//! driver.close().await;
//! ```

pub mod topology;
mod cursor;
mod document;
mod driver;
mod error;
mod pool;
mod populator;
mod registry;
mod session;
mod transport;

// Re-exports
pub use cursor::{Cursor, CursorOptions, CursorOptionsBuilder};
pub use document::{document_id, Document, ResumeToken};
pub use driver::{
    AuthToken, Driver, DriverConfig, DriverConfigBuilder, DriverMetrics, ServerAddress,
    DEFAULT_PORT,
};
pub use error::{DriverError, DriverResult};
pub use pool::{
    BasicConnectionFactory, Connection, ConnectionFactory, ConnectionPool, PoolConfig,
    PoolConfigBuilder, PoolMetrics,
};
pub use populator::{PoolPopulator, ERROR_BACKOFF, POPULATE_WAIT};
pub use registry::{CursorReaper, CursorRegistry, ScheduledKill, DEFAULT_REAP_INTERVAL};
pub use session::Session;
pub use topology::{
    ReadMode, ReadPreference, ReadPreferenceBuilder, Server, ServerRole, ServerSelector,
    ServerSet, DEFAULT_LOCAL_THRESHOLD, DEFAULT_SERVER_SELECTION_TIMEOUT,
};
pub use transport::{BatchResult, Namespace, QueryTransport};

/// 문서 생성 매크로
#[macro_export]
macro_rules! doc {
    () => {
        $crate::driver::Document::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut doc = $crate::driver::Document::new();
        $(
            doc.insert($key.into(), ::serde_json::json!($value));
        )+
        doc
    }};
}
