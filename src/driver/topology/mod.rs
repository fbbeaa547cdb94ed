//! Topology - 토폴로지
//!
//! 클러스터 서버 뷰와 읽기 선호 기반 서버 선택

pub mod preference;
pub mod selector;
pub mod server;

pub use preference::{ReadMode, ReadPreference, ReadPreferenceBuilder, DEFAULT_LOCAL_THRESHOLD};
pub use selector::{ServerSelector, DEFAULT_SERVER_SELECTION_TIMEOUT, SELECTION_RETRY_INTERVAL};
pub use server::{Server, ServerRole, ServerSet};
