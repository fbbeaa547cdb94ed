//! Server Description - 서버 기술자
//!
//! 선택 로직이 읽는 서버 스냅샷. 실제 서버 상태는 토폴로지
//! 모니터가 소유하며, 여기서는 불변 복사본만 다룹니다.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;

use super::super::driver::ServerAddress;

// ============================================================================
// ServerRole - 서버 역할
// ============================================================================

/// 클러스터 내 서버 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerRole {
    /// 쓰기를 받는 프라이머리
    Primary,
    /// 복제본 세컨더리
    Secondary,
    /// 투표만 하는 아비터 (읽기 불가)
    Arbiter,
    /// 쿼리 라우터
    Router,
    /// 아직 파악되지 않음
    Unknown,
}

impl ServerRole {
    /// 문자열 표기에서 파싱 (모니터 응답용)
    pub fn parse(s: &str) -> Self {
        match s {
            "primary" => Self::Primary,
            "secondary" => Self::Secondary,
            "arbiter" => Self::Arbiter,
            "router" => Self::Router,
            _ => Self::Unknown,
        }
    }

    /// 문자열 표기
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Arbiter => "arbiter",
            Self::Router => "router",
            Self::Unknown => "unknown",
        }
    }

    /// 읽기를 수행할 수 있는 역할인지 여부
    pub fn is_readable(&self) -> bool {
        matches!(self, ServerRole::Primary | ServerRole::Secondary | ServerRole::Router)
    }
}

impl std::fmt::Display for ServerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Server - 서버 기술자
// ============================================================================

/// 선택 시점의 서버 스냅샷
#[derive(Debug, Clone)]
pub struct Server {
    /// 서버 주소
    pub address: ServerAddress,
    /// 평활화된 왕복 시간 추정치
    pub round_trip_time: Duration,
    /// 서버 태그 (예: dc=seoul, rack=b7)
    pub tags: HashMap<String, String>,
    /// 서버 역할
    pub role: ServerRole,
    /// 연결 가능 여부 (최근 헬스체크 기준)
    pub connectable: bool,
}

impl Server {
    /// 새 서버 기술자 생성
    pub fn new(address: ServerAddress, role: ServerRole) -> Self {
        Self {
            address,
            round_trip_time: Duration::ZERO,
            tags: HashMap::new(),
            role,
            connectable: true,
        }
    }

    /// 왕복 시간 설정
    pub fn with_round_trip_time(mut self, rtt: Duration) -> Self {
        self.round_trip_time = rtt;
        self
    }

    /// 태그 추가
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// 연결 가능 여부 설정
    pub fn with_connectable(mut self, connectable: bool) -> Self {
        self.connectable = connectable;
        self
    }

    /// 프라이머리 여부
    pub fn is_primary(&self) -> bool {
        self.role == ServerRole::Primary
    }

    /// 세컨더리 여부
    pub fn is_secondary(&self) -> bool {
        self.role == ServerRole::Secondary
    }

    /// 주어진 태그 집합과 매칭되는지 여부 (서버 태그가 상위집합이면 매칭)
    pub fn matches_tag_set(&self, tag_set: &HashMap<String, String>) -> bool {
        tag_set
            .iter()
            .all(|(key, value)| self.tags.get(key) == Some(value))
    }
}

// ============================================================================
// ServerSet - 서버 집합
// ============================================================================

/// 토폴로지의 현재 서버 집합
///
/// 모니터가 갱신하고 셀렉터가 읽습니다. `snapshot`은 항상 호출
/// 시점의 불변 복사본을 반환하므로 선택 도중 집합이 바뀌어도
/// 한 번의 선택 시도 안에서는 일관된 뷰를 봅니다.
#[derive(Debug, Default)]
pub struct ServerSet {
    servers: RwLock<Vec<Server>>,
}

impl ServerSet {
    /// 빈 서버 집합 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 초기 서버 목록으로 생성
    pub fn from_servers(servers: Vec<Server>) -> Self {
        Self {
            servers: RwLock::new(servers),
        }
    }

    /// 현재 스냅샷 (복사본)
    pub fn snapshot(&self) -> Vec<Server> {
        self.servers.read().clone()
    }

    /// 집합 전체 교체 (토폴로지 모니터가 호출)
    pub fn replace(&self, servers: Vec<Server>) {
        *self.servers.write() = servers;
    }

    /// 서버 하나 추가 또는 갱신 (주소 기준)
    pub fn upsert(&self, server: Server) {
        let mut servers = self.servers.write();
        match servers.iter_mut().find(|s| s.address == server.address) {
            Some(existing) => *existing = server,
            None => servers.push(server),
        }
    }

    /// 서버 제거 (주소 기준)
    pub fn remove(&self, address: &ServerAddress) {
        self.servers.write().retain(|s| &s.address != address);
    }

    /// 현재 프라이머리 (있으면)
    pub fn primary(&self) -> Option<Server> {
        self.servers.read().iter().find(|s| s.is_primary()).cloned()
    }

    /// 현재 세컨더리 목록
    pub fn secondaries(&self) -> Vec<Server> {
        self.servers
            .read()
            .iter()
            .filter(|s| s.is_secondary())
            .cloned()
            .collect()
    }

    /// 서버 수
    pub fn len(&self) -> usize {
        self.servers.read().len()
    }

    /// 비었는지 여부
    pub fn is_empty(&self) -> bool {
        self.servers.read().is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
