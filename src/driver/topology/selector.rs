//! Server Selector - 서버 셀렉터
//!
//! 읽기 선호와 서버 스냅샷으로부터 적격 서버 집합을 계산하고
//! 그중 하나를 고릅니다. 입력의 순수 함수이며 서버 상태를
//! 변경하지 않습니다.

use std::time::{Duration, Instant};

use rand::Rng;

use super::super::error::{DriverError, DriverResult};
use super::preference::{ReadMode, ReadPreference};
use super::server::{Server, ServerSet};

/// 서버 선택 전체 제한 시간 기본값
pub const DEFAULT_SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// 선택 실패 후 새 스냅샷을 다시 시도하기까지의 간격
pub const SELECTION_RETRY_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// ServerSelector - 서버 셀렉터
// ============================================================================

/// 서버 셀렉터
///
/// 선택 파이프라인: 연결 가능 필터 → 모드별 역할 필터 →
/// 태그 집합 필터 (첫 매칭이 이김) → 레이턴시 윈도 →
/// 윈도 안에서 균등 무작위 선택.
#[derive(Debug, Clone)]
pub struct ServerSelector {
    preference: ReadPreference,
}

impl ServerSelector {
    /// 읽기 선호로 셀렉터 생성
    pub fn new(preference: ReadPreference) -> Self {
        Self { preference }
    }

    /// 읽기 선호
    pub fn preference(&self) -> &ReadPreference {
        &self.preference
    }

    /// 스냅샷에서 적격 서버 집합 계산
    pub fn suitable_servers(&self, servers: &[Server]) -> Vec<Server> {
        let connectable: Vec<&Server> = servers.iter().filter(|s| s.connectable).collect();

        let candidates: Vec<&Server> = match self.preference.mode {
            // 프라이머리 선택은 태그를 무시한다
            ReadMode::Primary => Self::primaries(&connectable),
            ReadMode::PrimaryPreferred => {
                let primaries = Self::primaries(&connectable);
                if primaries.is_empty() {
                    self.filter_by_tags(Self::secondaries(&connectable))
                } else {
                    primaries
                }
            }
            ReadMode::Secondary => self.filter_by_tags(Self::secondaries(&connectable)),
            ReadMode::SecondaryPreferred => {
                let secondaries = self.filter_by_tags(Self::secondaries(&connectable));
                if secondaries.is_empty() {
                    Self::primaries(&connectable)
                } else {
                    secondaries
                }
            }
            ReadMode::Nearest => self.filter_by_tags(Self::readables(&connectable)),
        };

        Self::within_latency_window(&candidates, self.preference.local_threshold)
            .into_iter()
            .cloned()
            .collect()
    }

    /// 스냅샷에서 서버 하나 선택 (적격 집합에서 균등 무작위)
    pub fn select_from(&self, servers: &[Server]) -> Option<Server> {
        let suitable = self.suitable_servers(servers);
        if suitable.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..suitable.len());
        suitable.into_iter().nth(index)
    }

    /// 제한 시간 안에서 서버 선택
    ///
    /// 스냅샷에 적격 서버가 없으면 곧바로 실패하지 않고 짧은 간격으로
    /// 새 스냅샷을 다시 시도합니다. 토폴로지가 따라잡을 시간을 주고,
    /// 제한 시간이 다 지나야 `NoServerAvailable`을 반환합니다.
    pub async fn select(&self, topology: &ServerSet, timeout: Duration) -> DriverResult<Server> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(server) = self.select_from(&topology.snapshot()) {
                return Ok(server);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(DriverError::no_server_available(format!(
                    "No server satisfies read preference {} within {:?}",
                    self.preference.mode, timeout
                )));
            }
            tokio::time::sleep(remaining.min(SELECTION_RETRY_INTERVAL)).await;
        }
    }

    fn primaries<'a>(servers: &[&'a Server]) -> Vec<&'a Server> {
        servers.iter().filter(|s| s.is_primary()).copied().collect()
    }

    fn secondaries<'a>(servers: &[&'a Server]) -> Vec<&'a Server> {
        servers.iter().filter(|s| s.is_secondary()).copied().collect()
    }

    fn readables<'a>(servers: &[&'a Server]) -> Vec<&'a Server> {
        servers
            .iter()
            .filter(|s| s.is_primary() || s.is_secondary())
            .copied()
            .collect()
    }

    /// 태그 집합 필터
    ///
    /// 순서대로 평가해 후보를 하나 이상 남기는 첫 번째 태그 집합이
    /// 집합을 확정합니다. 태그 집합이 있는데 아무것도 매칭되지
    /// 않으면 빈 집합입니다.
    fn filter_by_tags<'a>(&self, candidates: Vec<&'a Server>) -> Vec<&'a Server> {
        if !self.preference.has_tag_sets() {
            return candidates;
        }

        for tag_set in &self.preference.tag_sets {
            let matched: Vec<&Server> = candidates
                .iter()
                .filter(|s| s.matches_tag_set(tag_set))
                .copied()
                .collect();
            if !matched.is_empty() {
                return matched;
            }
        }
        Vec::new()
    }

    /// 레이턴시 윈도 필터
    ///
    /// 최소 왕복 시간 `m`에 대해 `[m, m + threshold]` 안의 서버만
    /// 남깁니다. 윈도 안의 모든 서버는 동등하게 적격입니다.
    fn within_latency_window<'a>(
        candidates: &[&'a Server],
        threshold: Duration,
    ) -> Vec<&'a Server> {
        let min_rtt = match candidates.iter().map(|s| s.round_trip_time).min() {
            Some(min) => min,
            None => return Vec::new(),
        };
        let upper = min_rtt + threshold;
        candidates
            .iter()
            .filter(|s| s.round_trip_time <= upper)
            .copied()
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
