//! Read Preference - 읽기 선호
//!
//! 읽기를 어느 서버로 보낼지 결정하는 선호 설정.
//! 상태가 없는 순수 값이며, 셀렉터의 입력으로만 쓰입니다.

use std::collections::HashMap;
use std::time::Duration;

/// 레이턴시 윈도 기본 폭
pub const DEFAULT_LOCAL_THRESHOLD: Duration = Duration::from_millis(15);

// ============================================================================
// ReadMode - 읽기 모드
// ============================================================================

/// 읽기 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// 프라이머리에서만 읽음
    #[default]
    Primary,
    /// 프라이머리 우선, 없으면 세컨더리
    PrimaryPreferred,
    /// 세컨더리에서만 읽음
    Secondary,
    /// 세컨더리 우선, 없으면 프라이머리
    SecondaryPreferred,
    /// 역할 무관, 가장 가까운 서버
    Nearest,
}

impl ReadMode {
    /// 문자열 표기에서 파싱 (URI 옵션용)
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "primary" => Some(Self::Primary),
            "primaryPreferred" => Some(Self::PrimaryPreferred),
            "secondary" => Some(Self::Secondary),
            "secondaryPreferred" => Some(Self::SecondaryPreferred),
            "nearest" => Some(Self::Nearest),
            _ => None,
        }
    }

    /// 문자열 표기
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::PrimaryPreferred => "primaryPreferred",
            Self::Secondary => "secondary",
            Self::SecondaryPreferred => "secondaryPreferred",
            Self::Nearest => "nearest",
        }
    }
}

impl std::fmt::Display for ReadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ReadPreference - 읽기 선호
// ============================================================================

/// 읽기 선호
#[derive(Debug, Clone)]
pub struct ReadPreference {
    /// 읽기 모드
    pub mode: ReadMode,
    /// 태그 집합 필터 (순서 의미 있음, 첫 매칭이 이김)
    pub tag_sets: Vec<HashMap<String, String>>,
    /// 허용 가능한 복제 지연 상한 (추가 필터로만 인정)
    pub max_staleness: Option<Duration>,
    /// 레이턴시 윈도 폭
    pub local_threshold: Duration,
}

impl Default for ReadPreference {
    fn default() -> Self {
        Self {
            mode: ReadMode::Primary,
            tag_sets: Vec::new(),
            max_staleness: None,
            local_threshold: DEFAULT_LOCAL_THRESHOLD,
        }
    }
}

impl ReadPreference {
    /// 모드만 지정해 생성
    pub fn new(mode: ReadMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// 프라이머리 읽기 선호
    pub fn primary() -> Self {
        Self::new(ReadMode::Primary)
    }

    /// 세컨더리 읽기 선호
    pub fn secondary() -> Self {
        Self::new(ReadMode::Secondary)
    }

    /// 가장 가까운 서버 선호
    pub fn nearest() -> Self {
        Self::new(ReadMode::Nearest)
    }

    /// 빌더 패턴으로 생성
    pub fn builder() -> ReadPreferenceBuilder {
        ReadPreferenceBuilder::default()
    }

    /// 태그 필터 사용 여부
    pub fn has_tag_sets(&self) -> bool {
        self.tag_sets.iter().any(|set| !set.is_empty())
    }
}

/// 읽기 선호 빌더
#[derive(Debug, Clone, Default)]
pub struct ReadPreferenceBuilder {
    preference: ReadPreference,
}

impl ReadPreferenceBuilder {
    /// 읽기 모드 설정
    pub fn mode(mut self, mode: ReadMode) -> Self {
        self.preference.mode = mode;
        self
    }

    /// 태그 집합 추가 (추가한 순서대로 평가됨)
    pub fn tag_set(mut self, tag_set: HashMap<String, String>) -> Self {
        self.preference.tag_sets.push(tag_set);
        self
    }

    /// 복제 지연 상한 설정
    pub fn max_staleness(mut self, staleness: Duration) -> Self {
        self.preference.max_staleness = Some(staleness);
        self
    }

    /// 레이턴시 윈도 폭 설정
    pub fn local_threshold(mut self, threshold: Duration) -> Self {
        self.preference.local_threshold = threshold;
        self
    }

    /// 빌드
    pub fn build(self) -> ReadPreference {
        self.preference
    }
}

// ============================================================================
// Tests
// ============================================================================
