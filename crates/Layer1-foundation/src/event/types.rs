//! Event Types - 이벤트 이름 규칙과 디스패치 기록
//!
//! 이벤트 이름은 `<base>` 또는 `<base>:<phase>` 형식의 평범한 문자열입니다.
//! 버스는 정확히 일치하는 이름으로만 라우팅하며, phase 순서는 Agent Runtime이 결정합니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Event ID
// ============================================================================

/// 디스패치 고유 ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Phase
// ============================================================================

/// 파이프라인 단계 접미사
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPhase {
    Start,
    End,
}

impl EventPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
        }
    }
}

/// `base` + phase → 이벤트 이름 (phase가 없으면 "완료 시점" 이벤트)
pub fn event_name(base: &str, phase: Option<EventPhase>) -> String {
    match phase {
        Some(phase) => format!("{}:{}", base, phase.as_str()),
        None => base.to_string(),
    }
}

/// 마지막 `:start`/`:end` 접미사 분리
///
/// 다른 접미사(`memory:stored` 등)는 base 이름의 일부로 취급합니다.
pub fn split_phase(name: &str) -> (&str, Option<EventPhase>) {
    if let Some(base) = name.strip_suffix(":start") {
        (base, Some(EventPhase::Start))
    } else if let Some(base) = name.strip_suffix(":end") {
        (base, Some(EventPhase::End))
    } else {
        (name, None)
    }
}

// ============================================================================
// 사전 정의된 이벤트 이름
// ============================================================================

/// 호스트가 발행하는 플러그인 라이프사이클 알림
pub mod lifecycle {
    pub const PLUGIN_LOADED: &str = "plugin:loaded";
    pub const PLUGIN_STARTED: &str = "plugin:started";
    pub const PLUGIN_STOPPED: &str = "plugin:stopped";
    pub const PLUGIN_FAILED: &str = "plugin:failed";
}

/// Agent Runtime 파이프라인 이벤트 base 이름
pub mod pipeline {
    pub const REQUEST_INPUT: &str = "request_input";
    pub const REQUEST_OUTPUT: &str = "request_output";
    pub const TOOL_CALL: &str = "tool_call";
}

// ============================================================================
// DispatchRecord
// ============================================================================

/// 디스패치 1회에 대한 기록 (히스토리/브로드캐스트용)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub id: EventId,
    pub event: String,
    pub timestamp: DateTime<Utc>,
    /// 호출된 핸들러 수
    pub handlers: usize,
    /// 실패한 핸들러 수
    pub failures: usize,
}

impl DispatchRecord {
    pub fn new(event: impl Into<String>, handlers: usize, failures: usize) -> Self {
        Self {
            id: EventId::new(),
            event: event.into(),
            timestamp: Utc::now(),
            handlers,
            failures,
        }
    }
}
