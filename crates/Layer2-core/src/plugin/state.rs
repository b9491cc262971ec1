//! Plugin lifecycle state machine

use parking_lot::RwLock;
use plughost_foundation::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 플러그인 라이프사이클 상태
///
/// ```text
/// unloaded → loaded → initializing → initialized → starting → started
///                                                              │
///   destroyed ← destroying ← stopped ← stopping ←──────────────┘
///
/// (any non-terminal) → failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Unloaded,
    Loaded,
    Initializing,
    Initialized,
    Starting,
    Started,
    Stopping,
    Stopped,
    Destroying,
    Destroyed,
    Failed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unloaded => "unloaded",
            Self::Loaded => "loaded",
            Self::Initializing => "initializing",
            Self::Initialized => "initialized",
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Destroying => "destroying",
            Self::Destroyed => "destroyed",
            Self::Failed => "failed",
        }
    }

    /// 정의된 전이인지 확인
    ///
    /// 시작하지 않은 플러그인도 정리할 수 있도록 `initialized → stopping`,
    /// `loaded → destroying` 전이를 허용합니다.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;

        if next == Failed {
            return !self.is_terminal();
        }

        matches!(
            (self, next),
            (Unloaded, Loaded)
                | (Loaded, Initializing)
                | (Initializing, Initialized)
                | (Initialized, Starting)
                | (Starting, Started)
                | (Started, Stopping)
                | (Initialized, Stopping)
                | (Stopping, Stopped)
                | (Stopped, Destroying)
                | (Loaded, Destroying)
                | (Destroying, Destroyed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Destroyed | Self::Failed)
    }

    /// Tool/이벤트 등록이 허용되는 상태 (initializing 이후, destroyed 이전)
    pub fn accepts_registrations(&self) -> bool {
        matches!(
            self,
            Self::Initializing
                | Self::Initialized
                | Self::Starting
                | Self::Started
                | Self::Stopping
                | Self::Stopped
                | Self::Destroying
        )
    }

    /// 전이 작업이 진행 중인 상태
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Initializing | Self::Starting | Self::Stopping | Self::Destroying
        )
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::Unloaded
    }
}

/// 플러그인 하나의 상태를 공유하는 셀
///
/// Manager, ToolRegistry, 이벤트 구독이 같은 셀을 참조하여 디스패치 가능 여부를 판단합니다.
#[derive(Debug, Clone, Default)]
pub struct StateCell(Arc<RwLock<LifecycleState>>);

impl StateCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> LifecycleState {
        *self.0.read()
    }

    /// 검사 후 전이 (원자적), 이전 상태 반환
    pub fn transition(&self, plugin: &str, next: LifecycleState) -> Result<LifecycleState> {
        let mut state = self.0.write();
        let previous = *state;
        if !previous.can_transition_to(next) {
            return Err(Error::invalid_state(
                plugin,
                format!("cannot transition from {} to {}", previous, next),
            ));
        }
        *state = next;
        Ok(previous)
    }

    /// 실패 상태로 전환 (이미 terminal이면 변경 없음)
    pub fn fail(&self) -> LifecycleState {
        let mut state = self.0.write();
        let previous = *state;
        if !previous.is_terminal() {
            *state = LifecycleState::Failed;
        }
        previous
    }
}
