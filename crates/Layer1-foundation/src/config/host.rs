//! Host Config - 플러그인 호스트 통합 설정
//!
//! 로드할 플러그인 목록, 라이프사이클/Tool 마감 시간, 이벤트 버스 설정

use crate::event::EventBusConfig;
use crate::schema::ConfigMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 라이프사이클 hook 기본 마감 시간
pub const DEFAULT_LIFECYCLE_TIMEOUT_MS: u64 = 30_000;

// ============================================================================
// PluginEntry
// ============================================================================

/// 설정 파일의 플러그인 항목
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginEntry {
    /// 런타임 내 고유 이름
    pub name: String,

    /// 소스 식별자 (예: "builtin:memory")
    pub source: String,

    /// 원본 설정 (검증 전)
    #[serde(default)]
    pub config: ConfigMap,

    /// 먼저 시작되어야 하는 플러그인 이름
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl PluginEntry {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            config: ConfigMap::new(),
            depends_on: Vec::new(),
            enabled: true,
        }
    }
}

// ============================================================================
// TimeoutConfig
// ============================================================================

/// 마감 시간 설정 (밀리초, 0이면 제한 없음)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifecycle_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_handler_ms: Option<u64>,
}

impl TimeoutConfig {
    /// init/start/stop/destroy hook 마감
    pub fn lifecycle(&self) -> Option<Duration> {
        to_duration(self.lifecycle_ms.unwrap_or(DEFAULT_LIFECYCLE_TIMEOUT_MS))
    }

    /// Tool 호출 마감 (기본: 제한 없음)
    pub fn tool(&self) -> Option<Duration> {
        self.tool_ms.and_then(to_duration)
    }

    /// 이벤트 핸들러 하나당 마감 (기본: 제한 없음)
    pub fn event_handler(&self) -> Option<Duration> {
        self.event_handler_ms.and_then(to_duration)
    }

    fn merge(self, later: TimeoutConfig) -> Self {
        Self {
            lifecycle_ms: later.lifecycle_ms.or(self.lifecycle_ms),
            tool_ms: later.tool_ms.or(self.tool_ms),
            event_handler_ms: later.event_handler_ms.or(self.event_handler_ms),
        }
    }
}

fn to_duration(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

// ============================================================================
// EventSettings
// ============================================================================

/// 이벤트 버스 설정 섹션
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_size: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_capacity: Option<usize>,

    #[serde(default)]
    pub debug: bool,
}

// ============================================================================
// HostConfig
// ============================================================================

/// 플러그인 호스트 설정
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    /// 설정 순서대로 로드되는 플러그인
    #[serde(default)]
    pub plugins: Vec<PluginEntry>,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub events: EventSettings,

    /// 플러그인 하나의 시작 실패 시 나머지를 계속 진행할지 (기본: true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continue_on_error: Option<bool>,
}

impl HostConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plugin(mut self, entry: PluginEntry) -> Self {
        self.plugins.push(entry);
        self
    }

    pub fn continue_on_error(&self) -> bool {
        self.continue_on_error.unwrap_or(true)
    }

    /// 이벤트 버스 설정으로 변환
    pub fn event_bus_config(&self) -> EventBusConfig {
        let defaults = EventBusConfig::default();
        EventBusConfig {
            channel_capacity: self
                .events
                .channel_capacity
                .unwrap_or(defaults.channel_capacity),
            history_size: self.events.history_size.unwrap_or(defaults.history_size),
            handler_timeout: self.timeouts.event_handler(),
            debug_mode: self.events.debug,
        }
    }

    /// 두 설정 병합 (`later`가 `self`를 오버라이드)
    ///
    /// 플러그인은 이름 기준으로 교체되며, 새 이름은 뒤에 추가됩니다.
    pub fn merge(self, later: HostConfig) -> HostConfig {
        let mut plugins = self.plugins;
        for entry in later.plugins {
            match plugins.iter_mut().find(|p| p.name == entry.name) {
                Some(existing) => *existing = entry,
                None => plugins.push(entry),
            }
        }

        HostConfig {
            plugins,
            timeouts: self.timeouts.merge(later.timeouts),
            events: EventSettings {
                history_size: later.events.history_size.or(self.events.history_size),
                channel_capacity: later
                    .events
                    .channel_capacity
                    .or(self.events.channel_capacity),
                debug: later.events.debug || self.events.debug,
            },
            continue_on_error: later.continue_on_error.or(self.continue_on_error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_camel_case() {
        let config: HostConfig = serde_json::from_value(json!({
            "plugins": [
                {"name": "memory", "source": "builtin:memory", "config": {"persist": false}},
                {"name": "db", "source": "builtin:db", "dependsOn": ["memory"], "enabled": false}
            ],
            "timeouts": {"lifecycleMs": 500, "toolMs": 0},
            "continueOnError": false
        }))
        .unwrap();

        assert_eq!(config.plugins.len(), 2);
        assert!(config.plugins[0].enabled);
        assert_eq!(config.plugins[1].depends_on, vec!["memory".to_string()]);
        assert!(!config.plugins[1].enabled);
        assert_eq!(config.timeouts.lifecycle(), Some(Duration::from_millis(500)));
        assert_eq!(config.timeouts.tool(), None);
        assert!(!config.continue_on_error());
    }

    #[test]
    fn test_defaults() {
        let config = HostConfig::new();
        assert!(config.continue_on_error());
        assert_eq!(
            config.timeouts.lifecycle(),
            Some(Duration::from_millis(DEFAULT_LIFECYCLE_TIMEOUT_MS))
        );
        assert_eq!(config.event_bus_config().history_size, 100);
    }

    #[test]
    fn test_merge_replaces_by_name() {
        let earlier = HostConfig::new()
            .with_plugin(PluginEntry::new("memory", "builtin:memory"))
            .with_plugin(PluginEntry::new("db", "builtin:db"));
        let mut later = HostConfig::new().with_plugin(PluginEntry::new("memory", "local:memory"));
        later.timeouts.tool_ms = Some(1_000);

        let merged = earlier.merge(later);
        assert_eq!(merged.plugins.len(), 2);
        assert_eq!(merged.plugins[0].source, "local:memory");
        assert_eq!(merged.plugins[1].name, "db");
        assert_eq!(merged.timeouts.tool(), Some(Duration::from_secs(1)));
    }
}
