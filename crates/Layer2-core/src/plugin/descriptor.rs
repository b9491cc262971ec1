//! Plugin descriptor - 로드 요청 정보

use plughost_foundation::{ConfigMap, PluginEntry};
use serde::{Deserialize, Serialize};

/// 플러그인 로드 요청
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    /// 런타임 내 고유 이름
    pub name: String,

    /// 리졸버가 해석하는 소스 식별자
    pub source: String,

    /// 검증 전 원본 설정
    #[serde(default)]
    pub raw_config: ConfigMap,

    #[serde(default)]
    pub depends_on: Vec<String>,

    /// false면 `start_all`에서 건너뜀
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl PluginDescriptor {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            raw_config: ConfigMap::new(),
            depends_on: Vec::new(),
            enabled: true,
        }
    }

    pub fn with_config(mut self, config: ConfigMap) -> Self {
        self.raw_config = config;
        self
    }

    /// 단일 설정 값 추가
    pub fn with_setting(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.raw_config.insert(key.into(), value);
        self
    }

    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

impl From<PluginEntry> for PluginDescriptor {
    fn from(entry: PluginEntry) -> Self {
        Self {
            name: entry.name,
            source: entry.source,
            raw_config: entry.config,
            depends_on: entry.depends_on,
            enabled: entry.enabled,
        }
    }
}
