//! Plugin resolver - 소스 식별자를 플러그인 팩토리로 해석
//!
//! 정적 등록 방식만 제공합니다. 동적 모듈 로딩이 필요하면 `PluginResolver`를 구현합니다.

use super::builtin;
use super::traits::Plugin;
use plughost_foundation::{ConfigMap, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// 원본 설정을 받아 인스턴스를 생성하는 팩토리
pub type PluginFactory = Arc<dyn Fn(&ConfigMap) -> Result<Arc<dyn Plugin>> + Send + Sync>;

/// 소스 해석 trait
pub trait PluginResolver: Send + Sync {
    /// 해석할 수 없으면 `None`
    fn resolve(&self, source: &str) -> Option<PluginFactory>;

    /// 알려진 소스 목록
    fn sources(&self) -> Vec<String> {
        Vec::new()
    }
}

/// 소스 이름 → 팩토리 테이블
#[derive(Clone, Default)]
pub struct StaticResolver {
    factories: HashMap<String, PluginFactory>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 내장 플러그인 (`builtin:*`) 포함
    pub fn with_builtins() -> Self {
        let mut resolver = Self::new();
        builtin::register_builtins(&mut resolver);
        resolver
    }

    /// 팩토리 등록 (같은 소스는 교체)
    pub fn register<F>(&mut self, source: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&ConfigMap) -> Result<Arc<dyn Plugin>> + Send + Sync + 'static,
    {
        self.factories.insert(source.into(), Arc::new(factory));
        self
    }

    /// 빌더 패턴: 팩토리 등록
    pub fn with<F>(mut self, source: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ConfigMap) -> Result<Arc<dyn Plugin>> + Send + Sync + 'static,
    {
        self.register(source, factory);
        self
    }
}

impl PluginResolver for StaticResolver {
    fn resolve(&self, source: &str) -> Option<PluginFactory> {
        self.factories.get(source).cloned()
    }

    fn sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = self.factories.keys().cloned().collect();
        sources.sort();
        sources
    }
}

impl std::fmt::Debug for StaticResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticResolver")
            .field("sources", &self.sources())
            .finish()
    }
}
