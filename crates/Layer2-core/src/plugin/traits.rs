//! Plugin traits - 핵심 플러그인 인터페이스

use super::manifest::PluginManifest;
use super::scope::{PluginEvents, ToolScope};
use super::state::{LifecycleState, StateCell};
use async_trait::async_trait;
use plughost_foundation::{validate_config, ConfigMap, Result, ValidationSchema};
use serde_json::Value;
use std::any::Any;
use tokio::sync::RwLock;

// ============================================================================
// PluginContext - 플러그인에 제공되는 컨텍스트
// ============================================================================

/// 플러그인 컨텍스트 - 플러그인이 호스트와 상호작용하는 인터페이스
///
/// 검증된 설정, Tool 등록 핸들, 이벤트 핸들을 제공합니다.
/// 모든 핸들은 이 플러그인의 이름과 상태에 묶여 있습니다.
pub struct PluginContext {
    name: String,

    /// 검증 완료된 설정
    config: RwLock<ConfigMap>,

    tools: ToolScope,
    events: PluginEvents,
    state: StateCell,
}

impl PluginContext {
    pub(crate) fn new(
        name: impl Into<String>,
        config: ConfigMap,
        tools: ToolScope,
        events: PluginEvents,
        state: StateCell,
    ) -> Self {
        Self {
            name: name.into(),
            config: RwLock::new(config),
            tools,
            events,
            state,
        }
    }

    /// 런타임 내 플러그인 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> LifecycleState {
        self.state.get()
    }

    // ========================================================================
    // 설정
    // ========================================================================

    /// 전체 설정 복사본
    pub async fn config(&self) -> ConfigMap {
        self.config.read().await.clone()
    }

    pub async fn get_config(&self, key: &str) -> Option<Value> {
        self.config.read().await.get(key).cloned()
    }

    pub async fn set_config(&self, key: impl Into<String>, value: Value) {
        self.config.write().await.insert(key.into(), value);
    }

    /// 새 설정을 스키마로 검증 후 교체
    ///
    /// 실패하면 기존 설정이 유지됩니다.
    pub async fn replace_config(
        &self,
        raw: &ConfigMap,
        schema: &ValidationSchema,
    ) -> Result<ConfigMap> {
        let resolved = validate_config(&self.name, raw, schema)?;
        *self.config.write().await = resolved.clone();
        Ok(resolved)
    }

    // ========================================================================
    // 등록 핸들
    // ========================================================================

    pub fn tools(&self) -> &ToolScope {
        &self.tools
    }

    pub fn events(&self) -> &PluginEvents {
        &self.events
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("name", &self.name)
            .field("state", &self.state.get())
            .finish()
    }
}

// ============================================================================
// Plugin Trait - 핵심 플러그인 인터페이스
// ============================================================================

/// 플러그인 trait
///
/// ## 라이프사이클
/// ```text
/// 1. load        → 인스턴스 생성, 설정 검증
/// 2. init()      → Tool/이벤트 등록
/// 3. on_start()  → 리소스 확보, 이후 Tool 호출/이벤트 수신 가능
/// 4. on_stop()   → 리소스 해제
/// 5. on_destroy()→ 최종 정리
/// ```
///
/// ## 구현 예시
/// ```ignore
/// struct EchoPlugin;
///
/// #[async_trait]
/// impl Plugin for EchoPlugin {
///     fn manifest(&self) -> PluginManifest {
///         PluginManifest::new("echo")
///     }
///
///     async fn init(&self, ctx: &PluginContext) -> Result<()> {
///         let spec = ToolSpec::new("say", tool_fn(|args| async move { Ok(Value::Object(args)) }));
///         ctx.tools().register(spec).await?;
///         Ok(())
///     }
///
///     fn as_any(&self) -> &dyn Any {
///         self
///     }
/// }
/// ```
#[async_trait]
pub trait Plugin: Send + Sync {
    /// 플러그인 매니페스트
    fn manifest(&self) -> PluginManifest;

    /// 설정 스키마 (기본: 빈 스키마, 모든 설정 통과)
    fn config_schema(&self) -> ValidationSchema {
        ValidationSchema::new()
    }

    /// 초기화 - Tool/이벤트 등록
    async fn init(&self, ctx: &PluginContext) -> Result<()>;

    /// 시작
    async fn on_start(&self, _ctx: &PluginContext) -> Result<()> {
        Ok(())
    }

    /// 중지
    async fn on_stop(&self, _ctx: &PluginContext) -> Result<()> {
        Ok(())
    }

    /// 최종 정리 (기본: `on_stop`과 동일)
    async fn on_destroy(&self, ctx: &PluginContext) -> Result<()> {
        self.on_stop(ctx).await
    }

    /// 다운캐스팅 지원
    fn as_any(&self) -> &dyn Any;
}

/// Plugin trait 확장 - 다운캐스팅 헬퍼
pub trait PluginExt: Plugin {
    fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

impl<P: Plugin + ?Sized> PluginExt for P {}
