//! Plugin-scoped handles - 플러그인 이름으로 고정된 Tool/이벤트 접근
//!
//! 플러그인은 레지스트리와 버스에 직접 접근하지 않고 이 핸들을 통해서만 등록합니다.
//! 등록은 `initializing` ~ `destroying` 구간에서만 허용됩니다.

use super::state::{LifecycleState, StateCell};
use crate::tool::{ToolRegistry, ToolSpec};
use async_trait::async_trait;
use plughost_foundation::{
    DispatchOutcome, Error, EventBus, EventHandler, Payload, Result, SubscriptionId,
};
use std::sync::Arc;
use tracing::{debug, trace};

fn ensure_open(plugin: &str, state: &StateCell, what: &str) -> Result<()> {
    let current = state.get();
    if current.accepts_registrations() {
        Ok(())
    } else {
        Err(Error::invalid_state(
            plugin,
            format!("cannot {} while {}", what, current),
        ))
    }
}

// ============================================================================
// ToolScope
// ============================================================================

/// 플러그인 전용 Tool 등록 핸들
#[derive(Clone)]
pub struct ToolScope {
    plugin: String,
    registry: Arc<ToolRegistry>,
    state: StateCell,
}

impl ToolScope {
    pub(crate) fn new(plugin: impl Into<String>, registry: Arc<ToolRegistry>, state: StateCell) -> Self {
        Self {
            plugin: plugin.into(),
            registry,
            state,
        }
    }

    /// Tool 등록, 정규화된 이름 반환
    pub async fn register(&self, spec: ToolSpec) -> Result<String> {
        ensure_open(&self.plugin, &self.state, "register tools")?;
        self.registry
            .register(&self.plugin, spec, self.state.clone())
            .await
    }

    /// 이 플러그인이 등록한 Tool 이름
    pub async fn registered(&self) -> Vec<String> {
        self.registry.names_for(&self.plugin).await
    }

    pub(crate) async fn clear(&self) -> usize {
        self.registry.unregister_all(&self.plugin).await
    }
}

// ============================================================================
// PluginEvents
// ============================================================================

/// 플러그인 전용 이벤트 핸들
#[derive(Clone)]
pub struct PluginEvents {
    plugin: String,
    bus: Arc<EventBus>,
    state: StateCell,
}

impl PluginEvents {
    pub(crate) fn new(plugin: impl Into<String>, bus: Arc<EventBus>, state: StateCell) -> Self {
        Self {
            plugin: plugin.into(),
            bus,
            state,
        }
    }

    /// 이벤트 구독
    ///
    /// 핸들러는 플러그인이 `started`일 때만 호출되며, 그 외 상태에서는 건너뜁니다.
    pub async fn on(&self, event: &str, handler: Arc<dyn EventHandler>) -> Result<SubscriptionId> {
        ensure_open(&self.plugin, &self.state, "subscribe")?;
        let gated = Arc::new(StateGatedHandler {
            plugin: self.plugin.clone(),
            state: self.state.clone(),
            inner: handler,
        });
        let state = self.state.clone();
        let id = self
            .bus
            .subscribe_if(event, &self.plugin, gated, move || {
                state.get().accepts_registrations()
            })
            .await
            .ok_or_else(|| {
                Error::invalid_state(
                    &self.plugin,
                    format!("cannot subscribe while {}", self.state.get()),
                )
            })?;
        debug!(plugin = %self.plugin, event = %event, %id, "Plugin subscribed");
        Ok(id)
    }

    /// 이 플러그인의 구독 해제
    pub async fn off(&self, id: SubscriptionId) -> Result<bool> {
        match self.bus.owner_of(id).await {
            None => Ok(false),
            Some(owner) if owner == self.plugin => Ok(self.bus.unsubscribe(id).await),
            Some(owner) => Err(Error::invalid_state(
                &self.plugin,
                format!("{} belongs to plugin '{}'", id, owner),
            )),
        }
    }

    /// 이벤트 발행
    pub async fn emit(&self, event: &str, payload: Payload) -> Result<DispatchOutcome> {
        let current = self.state.get();
        if current.is_terminal() {
            return Err(Error::NotReady {
                plugin: self.plugin.clone(),
                state: current.to_string(),
            });
        }
        Ok(self.bus.publish(event, payload).await)
    }

    /// 이 플러그인의 구독 수
    pub async fn subscription_count(&self) -> usize {
        self.bus.plugin_subscription_count(&self.plugin).await
    }

    pub(crate) async fn clear(&self) -> usize {
        self.bus.unsubscribe_all(&self.plugin).await
    }
}

/// 소유 플러그인이 `started`가 아니면 건너뛰는 핸들러 래퍼
struct StateGatedHandler {
    plugin: String,
    state: StateCell,
    inner: Arc<dyn EventHandler>,
}

#[async_trait]
impl EventHandler for StateGatedHandler {
    async fn handle(&self, event: &str, payload: &Payload) -> Result<Option<Payload>> {
        let current = self.state.get();
        if current != LifecycleState::Started {
            trace!(plugin = %self.plugin, event = %event, state = %current, "Skipping handler");
            return Ok(None);
        }
        self.inner.handle(event, payload).await
    }
}
