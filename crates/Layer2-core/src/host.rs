//! Plugin Host - Agent Runtime이 사용하는 단일 진입점
//!
//! PluginManager, ToolRegistry, EventBus를 하나로 묶고
//! `HostConfig`의 정책(마감 시간, 실패 시 계속 진행 여부)을 적용합니다.
//!
//! ```ignore
//! let host = PluginHost::with_builtins(HostConfigLoader::new(&cwd).load_all());
//! host.boot().await?;
//!
//! let payload = host.publish("request_output:start", payload).await?;
//! let result = host.invoke("plugin:memory:recall", json!({"conversationId": "c1"})).await?;
//!
//! host.stop_all().await;
//! ```

use crate::plugin::{
    LifecycleState, Plugin, PluginDescriptor, PluginManager, PluginManagerConfig, PluginResolver,
    StartReport, StaticResolver, TeardownReport,
};
use crate::tool::ToolRegistry;
use plughost_foundation::{
    DispatchOutcome, Error, EventBus, HostConfig, HostConfigLoader, Payload, Result,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 호스트 현황
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostSummary {
    pub plugins: usize,
    /// 상태 이름별 플러그인 수
    pub by_state: BTreeMap<String, usize>,
    pub tools: usize,
    pub subscriptions: usize,
    pub events_published: u64,
    pub tool_invocations: u64,
}

/// 플러그인 호스트
pub struct PluginHost {
    manager: PluginManager,
    config: HostConfig,
}

impl PluginHost {
    /// 기본 설정으로 생성
    pub fn new(resolver: Arc<dyn PluginResolver>) -> Self {
        Self::with_config(HostConfig::new(), resolver)
    }

    pub fn with_config(config: HostConfig, resolver: Arc<dyn PluginResolver>) -> Self {
        let events = Arc::new(EventBus::with_config(config.event_bus_config()));
        let tools = Arc::new(ToolRegistry::with_timeout(config.timeouts.tool()));
        let manager = PluginManager::with_parts(
            resolver,
            tools,
            events,
            PluginManagerConfig::from(&config),
        );

        Self { manager, config }
    }

    /// 내장 플러그인 리졸버 사용
    pub fn with_builtins(config: HostConfig) -> Self {
        Self::with_config(config, Arc::new(StaticResolver::with_builtins()))
    }

    /// 사용자/프로젝트 설정 파일을 병합하여 생성
    pub fn from_config_dir(working_dir: &Path, resolver: Arc<dyn PluginResolver>) -> Self {
        let config = HostConfigLoader::new(working_dir).load_all();
        Self::with_config(config, resolver)
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn manager(&self) -> &PluginManager {
        &self.manager
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        self.manager.tools()
    }

    pub fn events(&self) -> &Arc<EventBus> {
        self.manager.events()
    }

    // ========================================================================
    // 라이프사이클
    // ========================================================================

    /// 설정에 나열된 플러그인을 순서대로 로드, 실패 목록 반환
    pub async fn load_configured(&self) -> Vec<(String, Error)> {
        let mut failures = Vec::new();
        for entry in &self.config.plugins {
            let descriptor = PluginDescriptor::from(entry.clone());
            if let Err(e) = self.manager.load(descriptor).await {
                warn!(plugin = %entry.name, error = %e, "Configured plugin failed to load");
                failures.push((entry.name.clone(), e));
            }
        }
        failures
    }

    pub async fn load_plugin(&self, descriptor: PluginDescriptor) -> Result<()> {
        self.manager.load(descriptor).await
    }

    /// 로드된 플러그인 일괄 시작
    ///
    /// `continueOnError = false`이면 첫 실패에서 모든 플러그인을 정리하고 그 에러를 반환합니다.
    pub async fn start_all(&self) -> Result<StartReport> {
        let report = self.manager.start_all().await?;
        if report.is_success() || self.config.continue_on_error() {
            return Ok(report);
        }

        let teardown = self.manager.stop_all().await;
        warn!(
            errors = teardown.errors.len(),
            "Startup aborted, all plugins torn down"
        );
        match report.failed.into_iter().next() {
            Some((_, e)) => Err(e),
            None => Err(Error::Internal("startup aborted without a failure".into())),
        }
    }

    /// 설정된 플러그인 로드 후 일괄 시작
    pub async fn boot(&self) -> Result<StartReport> {
        let failures = self.load_configured().await;
        if !self.config.continue_on_error() {
            if let Some((_, e)) = failures.into_iter().next() {
                self.manager.stop_all().await;
                return Err(e);
            }
        }

        let report = self.start_all().await?;
        info!(started = report.started.len(), "Plugin host ready");
        Ok(report)
    }

    pub async fn stop_all(&self) -> TeardownReport {
        self.manager.stop_all().await
    }

    // ========================================================================
    // 디스패치
    // ========================================================================

    /// Tool 호출 (설정된 기본 마감 적용)
    pub async fn invoke(&self, qualified: &str, args: Value) -> Result<Value> {
        self.tools().invoke(qualified, args).await
    }

    pub async fn invoke_with_timeout(
        &self,
        qualified: &str,
        args: Value,
        deadline: Option<Duration>,
    ) -> Result<Value> {
        self.tools()
            .invoke_with_timeout(qualified, args, deadline)
            .await
    }

    /// 이벤트 발행, 최종 페이로드 반환
    ///
    /// 핸들러 실패가 있으면 모든 핸들러 실행 후 `EventDispatch`로 한 번에 보고합니다.
    pub async fn publish(&self, event: &str, payload: Payload) -> Result<Payload> {
        self.dispatch(event, payload).await.into_result()
    }

    /// 이벤트 발행, 실패 목록 포함 결과 그대로 반환
    pub async fn dispatch(&self, event: &str, payload: Payload) -> DispatchOutcome {
        self.events().publish(event, payload).await
    }

    /// `started` 상태의 플러그인 인스턴스
    pub async fn get_plugin(&self, name: &str) -> Result<Arc<dyn Plugin>> {
        self.manager.get_instance(name).await
    }

    pub async fn state(&self, name: &str) -> Option<LifecycleState> {
        self.manager.state(name).await
    }

    pub async fn summary(&self) -> HostSummary {
        let mut by_state = BTreeMap::new();
        let plugins = self.manager.list().await;
        for info in &plugins {
            *by_state.entry(info.state.to_string()).or_insert(0) += 1;
        }

        HostSummary {
            plugins: plugins.len(),
            by_state,
            tools: self.tools().len().await,
            subscriptions: self.events().subscription_count().await,
            events_published: self.events().event_count(),
            tool_invocations: self.tools().invocation_count(),
        }
    }
}
