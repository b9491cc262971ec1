//! Plugin Manager - 플러그인 라이프사이클 관리
//!
//! ## 기능
//!
//! - 소스 해석 → 인스턴스 생성 → 설정 검증 (`load`)
//! - 상태 머신에 따른 init/start/stop/destroy 호출
//! - 실패 시 해당 플러그인의 Tool/구독 롤백
//! - 의존성 순서 일괄 시작 / 역순 일괄 정리
//!
//! 플러그인 hook은 별도 task에서 실행되며, 마감을 넘기면 `Timeout`으로
//! 실패 처리하고 hook은 백그라운드에 그대로 둡니다.
//! 매니저 내부 잠금은 hook 실행 중에 잡고 있지 않습니다.

use super::dependency::resolve_start_order;
use super::descriptor::PluginDescriptor;
use super::manifest::PluginManifest;
use super::resolver::PluginResolver;
use super::scope::{PluginEvents, ToolScope};
use super::state::{LifecycleState, StateCell};
use super::traits::{Plugin, PluginContext};
use crate::tool::{is_valid_name, ToolRegistry};
use plughost_foundation::event::lifecycle;
use plughost_foundation::{
    validate_config, with_deadline, ConfigMap, Error, EventBus, HostConfig, Payload, Result,
    TimeoutConfig,
};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// 플러그인 매니저 설정
#[derive(Debug, Clone)]
pub struct PluginManagerConfig {
    /// hook 하나당 마감 (None이면 제한 없음)
    pub lifecycle_timeout: Option<Duration>,

    /// 일괄 시작 중 실패가 나도 나머지를 계속 진행
    pub continue_on_error: bool,
}

impl Default for PluginManagerConfig {
    fn default() -> Self {
        Self {
            lifecycle_timeout: TimeoutConfig::default().lifecycle(),
            continue_on_error: true,
        }
    }
}

impl From<&HostConfig> for PluginManagerConfig {
    fn from(config: &HostConfig) -> Self {
        Self {
            lifecycle_timeout: config.timeouts.lifecycle(),
            continue_on_error: config.continue_on_error(),
        }
    }
}

// ============================================================================
// 보고서 / 조회 타입
// ============================================================================

/// `start_all` 결과
#[derive(Debug, Default)]
pub struct StartReport {
    /// 시작 순서대로
    pub started: Vec<String>,
    pub failed: Vec<(String, Error)>,
    /// 비활성화되어 건너뛴 플러그인
    pub skipped: Vec<String>,
    /// `continue_on_error = false`로 중단됨
    pub aborted: bool,
}

impl StartReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// `stop_all` 결과
#[derive(Debug, Default)]
pub struct TeardownReport {
    pub stopped: Vec<String>,
    pub destroyed: Vec<String>,
    /// 정리를 막지 않은 hook 에러
    pub errors: Vec<(String, Error)>,
}

/// 플러그인 상태 조회 결과
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInfo {
    pub name: String,
    pub source: String,
    pub state: LifecycleState,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// 검증된 설정 (로드 성공 시)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<ConfigMap>,
    pub tools: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

// ============================================================================
// 내부 레코드
// ============================================================================

/// 살아있는 인스턴스와 컨텍스트
#[derive(Clone)]
struct PluginRuntime {
    instance: Arc<dyn Plugin>,
    context: Arc<PluginContext>,
    manifest: PluginManifest,
    /// `on_stop`이 이미 실행됨 (복제본 간 공유)
    stop_hook_ran: Arc<AtomicBool>,
}

struct ManagedPlugin {
    descriptor: PluginDescriptor,
    state: StateCell,
    /// destroy 이후 또는 로드 실패 시 None
    runtime: Option<PluginRuntime>,
    last_error: Option<String>,
    load_seq: u64,
    start_seq: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
enum Hook {
    Init,
    Start,
    Stop,
    Destroy,
}

impl Hook {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Destroy => "destroy",
        }
    }
}

async fn call_hook(hook: Hook, instance: Arc<dyn Plugin>, context: Arc<PluginContext>) -> Result<()> {
    match hook {
        Hook::Init => instance.init(&context).await,
        Hook::Start => instance.on_start(&context).await,
        Hook::Stop => instance.on_stop(&context).await,
        Hook::Destroy => instance.on_destroy(&context).await,
    }
}

// ============================================================================
// PluginManager
// ============================================================================

/// 플러그인 매니저
pub struct PluginManager {
    plugins: RwLock<HashMap<String, ManagedPlugin>>,
    resolver: Arc<dyn PluginResolver>,
    tools: Arc<ToolRegistry>,
    events: Arc<EventBus>,
    config: PluginManagerConfig,
    load_counter: AtomicU64,
    start_counter: AtomicU64,
}

impl PluginManager {
    /// 새 매니저 생성 (새 레지스트리/버스)
    pub fn new(resolver: Arc<dyn PluginResolver>) -> Self {
        Self::with_parts(
            resolver,
            Arc::new(ToolRegistry::new()),
            Arc::new(EventBus::new()),
            PluginManagerConfig::default(),
        )
    }

    /// 기존 레지스트리/버스와 함께 생성
    pub fn with_parts(
        resolver: Arc<dyn PluginResolver>,
        tools: Arc<ToolRegistry>,
        events: Arc<EventBus>,
        config: PluginManagerConfig,
    ) -> Self {
        Self {
            plugins: RwLock::new(HashMap::new()),
            resolver,
            tools,
            events,
            config,
            load_counter: AtomicU64::new(0),
            start_counter: AtomicU64::new(0),
        }
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn config(&self) -> &PluginManagerConfig {
        &self.config
    }

    // ========================================================================
    // 로드
    // ========================================================================

    /// 플러그인 로드
    ///
    /// 실패한 경우에도 `failed` 상태의 레코드가 남으며, 같은 이름으로 다시 로드하려면
    /// 먼저 `unload` 해야 합니다.
    pub async fn load(&self, descriptor: PluginDescriptor) -> Result<()> {
        let name = descriptor.name.clone();
        if !is_valid_name(&name) {
            return Err(Error::load(
                &name,
                "plugin names must start with an alphanumeric character and may not contain ':'",
            ));
        }
        if self.plugins.read().await.contains_key(&name) {
            return Err(Error::load(&name, "a plugin with this name is already loaded"));
        }

        info!(plugin = %name, source = %descriptor.source, "Loading plugin");

        let state = StateCell::new();
        let outcome = self.instantiate(&descriptor, &state);

        let mut plugins = self.plugins.write().await;
        if plugins.contains_key(&name) {
            return Err(Error::load(&name, "a plugin with this name is already loaded"));
        }

        let mut record = ManagedPlugin {
            descriptor,
            state: state.clone(),
            runtime: None,
            last_error: None,
            load_seq: self.load_counter.fetch_add(1, Ordering::SeqCst),
            start_seq: None,
        };

        let result = match outcome {
            Ok(runtime) => {
                state.transition(&name, LifecycleState::Loaded)?;
                info!(
                    plugin = %name,
                    version = %runtime.manifest.version,
                    "Plugin loaded"
                );
                record.runtime = Some(runtime);
                Ok(())
            }
            Err(e) => {
                state.fail();
                error!(plugin = %name, error = %e, "Failed to load plugin");
                record.last_error = Some(e.to_string());
                Err(e)
            }
        };

        plugins.insert(name.clone(), record);
        drop(plugins);

        match &result {
            Ok(()) => self.notify(lifecycle::PLUGIN_LOADED, &name, None).await,
            Err(e) => self.notify(lifecycle::PLUGIN_FAILED, &name, Some(e)).await,
        }
        result
    }

    fn instantiate(&self, descriptor: &PluginDescriptor, state: &StateCell) -> Result<PluginRuntime> {
        let name = descriptor.name.as_str();

        let factory = self.resolver.resolve(&descriptor.source).ok_or_else(|| {
            Error::load(
                name,
                format!("no plugin found for source '{}'", descriptor.source),
            )
        })?;

        let instance = factory(&descriptor.raw_config).map_err(|e| match e {
            Error::Load { .. } | Error::Config { .. } => e,
            other => Error::load(name, other.to_string()),
        })?;

        let manifest = instance.manifest();
        let resolved = validate_config(name, &descriptor.raw_config, &instance.config_schema())?;
        debug!(plugin = %name, fields = resolved.len(), "Configuration validated");

        let context = PluginContext::new(
            name,
            resolved,
            ToolScope::new(name, self.tools.clone(), state.clone()),
            PluginEvents::new(name, self.events.clone(), state.clone()),
            state.clone(),
        );

        Ok(PluginRuntime {
            instance,
            context: Arc::new(context),
            manifest,
            stop_hook_ran: Arc::new(AtomicBool::new(false)),
        })
    }

    // ========================================================================
    // 개별 라이프사이클
    // ========================================================================

    /// `loaded → initializing → initialized`
    ///
    /// 실패하면 그 사이 등록된 Tool/구독을 모두 해제하고 `failed`로 전환합니다.
    pub async fn initialize(&self, name: &str) -> Result<()> {
        let (state, runtime) = self.lookup(name).await?;
        let runtime = require_runtime(name, runtime)?;

        state.transition(name, LifecycleState::Initializing)?;
        debug!(plugin = %name, "Initializing plugin");

        match self.run_hook(name, Hook::Init, &runtime).await {
            Ok(()) => {
                state.transition(name, LifecycleState::Initialized)?;
                info!(
                    plugin = %name,
                    tools = runtime.context.tools().registered().await.len(),
                    subscriptions = runtime.context.events().subscription_count().await,
                    "Plugin initialized"
                );
                Ok(())
            }
            Err(e) => {
                self.mark_failed(name, &state, &runtime, &e).await;
                Err(e)
            }
        }
    }

    /// `initialized → starting → started`
    pub async fn start(&self, name: &str) -> Result<()> {
        let (state, runtime) = self.lookup(name).await?;
        let runtime = require_runtime(name, runtime)?;

        state.transition(name, LifecycleState::Starting)?;
        debug!(plugin = %name, "Starting plugin");

        match self.run_hook(name, Hook::Start, &runtime).await {
            Ok(()) => {
                state.transition(name, LifecycleState::Started)?;
                let seq = self.start_counter.fetch_add(1, Ordering::SeqCst);
                if let Some(record) = self.plugins.write().await.get_mut(name) {
                    record.start_seq = Some(seq);
                }
                info!(plugin = %name, "Plugin started");
                self.notify(lifecycle::PLUGIN_STARTED, name, None).await;
                Ok(())
            }
            Err(e) => {
                self.mark_failed(name, &state, &runtime, &e).await;
                Err(e)
            }
        }
    }

    /// 플러그인 중지
    ///
    /// hook 에러는 기록 후 무시하며, Tool/구독 해제는 항상 수행됩니다.
    /// 이미 중지되었거나 시작된 적 없는 플러그인은 변경 없이 성공합니다.
    pub async fn stop(&self, name: &str) -> Result<()> {
        self.stop_inner(name).await.map(|_| ())
    }

    /// 플러그인 정리 (`started`면 먼저 중지)
    ///
    /// hook 에러는 기록 후 무시합니다. 반복 호출해도 안전합니다.
    pub async fn destroy(&self, name: &str) -> Result<()> {
        self.destroy_inner(name).await.map(|_| ())
    }

    /// 정리 후 레코드 제거
    pub async fn unload(&self, name: &str) -> Result<()> {
        self.destroy_inner(name).await?;
        self.plugins.write().await.remove(name);
        info!(plugin = %name, "Plugin unloaded");
        Ok(())
    }

    /// 반환값: 정리를 막지 않은 hook 에러
    async fn stop_inner(&self, name: &str) -> Result<Option<Error>> {
        let (state, runtime) = self.lookup(name).await?;
        let Some(runtime) = runtime else {
            debug!(plugin = %name, "No live instance, nothing to stop");
            return Ok(None);
        };

        let current = state.get();
        match current {
            LifecycleState::Started | LifecycleState::Initialized => {
                state.transition(name, LifecycleState::Stopping)?;
                debug!(plugin = %name, "Stopping plugin");
                runtime.stop_hook_ran.store(true, Ordering::SeqCst);

                let hook_error = self.run_hook(name, Hook::Stop, &runtime).await.err();
                if let Some(ref e) = hook_error {
                    warn!(plugin = %name, error = %e, "on_stop failed, continuing teardown");
                    self.record_error(name, e).await;
                }
                self.release(name, &runtime).await;

                state.transition(name, LifecycleState::Stopped)?;
                info!(plugin = %name, "Plugin stopped");
                self.notify(lifecycle::PLUGIN_STOPPED, name, hook_error.as_ref())
                    .await;
                Ok(hook_error)
            }
            LifecycleState::Failed => {
                if runtime.stop_hook_ran.swap(true, Ordering::SeqCst) {
                    debug!(plugin = %name, "on_stop already ran for failed plugin");
                    return Ok(None);
                }
                let hook_error = self.run_hook(name, Hook::Stop, &runtime).await.err();
                if let Some(ref e) = hook_error {
                    warn!(plugin = %name, error = %e, "on_stop failed for failed plugin");
                }
                self.release(name, &runtime).await;
                Ok(hook_error)
            }
            s if s.is_transient() => Err(Error::invalid_state(
                name,
                format!("cannot stop while {}", s),
            )),
            _ => Ok(None),
        }
    }

    async fn destroy_inner(&self, name: &str) -> Result<Vec<Error>> {
        let mut errors = Vec::new();

        let (state, _) = self.lookup(name).await?;
        if matches!(
            state.get(),
            LifecycleState::Started | LifecycleState::Initialized
        ) {
            errors.extend(self.stop_inner(name).await?);
        }

        let (_, runtime) = self.lookup(name).await?;
        let Some(runtime) = runtime else {
            return Ok(errors);
        };

        let current = state.get();
        match current {
            LifecycleState::Loaded | LifecycleState::Stopped => {
                state.transition(name, LifecycleState::Destroying)?;
                debug!(plugin = %name, "Destroying plugin");

                if let Err(e) = self.run_hook(name, Hook::Destroy, &runtime).await {
                    warn!(plugin = %name, error = %e, "on_destroy failed, continuing teardown");
                    self.record_error(name, &e).await;
                    errors.push(e);
                }
                // 등록 창을 먼저 닫은 뒤 해제
                state.transition(name, LifecycleState::Destroyed)?;
                self.release(name, &runtime).await;
                self.drop_runtime(name).await;
                info!(plugin = %name, "Plugin destroyed");
            }
            LifecycleState::Failed => {
                if let Err(e) = self.run_hook(name, Hook::Destroy, &runtime).await {
                    warn!(plugin = %name, error = %e, "on_destroy failed for failed plugin");
                    errors.push(e);
                }
                self.release(name, &runtime).await;
                self.drop_runtime(name).await;
            }
            s if s.is_transient() => {
                return Err(Error::invalid_state(
                    name,
                    format!("cannot destroy while {}", s),
                ));
            }
            _ => {}
        }

        Ok(errors)
    }

    // ========================================================================
    // 일괄 처리
    // ========================================================================

    /// `loaded` 상태의 활성 플러그인을 의존성 순서로 초기화/시작
    ///
    /// 순환 의존성이 있으면 아무것도 시작하지 않고 `DependencyCycle`을 반환합니다.
    /// 의존성이 실행 중이 아닌 플러그인은 시작하지 않고 `failed`로 전환합니다.
    pub async fn start_all(&self) -> Result<StartReport> {
        let mut report = StartReport::default();

        let nodes: Vec<(String, Vec<String>)> = {
            let plugins = self.plugins.read().await;
            let mut records: Vec<(&String, &ManagedPlugin)> = plugins.iter().collect();
            records.sort_by_key(|(_, r)| r.load_seq);

            let mut nodes = Vec::new();
            for (name, record) in records {
                if record.state.get() != LifecycleState::Loaded {
                    continue;
                }
                if !record.descriptor.enabled {
                    debug!(plugin = %name, "Plugin disabled, skipping");
                    report.skipped.push(name.clone());
                    continue;
                }

                let mut deps = record.descriptor.depends_on.clone();
                if let Some(ref runtime) = record.runtime {
                    for dep in runtime.manifest.required_dependencies() {
                        if !deps.iter().any(|d| d == dep) {
                            deps.push(dep.to_string());
                        }
                    }
                }
                nodes.push((name.clone(), deps));
            }
            nodes
        };

        let plan = resolve_start_order(&nodes)?;
        for (plugin, dep) in &plan.external {
            debug!(plugin = %plugin, dependency = %dep, "Dependency outside this batch");
        }
        let deps_of: HashMap<&str, &[String]> = nodes
            .iter()
            .map(|(name, deps)| (name.as_str(), deps.as_slice()))
            .collect();

        for name in &plan.order {
            let deps = deps_of.get(name.as_str()).copied().unwrap_or(&[]);

            let result = match self.unavailable_dependency(deps).await {
                Some(missing) => {
                    let e = Error::load(
                        name,
                        format!("dependency '{}' is not running", missing),
                    );
                    if let Ok((state, Some(runtime))) = self.lookup(name).await {
                        self.mark_failed(name, &state, &runtime, &e).await;
                    }
                    Err(e)
                }
                None => self.bring_up(name).await,
            };

            match result {
                Ok(()) => report.started.push(name.clone()),
                Err(e) => {
                    report.failed.push((name.clone(), e));
                    if !self.config.continue_on_error {
                        warn!(plugin = %name, "Aborting start_all after failure");
                        report.aborted = true;
                        break;
                    }
                }
            }
        }

        info!(
            started = report.started.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "Plugin startup complete"
        );
        Ok(report)
    }

    /// 시작 역순으로 중지 후 정리
    pub async fn stop_all(&self) -> TeardownReport {
        let mut report = TeardownReport::default();
        let order = self.teardown_order().await;

        for name in &order {
            let before = self.state(name).await;
            match self.stop_inner(name).await {
                Ok(hook_error) => {
                    if matches!(
                        before,
                        Some(LifecycleState::Started | LifecycleState::Initialized)
                    ) {
                        report.stopped.push(name.clone());
                    }
                    if let Some(e) = hook_error {
                        report.errors.push((name.clone(), e));
                    }
                }
                Err(e) => report.errors.push((name.clone(), e)),
            }
        }

        for name in &order {
            let before = self.state(name).await;
            match self.destroy_inner(name).await {
                Ok(errors) => {
                    if matches!(
                        before,
                        Some(LifecycleState::Loaded | LifecycleState::Stopped)
                    ) {
                        report.destroyed.push(name.clone());
                    }
                    report
                        .errors
                        .extend(errors.into_iter().map(|e| (name.clone(), e)));
                }
                Err(e) => report.errors.push((name.clone(), e)),
            }
        }

        info!(
            stopped = report.stopped.len(),
            destroyed = report.destroyed.len(),
            errors = report.errors.len(),
            "Plugin teardown complete"
        );
        report
    }

    async fn bring_up(&self, name: &str) -> Result<()> {
        self.initialize(name).await?;
        self.start(name).await
    }

    async fn unavailable_dependency(&self, deps: &[String]) -> Option<String> {
        let plugins = self.plugins.read().await;
        deps.iter()
            .find(|dep| {
                plugins
                    .get(dep.as_str())
                    .map_or(true, |r| r.state.get() != LifecycleState::Started)
            })
            .cloned()
    }

    /// 시작된 플러그인은 시작 역순, 나머지는 로드 역순
    async fn teardown_order(&self) -> Vec<String> {
        let plugins = self.plugins.read().await;
        let mut records: Vec<(&String, &ManagedPlugin)> = plugins.iter().collect();
        records.sort_by(|(_, a), (_, b)| {
            b.start_seq
                .cmp(&a.start_seq)
                .then(b.load_seq.cmp(&a.load_seq))
        });
        records.into_iter().map(|(name, _)| name.clone()).collect()
    }

    // ========================================================================
    // 조회
    // ========================================================================

    /// `started` 상태의 플러그인 인스턴스
    pub async fn get_instance(&self, name: &str) -> Result<Arc<dyn Plugin>> {
        let plugins = self.plugins.read().await;
        let record = plugins
            .get(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        let state = record.state.get();
        match (&record.runtime, state) {
            (Some(runtime), LifecycleState::Started) => Ok(runtime.instance.clone()),
            _ => Err(Error::NotReady {
                plugin: name.to_string(),
                state: state.to_string(),
            }),
        }
    }

    pub async fn state(&self, name: &str) -> Option<LifecycleState> {
        self.plugins.read().await.get(name).map(|r| r.state.get())
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.plugins.read().await.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.plugins.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.plugins.read().await.is_empty()
    }

    pub async fn info(&self, name: &str) -> Option<PluginInfo> {
        let snapshot = {
            let plugins = self.plugins.read().await;
            plugins.get(name).map(RecordSnapshot::from)?
        };
        Some(snapshot.into_info(&self.tools).await)
    }

    /// 로드 순서대로 모든 플러그인 정보
    pub async fn list(&self) -> Vec<PluginInfo> {
        let snapshots: Vec<RecordSnapshot> = {
            let plugins = self.plugins.read().await;
            let mut records: Vec<&ManagedPlugin> = plugins.values().collect();
            records.sort_by_key(|r| r.load_seq);
            records.into_iter().map(RecordSnapshot::from).collect()
        };

        let mut infos = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            infos.push(snapshot.into_info(&self.tools).await);
        }
        infos
    }

    // ========================================================================
    // 내부 헬퍼
    // ========================================================================

    async fn lookup(&self, name: &str) -> Result<(StateCell, Option<PluginRuntime>)> {
        let plugins = self.plugins.read().await;
        let record = plugins
            .get(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        Ok((record.state.clone(), record.runtime.clone()))
    }

    /// hook을 별도 task로 실행하고 마감까지 대기
    async fn run_hook(&self, name: &str, hook: Hook, runtime: &PluginRuntime) -> Result<()> {
        let operation = format!("{}.{}", name, hook.as_str());
        let task = tokio::spawn(call_hook(
            hook,
            runtime.instance.clone(),
            runtime.context.clone(),
        ));

        let joined = with_deadline(&operation, self.config.lifecycle_timeout, async {
            Ok(task.await)
        })
        .await;

        match joined {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(Error::Plugin(format!(
                "{} hook panicked: {}",
                operation, join_error
            ))),
            Err(timeout) => {
                warn!(
                    plugin = %name,
                    hook = hook.as_str(),
                    "Lifecycle hook exceeded its deadline and was left running"
                );
                Err(timeout)
            }
        }
    }

    /// 실패 처리: 상태 전환 + 등록 롤백 + 알림
    async fn mark_failed(&self, name: &str, state: &StateCell, runtime: &PluginRuntime, e: &Error) {
        state.fail();
        let (tools, subscriptions) = self.release(name, runtime).await;
        error!(
            plugin = %name,
            error = %e,
            tools_removed = tools,
            subscriptions_removed = subscriptions,
            "Plugin failed"
        );
        self.record_error(name, e).await;
        self.notify(lifecycle::PLUGIN_FAILED, name, Some(e)).await;
    }

    async fn release(&self, name: &str, runtime: &PluginRuntime) -> (usize, usize) {
        let tools = runtime.context.tools().clear().await;
        let subscriptions = runtime.context.events().clear().await;
        if tools + subscriptions > 0 {
            debug!(plugin = %name, tools, subscriptions, "Released plugin registrations");
        }
        (tools, subscriptions)
    }

    async fn record_error(&self, name: &str, e: &Error) {
        if let Some(record) = self.plugins.write().await.get_mut(name) {
            record.last_error = Some(e.to_string());
        }
    }

    async fn drop_runtime(&self, name: &str) {
        if let Some(record) = self.plugins.write().await.get_mut(name) {
            record.runtime = None;
        }
    }

    /// 라이프사이클 알림 발행 (핸들러 실패는 로그만)
    async fn notify(&self, event: &str, name: &str, error: Option<&Error>) {
        let mut payload = Payload::new();
        payload.insert("plugin".into(), json!(name));
        if let Some(state) = self.state(name).await {
            payload.insert("state".into(), json!(state.as_str()));
        }
        if let Some(e) = error {
            payload.insert("error".into(), json!(e.to_string()));
        }

        let outcome = self.events.publish(event, payload).await;
        for failure in &outcome.failures {
            warn!(
                event = %event,
                handler = %failure.plugin,
                error = %failure.error,
                "Lifecycle notification handler failed"
            );
        }
    }
}

fn require_runtime(name: &str, runtime: Option<PluginRuntime>) -> Result<PluginRuntime> {
    runtime.ok_or_else(|| Error::invalid_state(name, "plugin has no live instance"))
}

/// 잠금 밖에서 `PluginInfo`를 만들기 위한 복사본
struct RecordSnapshot {
    descriptor: PluginDescriptor,
    state: LifecycleState,
    runtime: Option<PluginRuntime>,
    last_error: Option<String>,
}

impl From<&ManagedPlugin> for RecordSnapshot {
    fn from(record: &ManagedPlugin) -> Self {
        Self {
            descriptor: record.descriptor.clone(),
            state: record.state.get(),
            runtime: record.runtime.clone(),
            last_error: record.last_error.clone(),
        }
    }
}

impl RecordSnapshot {
    async fn into_info(self, tools: &ToolRegistry) -> PluginInfo {
        let (version, config) = match self.runtime {
            Some(ref runtime) => (
                Some(runtime.manifest.version.to_string()),
                Some(runtime.context.config().await),
            ),
            None => (None, None),
        };

        PluginInfo {
            tools: tools.names_for(&self.descriptor.name).await,
            name: self.descriptor.name,
            source: self.descriptor.source,
            state: self.state,
            enabled: self.descriptor.enabled,
            version,
            depends_on: self.descriptor.depends_on,
            config,
            last_error: self.last_error,
        }
    }
}

// ============================================================================
// 테스트
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{PluginManifest, StaticResolver};
    use crate::tool::{tool_fn, ToolSpec};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use plughost_foundation::{handler_fn, FieldRule, ValidationSchema};
    use std::any::Any;

    type CallLog = Arc<Mutex<Vec<String>>>;

    #[derive(Clone, Copy, Default)]
    struct Faults {
        init: bool,
        start: bool,
        stop: bool,
        hang_init: bool,
        /// 실패 처리 이후에도 계속 등록을 시도
        flood_init: bool,
    }

    struct Probe {
        name: String,
        log: CallLog,
        faults: Faults,
    }

    impl Probe {
        fn record(&self, hook: &str) {
            self.log.lock().push(format!("{}.{}", self.name, hook));
        }
    }

    #[async_trait]
    impl Plugin for Probe {
        fn manifest(&self) -> PluginManifest {
            PluginManifest::new(&self.name)
        }

        fn config_schema(&self) -> ValidationSchema {
            ValidationSchema::new().field("level", FieldRule::integer().default_value(json!(1)).range(0.0, 5.0))
        }

        async fn init(&self, ctx: &PluginContext) -> Result<()> {
            self.record("init");
            ctx.tools()
                .register(ToolSpec::new("ping", tool_fn(|_| async { Ok(json!("pong")) })))
                .await?;
            ctx.events()
                .on("request_output:start", handler_fn(|_, _| async { Ok(None) }))
                .await?;
            if self.faults.flood_init {
                for i in 0u64.. {
                    ctx.tools()
                        .register(ToolSpec::new(
                            format!("extra{}", i),
                            tool_fn(|_| async { Ok(json!(null)) }),
                        ))
                        .await?;
                    ctx.events()
                        .on("tick", handler_fn(|_, _| async { Ok(None) }))
                        .await?;
                    tokio::task::yield_now().await;
                }
            }
            if self.faults.hang_init {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            if self.faults.init {
                return Err(Error::Plugin("init exploded".into()));
            }
            Ok(())
        }

        async fn on_start(&self, _ctx: &PluginContext) -> Result<()> {
            self.record("start");
            if self.faults.start {
                return Err(Error::Plugin("start exploded".into()));
            }
            Ok(())
        }

        async fn on_stop(&self, _ctx: &PluginContext) -> Result<()> {
            self.record("stop");
            if self.faults.stop {
                return Err(Error::Plugin("stop exploded".into()));
            }
            Ok(())
        }

        async fn on_destroy(&self, _ctx: &PluginContext) -> Result<()> {
            self.record("destroy");
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn probe_source(resolver: &mut StaticResolver, source: &str, log: &CallLog, faults: Faults) {
        let log = log.clone();
        let source_name = source.to_string();
        resolver.register(source, move |_| {
            Ok(Arc::new(Probe {
                name: source_name.clone(),
                log: log.clone(),
                faults,
            }) as Arc<dyn Plugin>)
        });
    }

    fn manager_with(sources: &[(&str, Faults)], config: PluginManagerConfig) -> (PluginManager, CallLog) {
        let log: CallLog = Arc::new(Mutex::new(Vec::new()));
        let mut resolver = StaticResolver::new();
        for (source, faults) in sources {
            probe_source(&mut resolver, source, &log, *faults);
        }
        let manager = PluginManager::with_parts(
            Arc::new(resolver),
            Arc::new(ToolRegistry::new()),
            Arc::new(EventBus::new()),
            config,
        );
        (manager, log)
    }

    #[tokio::test]
    async fn test_load_unknown_source() {
        let (manager, _) = manager_with(&[], PluginManagerConfig::default());
        let err = manager
            .load(PluginDescriptor::new("ghost", "nowhere"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Load { ref plugin, .. } if plugin == "ghost"));
        assert_eq!(manager.state("ghost").await, Some(LifecycleState::Failed));
    }

    #[tokio::test]
    async fn test_load_rejects_duplicate_and_bad_names() {
        let (manager, _) = manager_with(&[("p", Faults::default())], PluginManagerConfig::default());
        manager.load(PluginDescriptor::new("a", "p")).await.unwrap();

        assert!(matches!(
            manager.load(PluginDescriptor::new("a", "p")).await,
            Err(Error::Load { .. })
        ));
        assert!(matches!(
            manager.load(PluginDescriptor::new("a:b", "p")).await,
            Err(Error::Load { .. })
        ));
        assert_eq!(manager.len().await, 1);
    }

    #[tokio::test]
    async fn test_load_validates_config() {
        let (manager, _) = manager_with(&[("p", Faults::default())], PluginManagerConfig::default());

        let err = manager
            .load(PluginDescriptor::new("bad", "p").with_setting("level", json!(9)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config { ref field, .. } if field == "level"));
        assert_eq!(manager.state("bad").await, Some(LifecycleState::Failed));

        manager.load(PluginDescriptor::new("good", "p")).await.unwrap();
        let info = manager.info("good").await.unwrap();
        assert_eq!(info.config.unwrap()["level"], 1);
    }

    #[tokio::test]
    async fn test_init_failure_rolls_back_registrations() {
        let faults = Faults {
            init: true,
            ..Faults::default()
        };
        let (manager, _) = manager_with(&[("p", faults)], PluginManagerConfig::default());
        manager.load(PluginDescriptor::new("p", "p")).await.unwrap();

        let err = manager.initialize("p").await.unwrap_err();
        assert!(matches!(err, Error::Plugin(_)));
        assert_eq!(manager.state("p").await, Some(LifecycleState::Failed));
        assert!(!manager.tools().contains("plugin:p:ping").await);
        assert_eq!(manager.events().plugin_subscription_count("p").await, 0);
        assert!(manager.info("p").await.unwrap().last_error.is_some());
    }

    #[tokio::test]
    async fn test_init_timeout_fails_plugin() {
        let faults = Faults {
            hang_init: true,
            ..Faults::default()
        };
        let config = PluginManagerConfig {
            lifecycle_timeout: Some(Duration::from_millis(50)),
            continue_on_error: true,
        };
        let (manager, _) = manager_with(&[("p", faults)], config);
        manager.load(PluginDescriptor::new("p", "p")).await.unwrap();

        let err = manager.initialize("p").await.unwrap_err();
        assert!(matches!(err, Error::Timeout { millis: 50, .. }));
        assert_eq!(manager.state("p").await, Some(LifecycleState::Failed));
        assert!(manager.tools().is_empty().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_timed_out_init_leaves_no_registrations() {
        let faults = Faults {
            flood_init: true,
            ..Faults::default()
        };
        let config = PluginManagerConfig {
            lifecycle_timeout: Some(Duration::from_millis(5)),
            continue_on_error: true,
        };
        let (manager, _) = manager_with(&[("p", faults)], config);

        for _ in 0..50 {
            manager.load(PluginDescriptor::new("p", "p")).await.unwrap();
            let err = manager.initialize("p").await.unwrap_err();
            assert!(matches!(err, Error::Timeout { millis: 5, .. }));

            // 백그라운드 init task가 등록을 계속 시도할 시간
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert!(manager.tools().is_empty().await);
            assert!(manager.tools().schemas().await.is_empty());
            assert_eq!(manager.events().plugin_subscription_count("p").await, 0);

            manager.unload("p").await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_concurrent_initialize_rejected() {
        let (manager, _) = manager_with(&[("p", Faults::default())], PluginManagerConfig::default());
        manager.load(PluginDescriptor::new("p", "p")).await.unwrap();
        manager.initialize("p").await.unwrap();

        let err = manager.initialize("p").await.unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
        assert_eq!(manager.state("p").await, Some(LifecycleState::Initialized));
    }

    #[tokio::test]
    async fn test_get_instance_requires_started() {
        let (manager, _) = manager_with(&[("p", Faults::default())], PluginManagerConfig::default());
        assert!(matches!(
            manager.get_instance("p").await,
            Err(Error::NotFound(_))
        ));

        manager.load(PluginDescriptor::new("p", "p")).await.unwrap();
        assert!(matches!(
            manager.get_instance("p").await,
            Err(Error::NotReady { ref state, .. }) if state == "loaded"
        ));

        manager.initialize("p").await.unwrap();
        manager.start("p").await.unwrap();
        let instance = manager.get_instance("p").await.unwrap();
        assert_eq!(instance.manifest().name, "p");
    }

    #[tokio::test]
    async fn test_start_all_dependency_order() {
        let (manager, log) = manager_with(
            &[("a", Faults::default()), ("b", Faults::default())],
            PluginManagerConfig::default(),
        );
        manager
            .load(PluginDescriptor::new("a", "a").depends_on("b"))
            .await
            .unwrap();
        manager.load(PluginDescriptor::new("b", "b")).await.unwrap();

        let report = manager.start_all().await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.started, vec!["b", "a"]);
        assert_eq!(
            log.lock().clone(),
            vec!["b.init", "b.start", "a.init", "a.start"]
        );
    }

    #[tokio::test]
    async fn test_start_all_fails_dependents_of_failed_plugin() {
        let broken = Faults {
            start: true,
            ..Faults::default()
        };
        let (manager, _) = manager_with(
            &[("base", broken), ("top", Faults::default()), ("other", Faults::default())],
            PluginManagerConfig::default(),
        );
        manager.load(PluginDescriptor::new("base", "base")).await.unwrap();
        manager
            .load(PluginDescriptor::new("top", "top").depends_on("base"))
            .await
            .unwrap();
        manager.load(PluginDescriptor::new("other", "other")).await.unwrap();

        let report = manager.start_all().await.unwrap();
        assert_eq!(report.started, vec!["other"]);
        let failed: Vec<&str> = report.failed.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(failed, vec!["base", "top"]);
        assert_eq!(manager.state("top").await, Some(LifecycleState::Failed));
    }

    #[tokio::test]
    async fn test_start_all_aborts_without_continue_on_error() {
        let broken = Faults {
            init: true,
            ..Faults::default()
        };
        let config = PluginManagerConfig {
            continue_on_error: false,
            ..PluginManagerConfig::default()
        };
        let (manager, _) = manager_with(&[("x", broken), ("y", Faults::default())], config);
        manager.load(PluginDescriptor::new("x", "x")).await.unwrap();
        manager.load(PluginDescriptor::new("y", "y")).await.unwrap();

        let report = manager.start_all().await.unwrap();
        assert!(report.aborted);
        assert!(report.started.is_empty());
        assert_eq!(manager.state("y").await, Some(LifecycleState::Loaded));
    }

    #[tokio::test]
    async fn test_start_all_cycle_starts_nothing() {
        let (manager, log) = manager_with(
            &[("a", Faults::default()), ("b", Faults::default())],
            PluginManagerConfig::default(),
        );
        manager
            .load(PluginDescriptor::new("a", "a").depends_on("b"))
            .await
            .unwrap();
        manager
            .load(PluginDescriptor::new("b", "b").depends_on("a"))
            .await
            .unwrap();

        let err = manager.start_all().await.unwrap_err();
        assert!(matches!(err, Error::DependencyCycle(_)));
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_plugins_skipped() {
        let (manager, _) = manager_with(&[("p", Faults::default())], PluginManagerConfig::default());
        manager
            .load(PluginDescriptor::new("p", "p").disabled())
            .await
            .unwrap();

        let report = manager.start_all().await.unwrap();
        assert_eq!(report.skipped, vec!["p"]);
        assert_eq!(manager.state("p").await, Some(LifecycleState::Loaded));
    }

    #[tokio::test]
    async fn test_stop_error_does_not_block_destroy() {
        let faults = Faults {
            stop: true,
            ..Faults::default()
        };
        let (manager, log) = manager_with(&[("p", faults)], PluginManagerConfig::default());
        manager.load(PluginDescriptor::new("p", "p")).await.unwrap();
        manager.start_all().await.unwrap();

        manager.stop("p").await.unwrap();
        assert_eq!(manager.state("p").await, Some(LifecycleState::Stopped));
        assert!(!manager.tools().contains("plugin:p:ping").await);

        manager.destroy("p").await.unwrap();
        assert_eq!(manager.state("p").await, Some(LifecycleState::Destroyed));
        assert!(log.lock().contains(&"p.destroy".to_string()));

        // 반복 호출은 변경 없음
        manager.stop("p").await.unwrap();
        manager.destroy("p").await.unwrap();
        assert_eq!(manager.state("p").await, Some(LifecycleState::Destroyed));
    }

    #[tokio::test]
    async fn test_stop_hook_runs_once_for_failed_plugin() {
        let faults = Faults {
            start: true,
            ..Faults::default()
        };
        let (manager, log) = manager_with(&[("p", faults)], PluginManagerConfig::default());
        manager.load(PluginDescriptor::new("p", "p")).await.unwrap();
        let report = manager.start_all().await.unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(manager.state("p").await, Some(LifecycleState::Failed));

        manager.stop("p").await.unwrap();
        manager.stop("p").await.unwrap();
        manager.destroy("p").await.unwrap();

        let log = log.lock();
        assert_eq!(log.iter().filter(|e| e.as_str() == "p.stop").count(), 1);
        assert!(log.contains(&"p.destroy".to_string()));
    }

    #[tokio::test]
    async fn test_stop_all_reverse_start_order() {
        let (manager, log) = manager_with(
            &[("a", Faults::default()), ("b", Faults::default())],
            PluginManagerConfig::default(),
        );
        manager
            .load(PluginDescriptor::new("a", "a").depends_on("b"))
            .await
            .unwrap();
        manager.load(PluginDescriptor::new("b", "b")).await.unwrap();
        manager.start_all().await.unwrap();
        log.lock().clear();

        let report = manager.stop_all().await;
        assert_eq!(report.stopped, vec!["a", "b"]);
        assert_eq!(report.destroyed, vec!["a", "b"]);
        assert!(report.errors.is_empty());
        assert_eq!(
            log.lock().clone(),
            vec!["a.stop", "b.stop", "a.destroy", "b.destroy"]
        );
    }

    #[tokio::test]
    async fn test_lifecycle_notifications() {
        let (manager, _) = manager_with(&[("p", Faults::default())], PluginManagerConfig::default());
        manager.load(PluginDescriptor::new("p", "p")).await.unwrap();
        manager.start_all().await.unwrap();

        let events: Vec<String> = manager
            .events()
            .history(None)
            .await
            .into_iter()
            .map(|r| r.event)
            .collect();
        assert!(events.contains(&"plugin:loaded".to_string()));
        assert!(events.contains(&"plugin:started".to_string()));
    }

    #[tokio::test]
    async fn test_unload_removes_record() {
        let (manager, _) = manager_with(&[("p", Faults::default())], PluginManagerConfig::default());
        manager.load(PluginDescriptor::new("p", "p")).await.unwrap();
        manager.start_all().await.unwrap();

        manager.unload("p").await.unwrap();
        assert!(!manager.contains("p").await);
        assert!(manager.tools().is_empty().await);

        // 같은 이름으로 다시 로드 가능
        manager.load(PluginDescriptor::new("p", "p")).await.unwrap();
    }
}
