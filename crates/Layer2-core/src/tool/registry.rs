//! Tool Registry - 플러그인 Tool 등록 및 호출
//!
//! 모든 플러그인이 제공하는 Tool을 `plugin:<plugin>:<tool>` 이름으로 관리합니다.
//!
//! ## 기능
//! - 원자적 등록 (중복 이름 거부)
//! - 파라미터 검증 후 호출, 소유 플러그인이 `started`일 때만 실행
//! - 카테고리 필터 목록 (스냅샷)
//! - 플러그인 단위 일괄 해제
//!
//! ```ignore
//! let result = registry
//!     .invoke("plugin:memory:recall", json!({"conversationId": "c1"}))
//!     .await?;
//! ```

use super::descriptor::{is_valid_name, qualified_name, ToolDescriptor, ToolSpec};
use crate::plugin::{LifecycleState, StateCell};
use plughost_foundation::{validate_params, with_deadline, ConfigMap, Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Tool 레지스트리
pub struct ToolRegistry {
    tools: RwLock<BTreeMap<String, ToolDescriptor>>,

    /// 기본 호출 마감 (None이면 제한 없음)
    default_timeout: Option<Duration>,

    invocations: AtomicU64,
}

impl ToolRegistry {
    /// 빈 레지스트리 생성
    pub fn new() -> Self {
        Self::with_timeout(None)
    }

    /// 기본 호출 마감을 지정하여 생성
    pub fn with_timeout(default_timeout: Option<Duration>) -> Self {
        Self {
            tools: RwLock::new(BTreeMap::new()),
            default_timeout,
            invocations: AtomicU64::new(0),
        }
    }

    // ========================================================================
    // 등록
    // ========================================================================

    /// Tool 등록 (검사와 삽입이 하나의 쓰기 잠금 안에서 수행됨)
    pub(crate) async fn register(
        &self,
        plugin: &str,
        spec: ToolSpec,
        owner_state: StateCell,
    ) -> Result<String> {
        if !is_valid_name(&spec.name) {
            return Err(Error::InvalidInput(format!(
                "invalid tool name '{}' from plugin '{}'",
                spec.name, plugin
            )));
        }

        let qualified = qualified_name(plugin, &spec.name);
        let mut tools = self.tools.write().await;

        // 상태 확인과 삽입은 같은 잠금 안에서 (fail 이후 unregister_all 뒤에 남는 Tool 없음)
        let current = owner_state.get();
        if !current.accepts_registrations() {
            debug!(tool = %qualified, state = %current, "Rejected late tool registration");
            return Err(Error::invalid_state(
                plugin,
                format!("cannot register tools while {}", current),
            ));
        }

        if tools.contains_key(&qualified) {
            warn!(tool = %qualified, "Rejected duplicate tool registration");
            return Err(Error::DuplicateTool(qualified));
        }

        tools.insert(
            qualified.clone(),
            ToolDescriptor::from_spec(plugin, spec, owner_state),
        );
        debug!(tool = %qualified, "Registered tool");
        Ok(qualified)
    }

    /// 플러그인의 모든 Tool 해제 (없으면 0)
    pub(crate) async fn unregister_all(&self, plugin: &str) -> usize {
        let mut tools = self.tools.write().await;
        let before = tools.len();
        tools.retain(|_, descriptor| descriptor.plugin != plugin);
        let removed = before - tools.len();

        if removed > 0 {
            info!(plugin = %plugin, count = removed, "Unregistered plugin tools");
        }
        removed
    }

    // ========================================================================
    // 조회
    // ========================================================================

    pub async fn get(&self, qualified: &str) -> Option<ToolDescriptor> {
        self.tools.read().await.get(qualified).cloned()
    }

    pub async fn contains(&self, qualified: &str) -> bool {
        self.tools.read().await.contains_key(qualified)
    }

    pub async fn len(&self) -> usize {
        self.tools.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tools.read().await.is_empty()
    }

    /// 플러그인이 소유한 Tool 이름
    pub async fn names_for(&self, plugin: &str) -> Vec<String> {
        self.tools
            .read()
            .await
            .values()
            .filter(|d| d.plugin == plugin)
            .map(|d| d.qualified_name.clone())
            .collect()
    }

    /// Tool 목록 스냅샷 (이름 순)
    ///
    /// 이후의 등록/해제는 반환된 목록에 반영되지 않습니다.
    pub async fn list(&self, category: Option<&str>) -> ToolListing {
        let tools = self.tools.read().await.values().cloned().collect();
        ToolListing {
            tools,
            category: category.map(str::to_string),
        }
    }

    /// JSON Schema 형식으로 모든 Tool 정보 반환
    pub async fn schemas(&self) -> Vec<Value> {
        self.tools
            .read()
            .await
            .values()
            .map(ToolDescriptor::schema)
            .collect()
    }

    /// 누적 호출 횟수
    pub fn invocation_count(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }

    // ========================================================================
    // 호출
    // ========================================================================

    /// Tool 호출 (기본 마감 적용)
    pub async fn invoke(&self, qualified: &str, args: Value) -> Result<Value> {
        self.invoke_with_timeout(qualified, args, self.default_timeout)
            .await
    }

    /// Tool 호출
    ///
    /// 1. 이름 조회 → `ToolNotFound`
    /// 2. 소유 플러그인 상태 확인 → `NotReady`
    /// 3. 파라미터 검증 → `Validation`
    /// 4. 핸들러 실행 → 실패 시 `ToolExecution`, 마감 초과 시 `Timeout`
    pub async fn invoke_with_timeout(
        &self,
        qualified: &str,
        args: Value,
        deadline: Option<Duration>,
    ) -> Result<Value> {
        // 잠금은 조회 동안만 유지
        let descriptor = self
            .get(qualified)
            .await
            .ok_or_else(|| Error::ToolNotFound(qualified.to_string()))?;

        let owner_state = descriptor.owner_state.get();
        if owner_state != LifecycleState::Started {
            return Err(Error::NotReady {
                plugin: descriptor.plugin.clone(),
                state: owner_state.to_string(),
            });
        }

        let args = into_arguments(qualified, args)?;
        let resolved = validate_params(qualified, &args, &descriptor.parameters)?;

        self.invocations.fetch_add(1, Ordering::Relaxed);
        debug!(tool = %qualified, "Invoking tool");

        let handler = descriptor.handler.clone();
        let outcome = with_deadline(qualified, deadline, async move {
            Ok(handler.call(resolved).await)
        })
        .await
        .map_err(|e| {
            warn!(tool = %qualified, "Tool invocation timed out: {}", e);
            e
        })?;

        outcome.map_err(|cause| {
            warn!(tool = %qualified, error = %cause, "Tool handler failed");
            Error::tool_execution(qualified, &descriptor.plugin, cause)
        })
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// 인자는 JSON 객체여야 함 (null은 빈 객체)
fn into_arguments(qualified: &str, args: Value) -> Result<ConfigMap> {
    match args {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(ConfigMap::new()),
        other => Err(Error::validation(
            qualified,
            "arguments",
            format!("must be an object, got {}", json_type(&other)),
        )),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// ToolListing - 목록 스냅샷
// ============================================================================

/// `list()` 결과
///
/// 필터는 순회 시점에 지연 적용되며, `iter()`를 다시 호출하면 처음부터 순회합니다.
#[derive(Debug, Clone)]
pub struct ToolListing {
    tools: Vec<ToolDescriptor>,
    category: Option<String>,
}

impl ToolListing {
    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> + '_ {
        self.tools.iter().filter(move |tool| {
            self.category
                .as_deref()
                .map_or(true, |category| tool.category == category)
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.iter().map(|t| t.qualified_name.as_str()).collect()
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

impl<'a> IntoIterator for &'a ToolListing {
    type Item = &'a ToolDescriptor;
    type IntoIter = Box<dyn Iterator<Item = &'a ToolDescriptor> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

// ============================================================================
// 테스트
// ============================================================================
