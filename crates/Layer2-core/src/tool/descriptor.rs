//! Tool descriptor - 레지스트리에 등록되는 Tool 정보

use super::handler::ToolHandler;
use crate::plugin::StateCell;
use plughost_foundation::{FieldRule, ValidationSchema};
use regex::Regex;
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};

/// 정규화된 Tool 이름 접두사
pub const TOOL_PREFIX: &str = "plugin";

/// 기본 카테고리
pub const DEFAULT_CATEGORY: &str = "general";

/// `plugin:<plugin>:<tool>` 형식의 정규화된 이름
pub fn qualified_name(plugin: &str, tool: &str) -> String {
    format!("{}:{}:{}", TOOL_PREFIX, plugin, tool)
}

/// 정규화된 이름을 (plugin, tool)로 분리
pub fn parse_qualified_name(name: &str) -> Option<(&str, &str)> {
    let rest = name.strip_prefix(TOOL_PREFIX)?.strip_prefix(':')?;
    let (plugin, tool) = rest.split_once(':')?;
    (is_valid_name(plugin) && is_valid_name(tool)).then_some((plugin, tool))
}

/// 플러그인/Tool 이름 규칙 (`:` 불가, 영숫자로 시작)
pub fn is_valid_name(name: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(name))
}

// ============================================================================
// ToolSpec - 플러그인이 등록 시 제출하는 정의
// ============================================================================

/// Tool 정의
///
/// ```ignore
/// let spec = ToolSpec::new("recall", handler)
///     .description("Recall recent messages")
///     .param("conversationId", FieldRule::string().required())
///     .param("limit", FieldRule::integer().default_value(json!(10)));
/// ctx.tools().register(spec).await?;
/// ```
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub category: String,
    pub parameters: ValidationSchema,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, handler: Arc<dyn ToolHandler>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            category: DEFAULT_CATEGORY.to_string(),
            parameters: ValidationSchema::new(),
            handler,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn param(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        self.parameters = self.parameters.field(name, rule);
        self
    }

    pub fn parameters(mut self, schema: ValidationSchema) -> Self {
        self.parameters = schema;
        self
    }
}

// ============================================================================
// ToolDescriptor - 레지스트리 항목
// ============================================================================

/// 등록된 Tool
#[derive(Clone)]
pub struct ToolDescriptor {
    pub qualified_name: String,
    pub plugin: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub parameters: ValidationSchema,
    pub(crate) handler: Arc<dyn ToolHandler>,
    pub(crate) owner_state: StateCell,
}

impl ToolDescriptor {
    pub(crate) fn from_spec(plugin: &str, spec: ToolSpec, owner_state: StateCell) -> Self {
        Self {
            qualified_name: qualified_name(plugin, &spec.name),
            plugin: plugin.to_string(),
            name: spec.name,
            description: spec.description,
            category: spec.category,
            parameters: spec.parameters,
            handler: spec.handler,
            owner_state,
        }
    }

    /// Agent Runtime에 노출되는 JSON 스키마
    pub fn schema(&self) -> Value {
        json!({
            "name": self.qualified_name,
            "description": self.description,
            "category": self.category,
            "input_schema": self.parameters.to_json_schema(),
        })
    }
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("qualified_name", &self.qualified_name)
            .field("category", &self.category)
            .field("parameters", &self.parameters.len())
            .finish()
    }
}
