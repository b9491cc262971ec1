//! Validation Schema - 설정/파라미터 선언적 검증 규칙
//!
//! 플러그인 설정과 Tool 파라미터가 같은 규칙 집합을 공유합니다.
//!
//! ## 사용법
//!
//! ```ignore
//! use plughost_foundation::schema::{FieldRule, ValidationSchema, validate_config};
//!
//! let schema = ValidationSchema::new()
//!     .field("persist", FieldRule::boolean().default_value(json!(false)))
//!     .field("maxMessages", FieldRule::integer().range(1.0, 10_000.0).default_value(json!(100)));
//!
//! let resolved = validate_config("memory", &raw, &schema)?;
//! ```

mod validator;

pub use validator::{validate_config, validate_params, Violation};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// 문자열 키 → 임의 값 매핑 (플러그인 설정, Tool 인자, 이벤트 페이로드 공용)
pub type ConfigMap = Map<String, Value>;

// ============================================================================
// FieldType
// ============================================================================

/// 필드 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    /// 타입 검사 없음
    Any,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Any => "any",
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// FieldRule
// ============================================================================

/// 필드 하나에 대한 검증 규칙
///
/// `min`/`max`는 숫자 필드에서는 값, 문자열/배열 필드에서는 길이에 적용됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRule {
    #[serde(rename = "type")]
    pub field_type: FieldType,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// 허용 값 목록 (enum)
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl FieldRule {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            default: None,
            allowed: None,
            min: None,
            max: None,
            description: String::new(),
        }
    }

    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    pub fn integer() -> Self {
        Self::new(FieldType::Integer)
    }

    pub fn number() -> Self {
        Self::new(FieldType::Number)
    }

    pub fn boolean() -> Self {
        Self::new(FieldType::Boolean)
    }

    pub fn array() -> Self {
        Self::new(FieldType::Array)
    }

    pub fn object() -> Self {
        Self::new(FieldType::Object)
    }

    pub fn any() -> Self {
        Self::new(FieldType::Any)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn one_of(mut self, values: Vec<Value>) -> Self {
        self.allowed = Some(values);
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn range(self, min: f64, max: f64) -> Self {
        self.min(min).max(max)
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// JSON Schema 프래그먼트 (MCP/LLM tool 정의 호환)
    pub fn to_json_schema(&self) -> Value {
        let mut schema = Map::new();
        if self.field_type != FieldType::Any {
            schema.insert("type".into(), json!(self.field_type.as_str()));
        }
        if !self.description.is_empty() {
            schema.insert("description".into(), json!(self.description));
        }
        if let Some(ref default) = self.default {
            schema.insert("default".into(), default.clone());
        }
        if let Some(ref allowed) = self.allowed {
            schema.insert("enum".into(), Value::Array(allowed.clone()));
        }

        let (min_key, max_key) = match self.field_type {
            FieldType::String => ("minLength", "maxLength"),
            FieldType::Array => ("minItems", "maxItems"),
            _ => ("minimum", "maximum"),
        };
        if let Some(min) = self.min {
            schema.insert(min_key.into(), json!(min));
        }
        if let Some(max) = self.max {
            schema.insert(max_key.into(), json!(max));
        }

        Value::Object(schema)
    }
}

// ============================================================================
// ValidationSchema
// ============================================================================

/// 선언 순서를 유지하는 필드 규칙 집합
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationSchema {
    fields: Vec<(String, FieldRule)>,
}

impl ValidationSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// 필드 추가 (같은 이름이 있으면 교체)
    pub fn field(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        let name = name.into();
        if let Some(existing) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            existing.1 = rule;
        } else {
            self.fields.push((name, rule));
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldRule> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, rule)| rule)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldRule)> {
        self.fields.iter().map(|(n, r)| (n.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// `{"type": "object", "properties": ..., "required": [...]}` 형식으로 변환
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, rule)| (name.clone(), rule.to_json_schema()))
            .collect();
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|(_, rule)| rule.required)
            .map(|(name, _)| name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_replaces_same_name() {
        let schema = ValidationSchema::new()
            .field("limit", FieldRule::integer())
            .field("limit", FieldRule::integer().required());

        assert_eq!(schema.len(), 1);
        assert!(schema.get("limit").unwrap().required);
    }

    #[test]
    fn test_json_schema_export() {
        let schema = ValidationSchema::new()
            .field(
                "role",
                FieldRule::string()
                    .one_of(vec![json!("user"), json!("assistant")])
                    .default_value(json!("user")),
            )
            .field("conversationId", FieldRule::string().required().min(1.0));

        let exported = schema.to_json_schema();
        assert_eq!(exported["type"], "object");
        assert_eq!(exported["required"], json!(["conversationId"]));
        assert_eq!(exported["properties"]["role"]["enum"], json!(["user", "assistant"]));
        assert_eq!(exported["properties"]["conversationId"]["minLength"], json!(1.0));
    }

    #[test]
    fn test_rule_deserializes_from_json() {
        let rule: FieldRule = serde_json::from_value(json!({
            "type": "integer",
            "required": true,
            "min": 1,
            "max": 5
        }))
        .unwrap();

        assert_eq!(rule.field_type, FieldType::Integer);
        assert!(rule.required);
        assert_eq!(rule.max, Some(5.0));
    }
}
