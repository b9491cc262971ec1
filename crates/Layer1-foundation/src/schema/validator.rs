//! Config Validator
//!
//! 순수 함수: 원본 매핑 + 스키마 → 정규화된 매핑.
//! 스키마에 없는 필드는 그대로 통과합니다.

use super::{ConfigMap, FieldRule, FieldType, ValidationSchema};
use crate::{Error, Result};
use serde_json::Value;

/// 규칙 위반 정보 (필드 이름 + 사유)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: String,
    pub reason: String,
}

impl Violation {
    fn new(field: &str, reason: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// 플러그인 설정 검증 - 실패 시 `Error::Config`
pub fn validate_config(
    plugin_name: &str,
    raw: &ConfigMap,
    schema: &ValidationSchema,
) -> Result<ConfigMap> {
    resolve(raw, schema).map_err(|v| Error::config(plugin_name, v.field, v.reason))
}

/// Tool 인자 검증 - 실패 시 `Error::Validation`
pub fn validate_params(
    qualified_name: &str,
    args: &ConfigMap,
    schema: &ValidationSchema,
) -> Result<ConfigMap> {
    resolve(args, schema).map_err(|v| Error::validation(qualified_name, v.field, v.reason))
}

/// 스키마 순서대로 필드를 검사하고 첫 번째 위반을 반환
pub fn resolve(raw: &ConfigMap, schema: &ValidationSchema) -> std::result::Result<ConfigMap, Violation> {
    let mut resolved = raw.clone();

    for (name, rule) in schema.fields() {
        match raw.get(name).filter(|v| !v.is_null()) {
            Some(value) => {
                let coerced = coerce(name, rule, value)?;
                check_allowed(name, rule, &coerced)?;
                check_bounds(name, rule, &coerced)?;
                resolved.insert(name.to_string(), coerced);
            }
            None if rule.required => return Err(Violation::new(name, "missing")),
            None => {
                resolved.remove(name);
                if let Some(ref default) = rule.default {
                    resolved.insert(name.to_string(), default.clone());
                }
            }
        }
    }

    Ok(resolved)
}

fn type_mismatch(name: &str, expected: FieldType, value: &Value) -> Violation {
    Violation::new(
        name,
        format!("expected {}, got {}", expected, json_kind(value)),
    )
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn coerce(name: &str, rule: &FieldRule, value: &Value) -> std::result::Result<Value, Violation> {
    let expected = rule.field_type;
    let coerced = match (expected, value) {
        (FieldType::Any, v) => Some(v.clone()),
        (FieldType::String, Value::String(_)) => Some(value.clone()),
        (FieldType::Boolean, Value::Bool(_)) => Some(value.clone()),
        (FieldType::Boolean, Value::String(s)) => match s.as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        (FieldType::Integer, Value::Number(n)) => {
            if n.is_i64() || n.is_u64() {
                Some(value.clone())
            } else {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && fits_i64(*f))
                    .map(|f| Value::from(f as i64))
            }
        }
        (FieldType::Integer, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
        (FieldType::Number, Value::Number(_)) => Some(value.clone()),
        (FieldType::Number, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        (FieldType::Array, Value::Array(_)) => Some(value.clone()),
        (FieldType::Object, Value::Object(_)) => Some(value.clone()),
        _ => None,
    };

    coerced.ok_or_else(|| type_mismatch(name, expected, value))
}

/// i64 범위: [-2^63, 2^63)
fn fits_i64(f: f64) -> bool {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    f.is_finite() && (-LIMIT..LIMIT).contains(&f)
}

fn check_allowed(name: &str, rule: &FieldRule, value: &Value) -> std::result::Result<(), Violation> {
    match rule.allowed {
        Some(ref allowed) if !allowed.iter().any(|a| values_equal(a, value)) => {
            let options: Vec<String> = allowed.iter().map(|a| a.to_string()).collect();
            Err(Violation::new(
                name,
                format!("must be one of [{}], got {}", options.join(", "), value),
            ))
        }
        _ => Ok(()),
    }
}

/// 숫자는 표현(1 vs 1.0)과 무관하게 비교
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn check_bounds(name: &str, rule: &FieldRule, value: &Value) -> std::result::Result<(), Violation> {
    if rule.min.is_none() && rule.max.is_none() {
        return Ok(());
    }

    let (measured, what) = match value {
        Value::Number(n) => (n.as_f64(), "value"),
        Value::String(s) => (Some(s.chars().count() as f64), "length"),
        Value::Array(a) => (Some(a.len() as f64), "length"),
        _ => (None, "value"),
    };

    let Some(measured) = measured else {
        return Ok(());
    };

    if let Some(min) = rule.min {
        if measured < min {
            return Err(Violation::new(
                name,
                format!("{} {} is below minimum {}", what, measured, min),
            ));
        }
    }
    if let Some(max) = rule.max {
        if measured > max {
            return Err(Violation::new(
                name,
                format!("{} {} exceeds maximum {}", what, measured, max),
            ));
        }
    }

    Ok(())
}
