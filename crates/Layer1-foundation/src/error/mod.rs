//! Error types for PlugHost
//!
//! 플러그인 호스트의 모든 에러를 중앙에서 관리

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// 이벤트 핸들러 하나의 실패 정보
#[derive(Debug)]
pub struct HandlerFailure {
    /// 핸들러를 등록한 플러그인
    pub plugin: String,
    /// 실패 원인
    pub error: Error,
}

impl std::fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.plugin, self.error)
    }
}

/// PlugHost 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 플러그인 라이프사이클 관련
    // ========================================================================
    #[error("Failed to load plugin '{plugin}': {reason}")]
    Load { plugin: String, reason: String },

    #[error("Invalid configuration for '{plugin}': field '{field}' {reason}")]
    Config {
        plugin: String,
        field: String,
        reason: String,
    },

    #[error("Dependency cycle detected: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("Invalid lifecycle state for '{plugin}': {message}")]
    InvalidState { plugin: String, message: String },

    #[error("Plugin not found: {0}")]
    NotFound(String),

    #[error("Plugin '{plugin}' is not ready (state: {state})")]
    NotReady { plugin: String, state: String },

    // ========================================================================
    // Tool 관련
    // ========================================================================
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid arguments for '{target}': field '{field}' {reason}")]
    Validation {
        target: String,
        field: String,
        reason: String,
    },

    #[error("Tool execution failed: {tool} - {cause}")]
    ToolExecution {
        tool: String,
        plugin: String,
        #[source]
        cause: Box<Error>,
    },

    // ========================================================================
    // 이벤트 관련
    // ========================================================================
    #[error("{} handler(s) failed for event '{event}'", .failures.len())]
    EventDispatch {
        event: String,
        failures: Vec<HandlerFailure>,
    },

    // ========================================================================
    // 실행 관련
    // ========================================================================
    #[error("Timeout: {operation} exceeded {millis}ms")]
    Timeout { operation: String, millis: u64 },

    /// 플러그인 비즈니스 로직에서 발생한 에러
    #[error("Plugin error: {0}")]
    Plugin(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 재시도 가능한 에러인지 확인
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout { .. } | Error::NotReady { .. } => true,
            Error::ToolExecution { cause, .. } => cause.is_retryable(),
            _ => false,
        }
    }

    /// Agent Runtime이 사용자에게 그대로 보여줄 수 있는 에러인지 확인
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::ToolNotFound(_)
                | Error::Validation { .. }
                | Error::Config { .. }
                | Error::InvalidInput(_)
        )
    }

    /// Load 에러 생성 헬퍼
    pub fn load(plugin: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Load {
            plugin: plugin.into(),
            reason: reason.into(),
        }
    }

    /// Config 에러 생성 헬퍼
    pub fn config(
        plugin: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::Config {
            plugin: plugin.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Validation 에러 생성 헬퍼
    pub fn validation(
        target: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::Validation {
            target: target.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// InvalidState 에러 생성 헬퍼
    pub fn invalid_state(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidState {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Tool 실행 에러 생성 헬퍼
    pub fn tool_execution(tool: impl Into<String>, plugin: impl Into<String>, cause: Error) -> Self {
        Error::ToolExecution {
            tool: tool.into(),
            plugin: plugin.into(),
            cause: Box::new(cause),
        }
    }

    /// Timeout 에러 생성 헬퍼
    pub fn timeout(operation: impl Into<String>, deadline: std::time::Duration) -> Self {
        Error::Timeout {
            operation: operation.into(),
            millis: deadline.as_millis() as u64,
        }
    }
}

// ============================================================================
// From 구현 (추가 변환)
// ============================================================================

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
