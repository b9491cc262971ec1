//! # plughost-foundation
//!
//! Foundation layer for PlugHost:
//! - Error: 플러그인 호스트 에러 분류 (Load, Config, DuplicateTool, Timeout ...)
//! - Schema: 선언적 검증 규칙 + Config Validator (설정/Tool 파라미터 공용)
//! - Event: 순서 보장 이벤트 버스 (부분 페이로드 병합)
//! - Config: 호스트 설정 (플러그인 목록, 마감 시간) 로더
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Layer2-core: PluginManager / ToolRegistry              │
//! │                     │                                   │
//! │          ┌──────────┴──────────┐                        │
//! │          ▼                     ▼                        │
//! │   Config Validator        Event Bus                     │
//! │   (schema)                (event)                       │
//! │          └──────────┬──────────┘                        │
//! │                     ▼                                   │
//! │              Error / HostConfig                         │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod deadline;
pub mod error;
pub mod event;
pub mod logging;
pub mod schema;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, HandlerFailure, Result};

// ============================================================================
// Schema (검증)
// ============================================================================
pub use schema::{
    validate_config, validate_params, ConfigMap, FieldRule, FieldType, ValidationSchema,
    Violation,
};

// ============================================================================
// Event (이벤트 시스템)
// ============================================================================
pub use event::{
    event_name, handler_fn, split_phase, DispatchOutcome, DispatchRecord, EventBus,
    EventBusConfig, EventHandler, EventPhase, Payload, SubscriptionId,
};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{load_host_config, HostConfig, HostConfigLoader, PluginEntry, TimeoutConfig};

// ============================================================================
// Utilities
// ============================================================================
pub use deadline::with_deadline;
pub use logging::init_logging;
