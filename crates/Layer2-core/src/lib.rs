//! plughost-core: Plugin host runtime
//!
//! Layer2 - 플러그인 라이프사이클, Tool 디스패치, 이벤트 연결
//!
//! # 주요 모듈
//!
//! - `plugin`: Plugin trait, PluginManager, 상태 머신, 리졸버, 내장 플러그인
//! - `tool`: ToolRegistry (정규화된 이름, 파라미터 검증, 상태 확인 후 실행)
//! - `host`: Agent Runtime용 PluginHost
//!
//! # 사용 예시
//!
//! ```ignore
//! use plughost_core::{PluginHost, PluginDescriptor};
//! use serde_json::json;
//!
//! let host = PluginHost::with_builtins(HostConfig::new());
//! host.load_plugin(
//!     PluginDescriptor::new("memory", "builtin:memory").with_setting("persist", json!(false)),
//! )
//! .await?;
//! host.start_all().await?;
//!
//! let stored = host
//!     .invoke(
//!         "plugin:memory:remember",
//!         json!({"conversationId": "c1", "message": "hi", "role": "user"}),
//!     )
//!     .await?;
//! ```

pub mod host;
pub mod plugin;
pub mod tool;

/// 크레이트 버전
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-exports: Host
pub use host::{HostSummary, PluginHost};

// Re-exports: Plugin
pub use plugin::{
    builtin::{MemoryEntry, MemoryPlugin, MEMORY_SOURCE},
    LifecycleState, Plugin, PluginContext, PluginDependency, PluginDescriptor, PluginEvents,
    PluginExt, PluginFactory, PluginInfo, PluginManager, PluginManagerConfig, PluginManifest,
    PluginResolver, PluginVersion, StartReport, StaticResolver, TeardownReport, ToolScope,
};

// Re-exports: Tool
pub use tool::{
    qualified_name, tool_fn, ToolDescriptor, ToolHandler, ToolListing, ToolRegistry, ToolSpec,
};

// Re-exports: Foundation
pub use plughost_foundation::{
    handler_fn, ConfigMap, Error, EventBus, EventHandler, FieldRule, HostConfig, Payload, Result,
    ValidationSchema,
};
