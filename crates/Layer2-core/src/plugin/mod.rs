//! # Plugin System
//!
//! 독립적으로 작성된 플러그인을 라이프사이클 안전한 확장 표면으로 묶는 호스트
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     PluginManager                           │
//! │  PluginDescriptor ──▶ PluginResolver ──▶ Arc<dyn Plugin>    │
//! │                          │                                  │
//! │  ┌───────────────────────┼───────────────────────────────┐ │
//! │  │     PluginContext     │  (플러그인마다 하나)            │ │
//! │  │  - 검증된 설정         │                               │ │
//! │  │  - ToolScope     ─────┼──▶ ToolRegistry               │ │
//! │  │  - PluginEvents  ─────┼──▶ EventBus                   │ │
//! │  │  - StateCell          │                               │ │
//! │  └───────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 예시
//!
//! ```ignore
//! let resolver = StaticResolver::with_builtins();
//! let manager = PluginManager::new(Arc::new(resolver));
//!
//! manager
//!     .load(PluginDescriptor::new("memory", "builtin:memory").with_setting("persist", json!(false)))
//!     .await?;
//! let report = manager.start_all().await?;
//! ```

pub mod builtin;
pub mod dependency;
pub mod descriptor;
pub mod manager;
pub mod manifest;
pub mod resolver;
pub mod scope;
pub mod state;
pub mod traits;

pub use dependency::{resolve_start_order, StartPlan};
pub use descriptor::PluginDescriptor;
pub use manager::{PluginInfo, PluginManager, PluginManagerConfig, StartReport, TeardownReport};
pub use manifest::{PluginDependency, PluginManifest, PluginVersion};
pub use resolver::{PluginFactory, PluginResolver, StaticResolver};
pub use scope::{PluginEvents, ToolScope};
pub use state::{LifecycleState, StateCell};
pub use traits::{Plugin, PluginContext, PluginExt};
