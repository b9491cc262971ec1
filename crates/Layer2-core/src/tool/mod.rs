//! Tool System - 플러그인이 노출하는 Tool 관리
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ToolRegistry                                                │
//! │  ├── register(plugin, spec) - 원자적 등록 (ToolScope 경유)    │
//! │  ├── invoke(name, args) - 검증 → 상태 확인 → 실행             │
//! │  ├── list(category) - 스냅샷 목록                            │
//! │  └── schemas() - Agent Runtime용 JSON 스키마                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ToolSpec / ToolDescriptor                                   │
//! │  └── plugin:<plugin>:<tool> 이름, 파라미터 스키마, 핸들러      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 사용법
//!
//! ```ignore
//! let listing = registry.list(Some("memory")).await;
//! for tool in listing.iter() {
//!     println!("{}: {}", tool.qualified_name, tool.description);
//! }
//! ```

pub mod descriptor;
pub mod handler;
pub mod registry;

pub use descriptor::{
    is_valid_name, parse_qualified_name, qualified_name, ToolDescriptor, ToolSpec,
    DEFAULT_CATEGORY, TOOL_PREFIX,
};
pub use handler::{tool_fn, FnTool, ToolHandler};
pub use registry::{ToolListing, ToolRegistry};
