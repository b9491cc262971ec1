//! Builtin plugins - 호스트에 컴파일되어 포함된 플러그인
//!
//! | Source           | Plugin         |
//! |------------------|----------------|
//! | `builtin:memory` | 대화 메모리     |

mod memory;

pub use memory::{MemoryEntry, MemoryPlugin, MEMORY_SOURCE};

use super::resolver::StaticResolver;
use super::traits::Plugin;
use std::sync::Arc;

/// 모든 내장 플러그인 팩토리 등록
pub fn register_builtins(resolver: &mut StaticResolver) {
    resolver.register(MEMORY_SOURCE, |_| Ok(Arc::new(MemoryPlugin::new()) as Arc<dyn Plugin>));
}
