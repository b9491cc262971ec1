//! Config - 호스트 설정 관리
//!
//! - `host.rs` - HostConfig (플러그인 목록, 마감 시간, 이벤트 버스)
//! - `loader.rs` - 사용자/프로젝트/로컬 설정 파일 병합 로더

mod host;
mod loader;

pub use host::{EventSettings, HostConfig, PluginEntry, TimeoutConfig, DEFAULT_LIFECYCLE_TIMEOUT_MS};
pub use loader::{load_host_config, strip_json_comments, HostConfigLoader, CONFIG_DIR_NAME};
