//! Logging - tracing subscriber 초기화
//!
//! `RUST_LOG`가 설정되어 있으면 우선 사용하고, 없으면 `level`을 기본 필터로 사용합니다.

use crate::{Error, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// 전역 subscriber 설치 (두 번째 호출은 에러)
pub fn init_logging(level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
        .map_err(|e| Error::Internal(format!("Failed to initialize logging: {}", e)))
}
