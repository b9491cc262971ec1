//! Tool handler - 플러그인이 제공하는 Tool 실행 인터페이스

use async_trait::async_trait;
use plughost_foundation::{ConfigMap, Result};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Tool 실행 trait
///
/// `args`는 파라미터 스키마로 이미 검증/기본값 적용이 끝난 상태로 전달됩니다.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: ConfigMap) -> Result<Value>;
}

/// 클로저 기반 Tool 핸들러
pub struct FnTool<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnTool<F>
where
    F: Fn(ConfigMap) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    async fn call(&self, args: ConfigMap) -> Result<Value> {
        (self.0)(args).await
    }
}

/// 클로저를 `ToolHandler`로 변환
pub fn tool_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(ConfigMap) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(FnTool(f))
}
