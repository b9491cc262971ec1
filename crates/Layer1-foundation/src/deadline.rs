//! Deadline helper - 호출자가 지정한 마감 시간으로 작업 제한
//!
//! 마감을 넘기면 `Error::Timeout`을 반환할 뿐, 진행 중인 작업을 강제로 종료하지는 않습니다.

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;

/// `deadline`이 `None`이면 제한 없이 실행
pub async fn with_deadline<T, F>(operation: &str, deadline: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::timeout(operation, limit))?,
        None => fut.await,
    }
}
