//! Event Bus - 순서 보장 발행/구독 시스템
//!
//! 같은 이벤트의 핸들러는 등록 순서대로, 하나씩 순차 실행됩니다.
//! 핸들러가 반환한 부분 페이로드는 다음 핸들러 실행 전에 병합됩니다.

use super::types::DispatchRecord;
use crate::error::HandlerFailure;
use crate::schema::ConfigMap;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, trace, warn};

/// 이벤트 페이로드
pub type Payload = ConfigMap;

// ============================================================================
// EventHandler Trait
// ============================================================================

/// 구독 핸들 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "subscription-{}", self.0)
    }
}

/// 이벤트 핸들러 trait
///
/// `Ok(Some(partial))`를 반환하면 `partial`의 키가 페이로드에 덮어써집니다.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &str, payload: &Payload) -> Result<Option<Payload>>;
}

/// 클로저 기반 핸들러
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(String, Payload) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Payload>>> + Send,
{
    async fn handle(&self, event: &str, payload: &Payload) -> Result<Option<Payload>> {
        (self.0)(event.to_string(), payload.clone()).await
    }
}

/// 클로저를 `EventHandler`로 변환
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(String, Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Payload>>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

// ============================================================================
// DispatchOutcome
// ============================================================================

/// `publish` 결과 - 최종 페이로드와 실패한 핸들러 목록
#[derive(Debug)]
pub struct DispatchOutcome {
    pub event: String,
    /// 모든 병합이 적용된 최종 페이로드
    pub payload: Payload,
    /// 호출된 핸들러 수
    pub handlers: usize,
    pub failures: Vec<HandlerFailure>,
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// 실패가 하나라도 있으면 `Error::EventDispatch`로 집계
    pub fn into_result(self) -> Result<Payload> {
        if self.failures.is_empty() {
            Ok(self.payload)
        } else {
            Err(Error::EventDispatch {
                event: self.event,
                failures: self.failures,
            })
        }
    }
}

// ============================================================================
// EventBus
// ============================================================================

/// 이벤트 버스 설정
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// 브로드캐스트 채널 용량
    pub channel_capacity: usize,

    /// 디스패치 히스토리 보관 개수
    pub history_size: usize,

    /// 핸들러 하나당 최대 실행 시간
    pub handler_timeout: Option<Duration>,

    /// 디버그 모드 (모든 디스패치 로깅)
    pub debug_mode: bool,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            history_size: 100,
            handler_timeout: None,
            debug_mode: false,
        }
    }
}

/// 등록된 구독
struct Subscription {
    id: SubscriptionId,
    event: String,
    plugin: String,
    handler: Arc<dyn EventHandler>,
}

/// 이벤트 버스
///
/// ## 사용법
///
/// ```ignore
/// let bus = EventBus::new();
///
/// let id = bus
///     .subscribe("request_output:start", "memory", handler_fn(|_, payload| async move {
///         Ok(Some(enhance(payload)))
///     }))
///     .await;
///
/// let payload = bus.publish("request_output:start", payload).await.into_result()?;
///
/// bus.unsubscribe_all("memory").await;
/// ```
pub struct EventBus {
    /// 설정
    config: EventBusConfig,

    /// 디스패치 기록 브로드캐스트
    sender: broadcast::Sender<DispatchRecord>,

    /// 등록 순서대로 저장된 구독
    subscriptions: RwLock<Vec<Subscription>>,

    /// 구독 ID 카운터
    subscription_counter: AtomicU64,

    /// 디스패치 히스토리
    history: RwLock<VecDeque<DispatchRecord>>,

    /// 발행된 이벤트 수
    event_count: AtomicU64,
}

impl EventBus {
    /// 기본 설정으로 이벤트 버스 생성
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// 커스텀 설정으로 이벤트 버스 생성
    pub fn with_config(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));

        Self {
            config,
            sender,
            subscriptions: RwLock::new(Vec::new()),
            subscription_counter: AtomicU64::new(0),
            history: RwLock::new(VecDeque::new()),
            event_count: AtomicU64::new(0),
        }
    }

    // ========================================================================
    // 구독
    // ========================================================================

    /// 구독 추가 (항상 끝에 추가되어 등록 순서 유지)
    pub async fn subscribe(
        &self,
        event: impl Into<String>,
        plugin: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.subscription_counter.fetch_add(1, Ordering::SeqCst));
        let event = event.into();
        let plugin = plugin.into();

        debug!(subscription_id = %id, event = %event, plugin = %plugin, "Subscribing handler");

        let mut subscriptions = self.subscriptions.write().await;
        subscriptions.push(Subscription {
            id,
            event,
            plugin,
            handler,
        });

        id
    }

    /// 조건부 구독 추가
    ///
    /// `gate`는 구독 목록의 쓰기 잠금을 잡은 상태에서 평가됩니다.
    /// `false`이면 아무것도 추가하지 않고 `None`을 반환합니다.
    pub async fn subscribe_if<G>(
        &self,
        event: impl Into<String>,
        plugin: impl Into<String>,
        handler: Arc<dyn EventHandler>,
        gate: G,
    ) -> Option<SubscriptionId>
    where
        G: FnOnce() -> bool,
    {
        let event = event.into();
        let plugin = plugin.into();

        let mut subscriptions = self.subscriptions.write().await;
        if !gate() {
            debug!(event = %event, plugin = %plugin, "Subscription gate closed");
            return None;
        }

        let id = SubscriptionId(self.subscription_counter.fetch_add(1, Ordering::SeqCst));
        debug!(subscription_id = %id, event = %event, plugin = %plugin, "Subscribing handler");
        subscriptions.push(Subscription {
            id,
            event,
            plugin,
            handler,
        });

        Some(id)
    }

    /// 구독 해제
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.write().await;
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        let removed = subscriptions.len() != before;

        if removed {
            debug!(subscription_id = %id, "Unsubscribed handler");
        }

        removed
    }

    /// 플러그인이 소유한 모든 구독 해제 (멱등)
    pub async fn unsubscribe_all(&self, plugin: &str) -> usize {
        let mut subscriptions = self.subscriptions.write().await;
        let before = subscriptions.len();
        subscriptions.retain(|s| s.plugin != plugin);
        let removed = before - subscriptions.len();

        if removed > 0 {
            debug!(plugin = %plugin, removed, "Removed plugin subscriptions");
        }

        removed
    }

    /// 이벤트 구독이 특정 플러그인 소유인지 확인
    pub async fn owner_of(&self, id: SubscriptionId) -> Option<String> {
        let subscriptions = self.subscriptions.read().await;
        subscriptions
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.plugin.clone())
    }

    // ========================================================================
    // 발행
    // ========================================================================

    /// 이벤트 발행
    ///
    /// 핸들러 실패는 이후 핸들러 실행을 막지 않으며, 결과에 모아서 반환됩니다.
    pub async fn publish(&self, event: &str, payload: Payload) -> DispatchOutcome {
        let event_count = self.event_count.fetch_add(1, Ordering::SeqCst);

        // 핸들러 안에서 구독/발행이 가능하도록 스냅샷 후 락 해제
        let targets: Vec<(SubscriptionId, String, Arc<dyn EventHandler>)> = {
            let subscriptions = self.subscriptions.read().await;
            subscriptions
                .iter()
                .filter(|s| s.event == event)
                .map(|s| (s.id, s.plugin.clone(), Arc::clone(&s.handler)))
                .collect()
        };

        if self.config.debug_mode {
            trace!(
                event = %event,
                handlers = targets.len(),
                "Publishing event #{}", event_count + 1
            );
        }

        let mut payload = payload;
        let mut failures = Vec::new();

        for (id, plugin, handler) in &targets {
            trace!(subscription_id = %id, plugin = %plugin, event = %event, "Delivering event");

            match self.run_handler(event, plugin, handler.as_ref(), &payload).await {
                Ok(Some(partial)) => {
                    for (key, value) in partial {
                        payload.insert(key, value);
                    }
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(event = %event, plugin = %plugin, error = %error, "Event handler failed");
                    failures.push(HandlerFailure {
                        plugin: plugin.clone(),
                        error,
                    });
                }
            }
        }

        let record = DispatchRecord::new(event, targets.len(), failures.len());
        {
            let mut history = self.history.write().await;
            history.push_back(record.clone());
            while history.len() > self.config.history_size {
                history.pop_front();
            }
        }
        let _ = self.sender.send(record);

        DispatchOutcome {
            event: event.to_string(),
            payload,
            handlers: targets.len(),
            failures,
        }
    }

    async fn run_handler(
        &self,
        event: &str,
        plugin: &str,
        handler: &dyn EventHandler,
        payload: &Payload,
    ) -> Result<Option<Payload>> {
        match self.config.handler_timeout {
            Some(deadline) => tokio::time::timeout(deadline, handler.handle(event, payload))
                .await
                .map_err(|_| Error::timeout(format!("handler '{}' for '{}'", plugin, event), deadline))?,
            None => handler.handle(event, payload).await,
        }
    }

    // ========================================================================
    // 조회
    // ========================================================================

    /// 디스패치 기록 수신자 생성 (관찰자용)
    pub fn receiver(&self) -> broadcast::Receiver<DispatchRecord> {
        self.sender.subscribe()
    }

    /// 최근 디스패치 기록 (최신 순)
    pub async fn history(&self, limit: Option<usize>) -> Vec<DispatchRecord> {
        let history = self.history.read().await;
        let limit = limit.unwrap_or(history.len());
        history.iter().rev().take(limit).cloned().collect()
    }

    /// 특정 이벤트의 구독 수
    pub async fn subscriber_count(&self, event: &str) -> usize {
        let subscriptions = self.subscriptions.read().await;
        subscriptions.iter().filter(|s| s.event == event).count()
    }

    /// 특정 플러그인의 구독 수
    pub async fn plugin_subscription_count(&self, plugin: &str) -> usize {
        let subscriptions = self.subscriptions.read().await;
        subscriptions.iter().filter(|s| s.plugin == plugin).count()
    }

    /// 전체 구독 수
    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    /// 총 발행된 이벤트 수
    pub fn event_count(&self) -> u64 {
        self.event_count.load(Ordering::SeqCst)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// 테스트
// ============================================================================
