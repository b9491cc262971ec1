//! Event System - 순서 보장 발행/구독 시스템
//!
//! 호스트 파이프라인 이벤트(`request_output:start`)와 플러그인 도메인 이벤트
//! (`memory:stored`)가 하나의 버스를 공유합니다. 네임스페이스는 이름 규칙으로만 구분합니다.
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        EventBus                              │
//! │  publish("request_output:start", payload)                    │
//! │         │                                                   │
//! │         ▼  (등록 순서, 순차 실행)                             │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐      │
//! │  │  Handler 1   │─▶│  Handler 2   │─▶│  Handler N   │      │
//! │  │  (memory)    │  │  (vector)    │  │  (...)       │      │
//! │  └──────────────┘  └──────────────┘  └──────────────┘      │
//! │         └── 반환된 부분 페이로드가 다음 핸들러 입력에 병합 ──┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod bus;
pub mod types;

// Re-exports
pub use bus::{
    handler_fn, DispatchOutcome, EventBus, EventBusConfig, EventHandler, FnHandler, Payload,
    SubscriptionId,
};

pub use types::{
    event_name, lifecycle, pipeline, split_phase, DispatchRecord, EventId, EventPhase,
};
