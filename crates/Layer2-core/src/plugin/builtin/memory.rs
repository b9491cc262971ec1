//! Memory plugin - 대화별 메시지 기억
//!
//! ## Tools
//! - `plugin:memory:remember` - 메시지 저장
//! - `plugin:memory:recall` - 최근 메시지 조회
//! - `plugin:memory:forget` - 대화 삭제
//! - `plugin:memory:stats` - 저장 현황
//!
//! ## Events
//! - 발행: `memory:stored`
//! - 구독: `request_output:start` (페이로드에 `conversationId`가 있으면 최근 대화를 `prompt`에 덧붙임)
//!
//! 대화 데이터는 플러그인 내부에만 존재합니다. `persist`가 켜져 있으면
//! 시작 시 `storagePath`에서 읽고 중지 시 다시 씁니다.

use crate::plugin::{Plugin, PluginContext, PluginEvents, PluginManifest, PluginVersion};
use crate::tool::{tool_fn, ToolSpec};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use parking_lot::RwLock as SyncRwLock;
use plughost_foundation::{
    event_name, handler_fn, ConfigMap, Error, EventPhase, FieldRule, Payload, Result,
    ValidationSchema,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::any::Any;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// 리졸버 소스 식별자
pub const MEMORY_SOURCE: &str = "builtin:memory";

/// 프롬프트에 덧붙이는 최근 메시지 수
const CONTEXT_WINDOW: usize = 5;

const DEFAULT_RECALL_LIMIT: i64 = 10;

/// 저장된 메시지 하나
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub role: String,
    pub content: String,
    /// RFC 3339
    pub timestamp: String,
}

type Conversations = Arc<RwLock<HashMap<String, Vec<MemoryEntry>>>>;

#[derive(Debug, Clone)]
struct MemorySettings {
    persist: bool,
    max_messages: usize,
    storage_path: Option<PathBuf>,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            persist: false,
            max_messages: 100,
            storage_path: None,
        }
    }
}

impl MemorySettings {
    fn from_config(plugin: &str, config: &ConfigMap) -> Result<Self> {
        let defaults = Self::default();
        let persist = config
            .get("persist")
            .and_then(Value::as_bool)
            .unwrap_or(defaults.persist);
        let max_messages = config
            .get("maxMessages")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(defaults.max_messages);
        let storage_path = config
            .get("storagePath")
            .and_then(Value::as_str)
            .map(PathBuf::from);

        if persist && storage_path.is_none() {
            return Err(Error::config(
                plugin,
                "storagePath",
                "is required when persist is true",
            ));
        }

        Ok(Self {
            persist,
            max_messages,
            storage_path,
        })
    }

    fn persist_path(&self) -> Option<&PathBuf> {
        self.storage_path.as_ref().filter(|_| self.persist)
    }
}

// ============================================================================
// MemoryPlugin
// ============================================================================

/// 대화 메모리 플러그인
pub struct MemoryPlugin {
    conversations: Conversations,
    settings: SyncRwLock<MemorySettings>,
    /// 저장 파일을 읽었거나 파일이 없었음. false이면 중지 시 덮어쓰지 않음
    store_loaded: AtomicBool,
}

impl MemoryPlugin {
    pub fn new() -> Self {
        Self {
            conversations: Arc::new(RwLock::new(HashMap::new())),
            settings: SyncRwLock::new(MemorySettings::default()),
            store_loaded: AtomicBool::new(false),
        }
    }

    /// 대화의 모든 메시지 (오래된 순)
    pub async fn conversation(&self, conversation_id: &str) -> Vec<MemoryEntry> {
        self.conversations
            .read()
            .await
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn conversation_count(&self) -> usize {
        self.conversations.read().await.len()
    }

    async fn load_from_disk(&self, path: &PathBuf) -> Result<()> {
        if !tokio::fs::try_exists(path).await? {
            debug!(path = %path.display(), "No stored memory yet");
            return Ok(());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let stored: HashMap<String, Vec<MemoryEntry>> = serde_json::from_str(&content)?;
        info!(
            path = %path.display(),
            conversations = stored.len(),
            "Loaded stored memory"
        );
        *self.conversations.write().await = stored;
        Ok(())
    }

    async fn save_to_disk(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = {
            let conversations = self.conversations.read().await;
            serde_json::to_string_pretty(&*conversations)?
        };
        tokio::fs::write(path, content).await?;
        debug!(path = %path.display(), "Saved memory");
        Ok(())
    }
}

impl Default for MemoryPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for MemoryPlugin {
    fn manifest(&self) -> PluginManifest {
        PluginManifest::new("memory")
            .with_version(PluginVersion::new(0, 1, 0))
            .with_description("Per-conversation message memory")
    }

    fn config_schema(&self) -> ValidationSchema {
        ValidationSchema::new()
            .field(
                "persist",
                FieldRule::boolean()
                    .default_value(json!(false))
                    .describe("Write conversations to storagePath on stop"),
            )
            .field(
                "maxMessages",
                FieldRule::integer()
                    .default_value(json!(100))
                    .range(1.0, 10_000.0)
                    .describe("Messages kept per conversation"),
            )
            .field(
                "storagePath",
                FieldRule::string().describe("JSON file used when persist is true"),
            )
    }

    async fn init(&self, ctx: &PluginContext) -> Result<()> {
        let settings = MemorySettings::from_config(ctx.name(), &ctx.config().await)?;
        let max_messages = settings.max_messages;
        *self.settings.write() = settings;

        let tools = ctx.tools();
        tools
            .register(remember_tool(
                self.conversations.clone(),
                ctx.events().clone(),
                max_messages,
            ))
            .await?;
        tools.register(recall_tool(self.conversations.clone())).await?;
        tools.register(forget_tool(self.conversations.clone())).await?;
        tools
            .register(stats_tool(self.conversations.clone(), max_messages))
            .await?;

        let conversations = self.conversations.clone();
        ctx.events()
            .on(
                &event_name("request_output", Some(EventPhase::Start)),
                handler_fn(move |_, payload| {
                    let conversations = conversations.clone();
                    async move { Ok(append_context(&conversations, &payload).await) }
                }),
            )
            .await?;

        Ok(())
    }

    async fn on_start(&self, _ctx: &PluginContext) -> Result<()> {
        self.store_loaded.store(false, Ordering::SeqCst);
        let path = self.settings.read().persist_path().cloned();
        if let Some(path) = path {
            self.load_from_disk(&path).await?;
            self.store_loaded.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn on_stop(&self, _ctx: &PluginContext) -> Result<()> {
        let path = self.settings.read().persist_path().cloned();
        let Some(path) = path else {
            return Ok(());
        };
        if !self.store_loaded.load(Ordering::SeqCst) {
            warn!(path = %path.display(), "Stored memory was never loaded, leaving file untouched");
            return Ok(());
        }
        self.save_to_disk(&path).await
    }

    async fn on_destroy(&self, _ctx: &PluginContext) -> Result<()> {
        self.conversations.write().await.clear();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Tools
// ============================================================================

fn conversation_param() -> FieldRule {
    FieldRule::string().required().min(1.0).describe("Conversation identifier")
}

fn str_arg(args: &ConfigMap, key: &str) -> Result<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidInput(format!("missing string argument '{}'", key)))
}

fn remember_tool(conversations: Conversations, events: PluginEvents, max_messages: usize) -> ToolSpec {
    let handler = tool_fn(move |args| {
        let conversations = conversations.clone();
        let events = events.clone();
        async move {
            let conversation_id = str_arg(&args, "conversationId")?;
            let entry = MemoryEntry {
                role: str_arg(&args, "role")?,
                content: str_arg(&args, "message")?,
                timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            };

            let total = {
                let mut conversations = conversations.write().await;
                let messages = conversations.entry(conversation_id.clone()).or_default();
                messages.push(entry.clone());
                if messages.len() > max_messages {
                    let excess = messages.len() - max_messages;
                    messages.drain(..excess);
                }
                messages.len()
            };

            let mut payload = Payload::new();
            payload.insert("conversationId".into(), json!(conversation_id));
            payload.insert("role".into(), json!(entry.role));
            payload.insert("total".into(), json!(total));
            match events.emit("memory:stored", payload).await {
                Ok(outcome) if !outcome.is_success() => {
                    warn!(failures = outcome.failures.len(), "memory:stored handlers failed");
                }
                Err(e) => warn!(error = %e, "Failed to emit memory:stored"),
                Ok(_) => {}
            }

            Ok(json!({ "success": true, "memory": entry }))
        }
    });

    ToolSpec::new("remember", handler)
        .description("Store a message in a conversation")
        .category("memory")
        .param("conversationId", conversation_param())
        .param("message", FieldRule::string().required().describe("Message content"))
        .param(
            "role",
            FieldRule::string()
                .default_value(json!("user"))
                .one_of(vec![json!("user"), json!("assistant"), json!("system")]),
        )
}

fn recall_tool(conversations: Conversations) -> ToolSpec {
    let handler = tool_fn(move |args| {
        let conversations = conversations.clone();
        async move {
            let conversation_id = str_arg(&args, "conversationId")?;
            let limit = args
                .get("limit")
                .and_then(Value::as_i64)
                .unwrap_or(DEFAULT_RECALL_LIMIT)
                .max(0) as usize;

            let conversations = conversations.read().await;
            let messages = conversations
                .get(&conversation_id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let recent = &messages[messages.len().saturating_sub(limit)..];

            Ok(json!({
                "success": true,
                "conversationId": conversation_id,
                "messages": recent,
                "total": messages.len(),
            }))
        }
    });

    ToolSpec::new("recall", handler)
        .description("Return the most recent messages of a conversation")
        .category("memory")
        .param("conversationId", conversation_param())
        .param(
            "limit",
            FieldRule::integer()
                .default_value(json!(DEFAULT_RECALL_LIMIT))
                .range(1.0, 1_000.0),
        )
}

fn forget_tool(conversations: Conversations) -> ToolSpec {
    let handler = tool_fn(move |args| {
        let conversations = conversations.clone();
        async move {
            let conversation_id = str_arg(&args, "conversationId")?;
            let removed = conversations
                .write()
                .await
                .remove(&conversation_id)
                .map_or(0, |messages| messages.len());

            Ok(json!({ "success": true, "conversationId": conversation_id, "removed": removed }))
        }
    });

    ToolSpec::new("forget", handler)
        .description("Delete all messages of a conversation")
        .category("memory")
        .param("conversationId", conversation_param())
}

fn stats_tool(conversations: Conversations, max_messages: usize) -> ToolSpec {
    let handler = tool_fn(move |_| {
        let conversations = conversations.clone();
        async move {
            let conversations = conversations.read().await;
            let messages: usize = conversations.values().map(Vec::len).sum();
            Ok(json!({
                "success": true,
                "conversations": conversations.len(),
                "messages": messages,
                "maxMessages": max_messages,
            }))
        }
    });

    ToolSpec::new("stats", handler)
        .description("Report stored conversation counts")
        .category("memory")
}

// ============================================================================
// Context enhancer
// ============================================================================

/// 최근 대화를 `prompt` 뒤에 덧붙인 부분 페이로드
async fn append_context(conversations: &Conversations, payload: &Payload) -> Option<Payload> {
    let conversation_id = payload.get("conversationId")?.as_str()?;
    let prompt = payload.get("prompt").and_then(Value::as_str).unwrap_or("");

    let conversations = conversations.read().await;
    let messages = conversations.get(conversation_id)?;
    if messages.is_empty() {
        return None;
    }

    let history = messages[messages.len().saturating_sub(CONTEXT_WINDOW)..]
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n");

    let mut partial = Payload::new();
    partial.insert(
        "prompt".into(),
        json!(format!("{}\n\nConversation history:\n{}", prompt, history)),
    );
    Some(partial)
}
