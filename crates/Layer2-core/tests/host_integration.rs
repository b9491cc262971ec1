//! Plugin host 통합 테스트 - 로드부터 정리까지 전체 흐름 검증
//!
//! `cargo test -p plughost-core --test host_integration`

use async_trait::async_trait;
use parking_lot::Mutex;
use plughost_core::{
    handler_fn, tool_fn, ConfigMap, Error, HostConfig, LifecycleState, MemoryPlugin, Payload,
    Plugin, PluginContext, PluginDescriptor, PluginExt, PluginHost, PluginManifest, Result,
    StaticResolver, ToolSpec,
};
use serde_json::{json, Value};
use std::any::Any;
use std::sync::Arc;

// ============================================================================
// 테스트용 플러그인
// ============================================================================

/// `request_output:start`에서 prompt를 바꾸거나 관찰하는 플러그인
struct PromptPlugin {
    name: String,
    override_prompt: Option<String>,
    seen: Arc<Mutex<Vec<String>>>,
    fail_init: bool,
    fail_stop: bool,
}

impl PromptPlugin {
    fn new(name: &str, seen: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            override_prompt: None,
            seen,
            fail_init: false,
            fail_stop: false,
        }
    }
}

#[async_trait]
impl Plugin for PromptPlugin {
    fn manifest(&self) -> PluginManifest {
        PluginManifest::new(&self.name)
    }

    async fn init(&self, ctx: &PluginContext) -> Result<()> {
        ctx.tools()
            .register(ToolSpec::new(
                "echo",
                tool_fn(|args| async move { Ok(Value::Object(args)) }),
            ))
            .await?;

        let seen = self.seen.clone();
        let name = self.name.clone();
        let override_prompt = self.override_prompt.clone();
        ctx.events()
            .on(
                "request_output:start",
                handler_fn(move |_, payload| {
                    let seen = seen.clone();
                    let name = name.clone();
                    let override_prompt = override_prompt.clone();
                    async move {
                        let prompt = payload
                            .get("prompt")
                            .and_then(Value::as_str)
                            .unwrap_or_default();
                        seen.lock().push(format!("{}:{}", name, prompt));

                        Ok(override_prompt.map(|p| {
                            let mut partial = Payload::new();
                            partial.insert("prompt".into(), json!(p));
                            partial
                        }))
                    }
                }),
            )
            .await?;

        if self.fail_init {
            return Err(Error::Plugin("init failed on purpose".into()));
        }
        Ok(())
    }

    async fn on_stop(&self, _ctx: &PluginContext) -> Result<()> {
        if self.fail_stop {
            return Err(Error::Plugin("stop failed on purpose".into()));
        }
        Ok(())
    }

    async fn on_destroy(&self, _ctx: &PluginContext) -> Result<()> {
        self.seen.lock().push(format!("{}:destroyed", self.name));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn host_with_prompt_plugins(seen: &Arc<Mutex<Vec<String>>>) -> PluginHost {
    let mut resolver = StaticResolver::with_builtins();

    let s = seen.clone();
    resolver.register("test:override", move |config: &ConfigMap| {
        let mut plugin = PromptPlugin::new("override", s.clone());
        plugin.override_prompt = config
            .get("prompt")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Arc::new(plugin) as Arc<dyn Plugin>)
    });

    let s = seen.clone();
    resolver.register("test:observer", move |_: &ConfigMap| {
        Ok(Arc::new(PromptPlugin::new("observer", s.clone())) as Arc<dyn Plugin>)
    });

    let s = seen.clone();
    resolver.register("test:broken-init", move |_: &ConfigMap| {
        let mut plugin = PromptPlugin::new("broken", s.clone());
        plugin.fail_init = true;
        Ok(Arc::new(plugin) as Arc<dyn Plugin>)
    });

    let s = seen.clone();
    resolver.register("test:broken-stop", move |_: &ConfigMap| {
        let mut plugin = PromptPlugin::new("sticky", s.clone());
        plugin.fail_stop = true;
        Ok(Arc::new(plugin) as Arc<dyn Plugin>)
    });

    PluginHost::with_config(HostConfig::new(), Arc::new(resolver))
}

fn memory_descriptor() -> PluginDescriptor {
    PluginDescriptor::new("memory", "builtin:memory").with_setting("persist", json!(false))
}

// ============================================================================
// 시나리오
// ============================================================================

#[tokio::test]
async fn test_memory_remember_and_recall() {
    let host = PluginHost::with_builtins(HostConfig::new());
    host.load_plugin(memory_descriptor()).await.expect("load failed");
    host.start_all().await.expect("start failed");

    let stored = host
        .invoke(
            "plugin:memory:remember",
            json!({"conversationId": "c1", "message": "hi", "role": "user"}),
        )
        .await
        .expect("remember failed");

    assert_eq!(stored["success"], true);
    assert_eq!(stored["memory"]["role"], "user");
    assert_eq!(stored["memory"]["content"], "hi");
    let timestamp = stored["memory"]["timestamp"].as_str().expect("timestamp");
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());

    let recalled = host
        .invoke(
            "plugin:memory:recall",
            json!({"conversationId": "c1", "limit": 10}),
        )
        .await
        .expect("recall failed");

    assert_eq!(recalled["total"], 1);
    let messages = recalled["messages"].as_array().expect("messages");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["content"], "hi");

    let instance = host.get_plugin("memory").await.expect("instance");
    let memory = instance
        .downcast_ref::<MemoryPlugin>()
        .expect("memory plugin");
    assert_eq!(memory.conversation("c1").await.len(), 1);
}

#[tokio::test]
async fn test_memory_tools_require_started_plugin() {
    let host = PluginHost::with_builtins(HostConfig::new());
    host.load_plugin(memory_descriptor()).await.unwrap();
    host.manager().initialize("memory").await.unwrap();

    let err = host
        .invoke(
            "plugin:memory:recall",
            json!({"conversationId": "c1"}),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotReady { ref state, .. } if state == "initialized"));
}

#[tokio::test]
async fn test_memory_config_validation() {
    let host = PluginHost::with_builtins(HostConfig::new());
    let err = host
        .load_plugin(
            PluginDescriptor::new("memory", "builtin:memory").with_setting("maxMessages", json!(0)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Config { ref field, .. } if field == "maxMessages"));
    assert_eq!(host.state("memory").await, Some(LifecycleState::Failed));
}

#[tokio::test]
async fn test_unknown_tool_leaves_registry_unchanged() {
    let host = PluginHost::with_builtins(HostConfig::new());
    host.load_plugin(memory_descriptor()).await.unwrap();
    host.start_all().await.unwrap();
    let before = host.tools().len().await;

    let err = host
        .invoke("plugin:ghost:query", json!({}))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ToolNotFound(ref name) if name == "plugin:ghost:query"));
    assert_eq!(host.tools().len().await, before);
}

#[tokio::test]
async fn test_publish_order_and_prompt_override() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let host = host_with_prompt_plugins(&seen);

    host.load_plugin(
        PluginDescriptor::new("override", "test:override").with_setting("prompt", json!("X")),
    )
    .await
    .unwrap();
    host.load_plugin(PluginDescriptor::new("observer", "test:observer"))
        .await
        .unwrap();
    host.start_all().await.unwrap();

    let mut payload = Payload::new();
    payload.insert("prompt".into(), json!("original"));
    let result = host
        .publish("request_output:start", payload)
        .await
        .expect("publish failed");

    assert_eq!(result["prompt"], "X");
    assert_eq!(
        seen.lock().clone(),
        vec!["override:original".to_string(), "observer:X".to_string()]
    );
}

#[tokio::test]
async fn test_memory_appends_context_to_prompt() {
    let host = PluginHost::with_builtins(HostConfig::new());
    host.load_plugin(memory_descriptor()).await.unwrap();
    host.start_all().await.unwrap();

    host.invoke(
        "plugin:memory:remember",
        json!({"conversationId": "c1", "message": "my name is Sam"}),
    )
    .await
    .unwrap();

    let mut payload = Payload::new();
    payload.insert("conversationId".into(), json!("c1"));
    payload.insert("prompt".into(), json!("Who am I?"));
    let result = host.publish("request_output:start", payload).await.unwrap();

    let prompt = result["prompt"].as_str().unwrap();
    assert!(prompt.starts_with("Who am I?"));
    assert!(prompt.contains("user: my name is Sam"));
}

#[tokio::test]
async fn test_memory_stored_event_reaches_subscribers() {
    let host = PluginHost::with_builtins(HostConfig::new());
    host.load_plugin(memory_descriptor()).await.unwrap();
    host.start_all().await.unwrap();

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    host.events()
        .subscribe(
            "memory:stored",
            "runtime",
            handler_fn(move |_, payload| {
                let sink = sink.clone();
                async move {
                    sink.lock().push(payload);
                    Ok(None)
                }
            }),
        )
        .await;

    host.invoke(
        "plugin:memory:remember",
        json!({"conversationId": "c9", "message": "hello"}),
    )
    .await
    .unwrap();

    let received = received.lock();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["conversationId"], "c9");
    assert_eq!(received[0]["role"], "user");
}

#[tokio::test]
async fn test_failed_init_rolls_back_tools() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let host = host_with_prompt_plugins(&seen);
    host.load_plugin(PluginDescriptor::new("broken", "test:broken-init"))
        .await
        .unwrap();
    host.load_plugin(PluginDescriptor::new("observer", "test:observer"))
        .await
        .unwrap();

    let report = host.start_all().await.expect("continue on error");
    assert_eq!(report.started, vec!["observer"]);
    assert_eq!(report.failed.len(), 1);

    assert_eq!(host.state("broken").await, Some(LifecycleState::Failed));
    assert!(!host.tools().contains("plugin:broken:echo").await);
    assert!(host.tools().contains("plugin:observer:echo").await);
    assert_eq!(host.events().plugin_subscription_count("broken").await, 0);
}

#[tokio::test]
async fn test_stop_error_still_destroys() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let host = host_with_prompt_plugins(&seen);
    host.load_plugin(PluginDescriptor::new("sticky", "test:broken-stop"))
        .await
        .unwrap();
    host.start_all().await.unwrap();

    let report = host.stop_all().await;
    assert_eq!(report.stopped, vec!["sticky"]);
    assert_eq!(report.destroyed, vec!["sticky"]);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(host.state("sticky").await, Some(LifecycleState::Destroyed));
    assert!(seen.lock().contains(&"sticky:destroyed".to_string()));
    assert!(host.tools().is_empty().await);
}

#[tokio::test]
async fn test_dependency_cycle_and_ordering() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let host = host_with_prompt_plugins(&seen);
    host.load_plugin(PluginDescriptor::new("override", "test:override").depends_on("observer"))
        .await
        .unwrap();
    host.load_plugin(PluginDescriptor::new("observer", "test:observer").depends_on("override"))
        .await
        .unwrap();

    let err = host.start_all().await.unwrap_err();
    match err {
        Error::DependencyCycle(path) => {
            assert_eq!(path.first(), path.last());
            assert!(path.contains(&"override".to_string()));
            assert!(path.contains(&"observer".to_string()));
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(host.state("override").await, Some(LifecycleState::Loaded));

    let ordered = host_with_prompt_plugins(&seen);
    ordered
        .load_plugin(PluginDescriptor::new("override", "test:override").depends_on("observer"))
        .await
        .unwrap();
    ordered
        .load_plugin(PluginDescriptor::new("observer", "test:observer"))
        .await
        .unwrap();
    let report = ordered.start_all().await.unwrap();
    assert_eq!(report.started, vec!["observer", "override"]);
}

#[tokio::test]
async fn test_memory_persists_across_hosts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memory").join("store.json");
    let descriptor = || {
        PluginDescriptor::new("memory", "builtin:memory")
            .with_setting("persist", json!(true))
            .with_setting("storagePath", json!(path.to_string_lossy()))
    };

    let first = PluginHost::with_builtins(HostConfig::new());
    first.load_plugin(descriptor()).await.unwrap();
    first.start_all().await.unwrap();
    first
        .invoke(
            "plugin:memory:remember",
            json!({"conversationId": "c1", "message": "keep me"}),
        )
        .await
        .unwrap();
    let report = first.stop_all().await;
    assert!(report.errors.is_empty());
    assert!(path.exists());

    let second = PluginHost::with_builtins(HostConfig::new());
    second.load_plugin(descriptor()).await.unwrap();
    second.start_all().await.unwrap();
    let recalled = second
        .invoke("plugin:memory:recall", json!({"conversationId": "c1"}))
        .await
        .unwrap();
    assert_eq!(recalled["total"], 1);
    assert_eq!(recalled["messages"][0]["content"], "keep me");
}

#[tokio::test]
async fn test_unreadable_store_survives_teardown() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    // 올바른 JSON이지만 대화별 메시지 배열이 아님
    let original = r#"{"c1": {"role": "user", "content": "kept"}}"#;
    std::fs::write(&path, original).unwrap();

    let host = PluginHost::with_builtins(HostConfig::new());
    host.load_plugin(
        PluginDescriptor::new("memory", "builtin:memory")
            .with_setting("persist", json!(true))
            .with_setting("storagePath", json!(path.to_string_lossy())),
    )
    .await
    .unwrap();

    let report = host.start_all().await.unwrap();
    assert_eq!(report.failed.len(), 1);
    assert!(matches!(report.failed[0].1, Error::Json(_)));
    assert_eq!(host.state("memory").await, Some(LifecycleState::Failed));

    host.stop_all().await;
    assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
}
