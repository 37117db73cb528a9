use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use converse_core::config::Config;
use converse_core::{
    ContentPart, InvocationRequest, InvokeError, Message, ProviderError, Role, TokenUsage,
    ToolCall, ToolCallFunction, ToolChoice, ToolDefinition,
};
use invoker::{ObservedInvoker, ResponseCache, RetryPolicy, TruncationPolicy};
use llm::{
    ContentBlock, ContentFetcher, ConversationRole, ConverseCall, ConverseMessage, ConverseReply,
    ModelProvider, ToolChoiceSpec,
};
use observability::{Level, Recorded, RecordingTracer, TraceContext};
use serde_json::json;
use tokio::time::Instant;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PRIMARY: &str = "us.amazon.nova-pro-v1:0";
const FALLBACK: &str = "us.amazon.nova-lite-v1:0";

#[derive(Default)]
struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ConverseReply, ProviderError>>>,
    calls: Mutex<Vec<ConverseCall>>,
}

impl ScriptedProvider {
    fn new(script: Vec<Result<ConverseReply, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<ConverseCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn converse(&self, call: &ConverseCall) -> Result<ConverseReply, ProviderError> {
        self.calls.lock().unwrap().push(call.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::new("ScriptExhausted", "no scripted reply")))
    }
}

struct StaticFetcher;

#[async_trait]
impl ContentFetcher for StaticFetcher {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>, InvokeError> {
        Ok(vec![0x89, 0x50, 0x4E, 0x47])
    }
}

fn ok(text: &str) -> Result<ConverseReply, ProviderError> {
    Ok(ConverseReply::text(text, TokenUsage::new(100, 20)))
}

fn retry_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(20),
        max_jitter: Duration::from_millis(250),
        fallback_on_throttle: true,
    }
}

fn invoker(provider: Arc<ScriptedProvider>, tracer: Arc<RecordingTracer>) -> ObservedInvoker {
    ObservedInvoker::builder(provider)
        .tracer(tracer)
        .fetcher(Arc::new(StaticFetcher))
        .retry_policy(retry_policy())
        .build()
}

fn request(text: &str) -> InvocationRequest {
    InvocationRequest::new(PRIMARY, vec![Message::system("Be concise."), Message::user(text)])
}

fn texts(message: &ConverseMessage) -> Vec<String> {
    message
        .content
        .iter()
        .filter_map(|block| block.as_text().map(str::to_string))
        .collect()
}

#[tokio::test]
async fn should_return_result_with_consistent_usage_and_trace() {
    let provider = ScriptedProvider::new(vec![ok("Rust is a systems language.")]);
    let tracer = Arc::new(RecordingTracer::new());
    let invoker = invoker(provider.clone(), tracer.clone());

    let result = invoker.invoke(request("What is Rust?")).await.unwrap();

    assert_eq!(result.text, "Rust is a systems language.");
    assert_eq!(
        result.usage.total_tokens,
        result.usage.input_tokens + result.usage.output_tokens
    );
    assert_eq!(result.attempts, 1);
    assert_eq!(result.model_id, PRIMARY);
    assert!(result.cost.unwrap().request_cost > 0.0);

    let records = tracer.records();
    assert_eq!(records.len(), 2);
    let (start, end) = match (&records[0], &records[1]) {
        (Recorded::Start(start, _), Recorded::End(end)) => (start, end),
        other => panic!("expected start then end, got {:?}", other),
    };
    assert_eq!(start.id, end.id);
    assert_eq!(result.observation_id, Some(end.id));
    assert_eq!(result.trace_id, Some(end.trace_id));
    assert_eq!(end.name, "Bedrock Converse");
    assert_eq!(end.level, Level::Info);
    assert_eq!(end.usage, Some(TokenUsage::new(100, 20)));
    assert_eq!(end.output, Some(json!("Rust is a systems language.")));
    assert_eq!(end.metadata["attempts"], json!(1));
    assert!(end.end_time.unwrap() >= end.start_time);

    let calls = provider.calls();
    assert_eq!(calls[0].system[0].text, "Be concise.");
    assert_eq!(texts(&calls[0].messages[0]), vec!["What is Rust?"]);
}

#[tokio::test]
async fn should_mask_pii_before_provider_and_trace() {
    let provider = ScriptedProvider::new(vec![ok("Noted.")]);
    let tracer = Arc::new(RecordingTracer::new());
    let invoker = invoker(provider.clone(), tracer.clone());

    invoker
        .invoke(InvocationRequest::new(
            PRIMARY,
            vec![Message::user("My email is a@b.com")],
        ))
        .await
        .unwrap();

    assert_eq!(
        texts(&provider.calls()[0].messages[0]),
        vec!["My email is [EMAIL]"]
    );
    let traced = tracer.ended()[0].input.to_string();
    assert!(traced.contains("My email is [EMAIL]"));
    assert!(!traced.contains("a@b.com"));
}

#[tokio::test(start_paused = true)]
async fn should_back_off_once_after_throttling_then_succeed() {
    let provider = ScriptedProvider::new(vec![
        Err(ProviderError::throttled("Too many requests")),
        ok("Recovered"),
    ]);
    let invoker = ObservedInvoker::builder(provider.clone())
        .tracer(Arc::new(RecordingTracer::new()))
        .retry_policy(retry_policy())
        .build();
    let before = invoker.usage_stats().total_requests;

    let started = Instant::now();
    let result = invoker.invoke(request("Hello")).await.unwrap();
    let waited = started.elapsed();

    assert_eq!(result.text, "Recovered");
    assert_eq!(result.attempts, 2);
    assert!(waited >= Duration::from_secs(1), "waited {:?}", waited);
    assert!(waited <= Duration::from_millis(1250), "waited {:?}", waited);
    assert_eq!(invoker.usage_stats().total_requests, before + 1);
    assert_eq!(provider.calls().len(), 2);
    assert_eq!(provider.calls()[1].model_id, PRIMARY);
}

#[tokio::test(start_paused = true)]
async fn should_switch_to_fallback_model_when_throttled() {
    let provider = ScriptedProvider::new(vec![
        Err(ProviderError::throttled("Too many requests")),
        ok("From the lite model"),
    ]);
    let tracer = Arc::new(RecordingTracer::new());
    let invoker = ObservedInvoker::builder(provider.clone())
        .tracer(tracer.clone())
        .retry_policy(retry_policy())
        .fallback_model(Some(FALLBACK.to_string()))
        .build();

    let result = invoker.invoke(request("Hello")).await.unwrap();

    assert_eq!(provider.calls()[0].model_id, PRIMARY);
    assert_eq!(provider.calls()[1].model_id, FALLBACK);
    assert_eq!(result.model_id, FALLBACK);
    assert!(result.fallback_used);
    let ended = &tracer.ended()[0];
    assert_eq!(ended.model.as_deref(), Some(FALLBACK));
    assert_eq!(ended.metadata["requested_model"], json!(PRIMARY));
    assert_eq!(ended.metadata["fallback_used"], json!(true));
}

#[tokio::test(start_paused = true)]
async fn should_not_fall_back_on_service_unavailable() {
    let provider = ScriptedProvider::new(vec![
        Err(ProviderError::unavailable("try again")),
        ok("Primary again"),
    ]);
    let invoker = ObservedInvoker::builder(provider.clone())
        .retry_policy(retry_policy())
        .fallback_model(Some(FALLBACK.to_string()))
        .build();

    let result = invoker.invoke(request("Hello")).await.unwrap();

    assert_eq!(result.model_id, PRIMARY);
    assert!(!result.fallback_used);
}

#[tokio::test(start_paused = true)]
async fn should_fail_after_max_attempts_with_structured_error() {
    let provider = ScriptedProvider::new(vec![
        Err(ProviderError::throttled("1")),
        Err(ProviderError::throttled("2")),
        Err(ProviderError::throttled("3")),
        ok("never reached"),
    ]);
    let tracer = Arc::new(RecordingTracer::new());
    let invoker = invoker(provider.clone(), tracer.clone());

    let err = invoker.invoke(request("Hello")).await.unwrap_err();

    assert_eq!(
        err,
        InvokeError::Provider {
            code: "ThrottlingException".to_string(),
            message: "3".to_string(),
            retryable: true,
            attempts: 3,
        }
    );
    assert_eq!(provider.calls().len(), 3);
    assert_eq!(invoker.usage_stats().total_requests, 0);
    let ended = &tracer.ended()[0];
    assert_eq!(ended.level, Level::Error);
    assert_eq!(ended.metadata["error_code"], json!("ThrottlingException"));
}

#[tokio::test]
async fn should_propagate_non_retryable_errors_immediately() {
    let provider = ScriptedProvider::new(vec![Err(ProviderError::new(
        "AccessDeniedException",
        "not allowed",
    ))]);
    let invoker = invoker(provider.clone(), Arc::new(RecordingTracer::new()));

    let err = invoker.invoke(request("Hello")).await.unwrap_err();

    assert_eq!(err.code(), "AccessDeniedException");
    assert_eq!(err.attempts(), 1);
    assert!(!err.is_retryable());
    assert_eq!(provider.calls().len(), 1);
}

#[tokio::test]
async fn should_keep_last_two_user_messages_after_token_limit() {
    let provider = ScriptedProvider::new(vec![
        Err(ProviderError::new(
            "ValidationException",
            "Input is too long for requested model.",
        )),
        ok("Short enough now"),
    ]);
    let invoker = invoker(provider.clone(), Arc::new(RecordingTracer::new()));
    let request = InvocationRequest::new(
        PRIMARY,
        vec![
            Message::system("You are a helpful assistant."),
            Message::user("question one"),
            Message::assistant("answer one"),
            Message::user("question two"),
            Message::assistant("answer two"),
            Message::user("question three"),
        ],
    );

    let result = invoker.invoke(request).await.unwrap();

    assert_eq!(result.attempts, 2);
    assert_eq!(result.truncation.as_deref(), Some("recent_only"));
    let calls = provider.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].messages.len(), 5);
    assert_eq!(calls[1].system[0].text, "You are a helpful assistant.");
    let retried: Vec<Vec<String>> = calls[1].messages.iter().map(texts).collect();
    assert_eq!(
        retried,
        vec![vec!["question two".to_string()], vec!["question three".to_string()]]
    );
    assert!(calls[1]
        .messages
        .iter()
        .all(|m| m.role == ConversationRole::User));
}

#[tokio::test]
async fn should_stop_after_last_truncation_stage() {
    let too_long = || -> Result<ConverseReply, ProviderError> {
        Err(ProviderError::input_too_long("Input is too long"))
    };
    let provider = ScriptedProvider::new(vec![too_long(), too_long(), too_long(), too_long()]);
    let invoker = ObservedInvoker::builder(provider.clone())
        .retry_policy(RetryPolicy {
            max_attempts: 10,
            ..retry_policy()
        })
        .truncation_policy(TruncationPolicy {
            max_chars_per_message: 4,
            ..TruncationPolicy::default()
        })
        .build();

    let err = invoker
        .invoke(request("a very long question indeed"))
        .await
        .unwrap_err();

    assert!(matches!(err, InvokeError::TokenLimit { attempts: 3, .. }));
    let calls = provider.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(texts(&calls[2].messages[0]), vec!["a ve"]);
}

#[tokio::test]
async fn should_reject_invalid_request_without_calling_provider() {
    let provider = ScriptedProvider::new(vec![ok("unused")]);
    let tracer = Arc::new(RecordingTracer::new());
    let invoker = invoker(provider.clone(), tracer.clone());

    let err = invoker
        .invoke(InvocationRequest::new(PRIMARY, vec![Message::user("")]))
        .await
        .unwrap_err();

    assert!(matches!(err, InvokeError::Validation(_)));
    assert!(provider.calls().is_empty());
    assert!(tracer.records().is_empty());
}

#[tokio::test]
async fn should_succeed_when_tracer_fails() {
    let provider = ScriptedProvider::new(vec![ok("Still fine")]);
    let invoker = invoker(provider, Arc::new(RecordingTracer::failing()));

    let result = invoker.invoke(request("Hello")).await.unwrap();

    assert_eq!(result.text, "Still fine");
    assert_eq!(invoker.usage_stats().total_requests, 1);
}

#[tokio::test(start_paused = true)]
async fn should_not_record_usage_for_cancelled_call() {
    let provider = ScriptedProvider::new(vec![
        Err(ProviderError::throttled("slow down")),
        ok("too late"),
    ]);
    let tracer = Arc::new(RecordingTracer::new());
    let invoker = invoker(provider.clone(), tracer.clone());

    let outcome =
        tokio::time::timeout(Duration::from_millis(500), invoker.invoke(request("Hello"))).await;
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }

    assert!(outcome.is_err());
    assert_eq!(provider.calls().len(), 1);
    assert_eq!(invoker.usage_stats().total_requests, 0);
    assert_eq!(invoker.usage_stats().total_input_tokens, 0);
    let ended = tracer.ended();
    assert_eq!(ended.len(), 1);
    assert_eq!(ended[0].level, Level::Error);
    assert_eq!(ended[0].status_message.as_deref(), Some("cancelled"));
    assert_eq!(ended[0].metadata["cancelled"], json!(true));
}

#[tokio::test]
async fn should_serve_repeated_request_from_cache() {
    let provider = ScriptedProvider::new(vec![ok("Cached answer")]);
    let tracer = Arc::new(RecordingTracer::new());
    let invoker = ObservedInvoker::builder(provider.clone())
        .tracer(tracer.clone())
        .cache(Arc::new(ResponseCache::new(8)))
        .build();

    let first = invoker.invoke(request("Same question")).await.unwrap();
    let second = invoker.invoke(request("Same question")).await.unwrap();

    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(second.text, "Cached answer");
    assert_eq!(provider.calls().len(), 1);
    assert_eq!(invoker.usage_stats().total_requests, 1);
    let ended = tracer.ended();
    assert_eq!(ended[1].usage, None);
    assert_eq!(ended[1].metadata["cache_hit"], json!(true));
}

#[tokio::test]
async fn should_convert_tools_and_return_tool_calls() {
    let reply = ConverseReply {
        tool_calls: vec![ToolCall {
            index: 0,
            id: "tooluse_1".to_string(),
            kind: "function".to_string(),
            function: ToolCallFunction {
                name: "get_weather".to_string(),
                arguments: r#"{"city":"Lisbon"}"#.to_string(),
            },
        }],
        stop_reason: Some("tool_use".to_string()),
        ..ConverseReply::text("", TokenUsage::new(50, 10))
    };
    let provider = ScriptedProvider::new(vec![Ok(reply)]);
    let tracer = Arc::new(RecordingTracer::new());
    let invoker = invoker(provider.clone(), tracer.clone());
    let request = request("Weather in Lisbon?").with_tools(
        vec![ToolDefinition::function(
            "get_weather",
            "Current weather",
            json!({"type": "object", "properties": {"city": {"type": "string"}}}),
        )],
        ToolChoice::Any,
    );

    let result = invoker.invoke(request).await.unwrap();

    assert_eq!(result.tool_calls[0].function.name, "get_weather");
    assert_eq!(result.stop_reason.as_deref(), Some("tool_use"));
    let tool_config = provider.calls()[0].tool_config.clone().unwrap();
    assert_eq!(tool_config.tools[0].name, "get_weather");
    assert_eq!(tool_config.tool_choice, Some(ToolChoiceSpec::Any));
    let ended = &tracer.ended()[0];
    assert_eq!(ended.name, "Bedrock Converse Tool Use");
    assert_eq!(ended.output.as_ref().unwrap()["toolCalls"][0]["id"], "tooluse_1");
}

#[tokio::test]
async fn should_inline_images_and_nest_under_caller_trace() {
    let provider = ScriptedProvider::new(vec![ok("A cat.")]);
    let tracer = Arc::new(RecordingTracer::new());
    let invoker = invoker(provider.clone(), tracer.clone());
    let parent = uuid::Uuid::new_v4();
    let context = TraceContext::new().with_session("session-7").child(parent);
    let request = InvocationRequest::new(
        PRIMARY,
        vec![Message::with_parts(
            Role::User,
            vec![
                ContentPart::text("What is this?"),
                ContentPart::image_url("https://img.example.com/cat.png"),
            ],
        )],
    );

    let result = invoker.invoke_in(request, context.clone()).await.unwrap();

    assert!(matches!(
        provider.calls()[0].messages[0].content[1],
        ContentBlock::Image(_)
    ));
    assert_eq!(result.trace_id, Some(context.trace_id));
    assert_eq!(tracer.ended()[0].parent_observation_id, Some(parent));
}

#[tokio::test]
async fn should_fail_stalled_image_fetch_within_configured_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stalled.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![137u8, 80])
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;
    let provider = ScriptedProvider::new(vec![ok("unused")]);
    let tracer = Arc::new(RecordingTracer::new());
    let mut config = Config::default();
    config.llm.fetch_timeout_ms = 200;
    let invoker = ObservedInvoker::from_config(provider.clone(), tracer.clone(), &config).unwrap();
    let request = InvocationRequest::new(
        PRIMARY,
        vec![Message::with_parts(
            Role::User,
            vec![
                ContentPart::text("What is this?"),
                ContentPart::image_url(format!("{}/stalled.png", server.uri())),
            ],
        )],
    );

    let outcome = tokio::time::timeout(Duration::from_secs(5), invoker.invoke(request)).await;

    let err = outcome.expect("invocation hung on image fetch").unwrap_err();
    assert!(matches!(err, InvokeError::ContentFetch { .. }));
    assert!(provider.calls().is_empty());
    assert_eq!(tracer.ended()[0].level, Level::Error);
}
