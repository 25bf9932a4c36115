use super::*;
use crate::protocol::{CapabilityKind, CorrelationId, ErrorKind, Outcome, Payload};
use crate::registry::{CapabilityDescriptor, CapabilityHandler, CapabilityRegistry};
use crate::schema::{FieldType, Schema};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

struct EchoHandler {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl CapabilityHandler for EchoHandler {
    async fn handle(&self, payload: Payload) -> anyhow::Result<serde_json::Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(serde_json::Value::Object(payload))
    }
}

struct FaultyHandler;

#[async_trait]
impl CapabilityHandler for FaultyHandler {
    async fn handle(&self, _payload: Payload) -> anyhow::Result<serde_json::Value> {
        anyhow::bail!("downstream unavailable")
    }
}

struct PanickingHandler;

#[async_trait]
impl CapabilityHandler for PanickingHandler {
    async fn handle(&self, _payload: Payload) -> anyhow::Result<serde_json::Value> {
        panic!("handler bug")
    }
}

struct WrongOutputHandler;

#[async_trait]
impl CapabilityHandler for WrongOutputHandler {
    async fn handle(&self, _payload: Payload) -> anyhow::Result<serde_json::Value> {
        // Violates the declared output schema: text is declared as string.
        Ok(json!({"text": 42}))
    }
}

struct NonObjectHandler;

#[async_trait]
impl CapabilityHandler for NonObjectHandler {
    async fn handle(&self, _payload: Payload) -> anyhow::Result<serde_json::Value> {
        Ok(json!("bare string"))
    }
}

fn echo_descriptor(name: &str) -> CapabilityDescriptor {
    CapabilityDescriptor {
        name: name.to_string(),
        kind: CapabilityKind::Tool,
        description: None,
        input_schema: Schema::builder().required("text", FieldType::String).build(),
        output_schema: Schema::builder().required("text", FieldType::String).build(),
    }
}

fn dispatcher_with<H: CapabilityHandler + 'static>(name: &str, handler: H) -> Dispatcher {
    let mut registry = CapabilityRegistry::new();
    registry
        .register(echo_descriptor(name), handler)
        .expect("registration succeeds");
    Dispatcher::new(Arc::new(registry))
}

fn echo_request(correlation: &str, payload: serde_json::Value) -> RequestEnvelope {
    RequestEnvelope::new(
        "echo".to_string(),
        CapabilityKind::Tool,
        payload.as_object().expect("payload is an object").clone(),
        CorrelationId::new(correlation),
    )
}

fn failure_kind(response: &ResponseEnvelope) -> ErrorKind {
    match &response.outcome {
        Outcome::Failure { error_kind, .. } => *error_kind,
        Outcome::Success { .. } => panic!("expected failure outcome"),
    }
}

#[tokio::test]
async fn valid_request_round_trips() {
    let calls = Arc::new(AtomicUsize::new(0));
    let dispatcher = dispatcher_with(
        "echo",
        EchoHandler {
            calls: Arc::clone(&calls),
        },
    );

    let response = dispatcher
        .handle(echo_request("1", json!({"text": "hi"})))
        .await;

    assert_eq!(response.correlation_id, CorrelationId::new("1"));
    match response.outcome {
        Outcome::Success { value } => assert_eq!(value, json!({"text": "hi"})),
        Outcome::Failure { message, .. } => panic!("unexpected failure: {}", message),
    }
    // Exactly one handler call per request.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_capability_is_a_failure_outcome() {
    let dispatcher = Dispatcher::new(Arc::new(CapabilityRegistry::new()));

    let request = RequestEnvelope::new(
        "missing".to_string(),
        CapabilityKind::Tool,
        Payload::new(),
        CorrelationId::new("2"),
    );
    let response = dispatcher.handle(request).await;

    assert_eq!(response.correlation_id, CorrelationId::new("2"));
    assert_eq!(failure_kind(&response), ErrorKind::UnknownCapability);
}

#[tokio::test]
async fn kind_participates_in_resolution() {
    let calls = Arc::new(AtomicUsize::new(0));
    let dispatcher = dispatcher_with("echo", EchoHandler { calls });

    // Registered as a tool; requesting it as a prompt must not resolve.
    let request = RequestEnvelope::new(
        "echo".to_string(),
        CapabilityKind::Prompt,
        Payload::new(),
        CorrelationId::new("3"),
    );
    let response = dispatcher.handle(request).await;

    assert_eq!(failure_kind(&response), ErrorKind::UnknownCapability);
}

#[tokio::test]
async fn missing_required_field_is_schema_mismatch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let dispatcher = dispatcher_with(
        "echo",
        EchoHandler {
            calls: Arc::clone(&calls),
        },
    );

    let response = dispatcher.handle(echo_request("4", json!({}))).await;

    assert_eq!(failure_kind(&response), ErrorKind::SchemaMismatch);
    match response.outcome {
        Outcome::Failure { field, .. } => assert_eq!(field.as_deref(), Some("text")),
        Outcome::Success { .. } => panic!("expected failure outcome"),
    }
    // The handler is never invoked on a payload that fails validation.
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn handler_error_becomes_handler_fault() {
    let dispatcher = dispatcher_with("echo", FaultyHandler);

    let response = dispatcher
        .handle(echo_request("5", json!({"text": "hi"})))
        .await;

    assert_eq!(failure_kind(&response), ErrorKind::HandlerFault);
    match response.outcome {
        Outcome::Failure { message, .. } => assert!(message.contains("downstream unavailable")),
        Outcome::Success { .. } => panic!("expected failure outcome"),
    }
}

#[tokio::test]
async fn handler_panic_is_contained() {
    let dispatcher = dispatcher_with("echo", PanickingHandler);

    let response = dispatcher
        .handle(echo_request("6", json!({"text": "hi"})))
        .await;

    assert_eq!(failure_kind(&response), ErrorKind::HandlerFault);
    match response.outcome {
        Outcome::Failure { message, .. } => assert!(message.contains("handler bug")),
        Outcome::Success { .. } => panic!("expected failure outcome"),
    }
}

#[tokio::test]
async fn dispatch_survives_a_faulting_handler() {
    let mut registry = CapabilityRegistry::new();
    registry
        .register(echo_descriptor("flaky"), FaultyHandler)
        .expect("registration succeeds");
    let calls = Arc::new(AtomicUsize::new(0));
    registry
        .register(
            echo_descriptor("echo"),
            EchoHandler {
                calls: Arc::clone(&calls),
            },
        )
        .expect("registration succeeds");
    let dispatcher = Dispatcher::new(Arc::new(registry));

    let mut payload = Payload::new();
    payload.insert("text".to_string(), json!("hi"));
    let faulty = RequestEnvelope::new(
        "flaky".to_string(),
        CapabilityKind::Tool,
        payload,
        CorrelationId::new("7"),
    );
    let response = dispatcher.handle(faulty).await;
    assert_eq!(failure_kind(&response), ErrorKind::HandlerFault);

    // A subsequent unrelated request still succeeds normally.
    let response = dispatcher
        .handle(echo_request("8", json!({"text": "still up"})))
        .await;
    assert!(response.outcome.is_success());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn output_schema_violation_is_reported_not_forwarded() {
    let dispatcher = dispatcher_with("echo", WrongOutputHandler);

    let response = dispatcher
        .handle(echo_request("9", json!({"text": "hi"})))
        .await;

    assert_eq!(failure_kind(&response), ErrorKind::SchemaMismatch);
    match response.outcome {
        Outcome::Failure { field, .. } => assert_eq!(field.as_deref(), Some("text")),
        Outcome::Success { .. } => panic!("expected failure outcome"),
    }
}

#[tokio::test]
async fn non_object_handler_result_is_schema_mismatch() {
    let dispatcher = dispatcher_with("echo", NonObjectHandler);

    let response = dispatcher
        .handle(echo_request("10", json!({"text": "hi"})))
        .await;

    assert_eq!(failure_kind(&response), ErrorKind::SchemaMismatch);
}

#[tokio::test]
async fn concurrent_requests_are_independent() {
    let calls = Arc::new(AtomicUsize::new(0));
    let dispatcher = dispatcher_with(
        "echo",
        EchoHandler {
            calls: Arc::clone(&calls),
        },
    );

    let mut handles = Vec::new();
    for i in 0..32 {
        let dispatcher = dispatcher.clone();
        handles.push(tokio::spawn(async move {
            let correlation = format!("req-{}", i);
            let response = dispatcher
                .handle(echo_request(&correlation, json!({"text": "hi"})))
                .await;
            assert_eq!(response.correlation_id, CorrelationId::new(correlation));
            assert!(response.outcome.is_success());
        }));
    }

    for handle in handles {
        handle.await.expect("task completes");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 32);
}

#[test]
fn phase_names_are_stable() {
    assert_eq!(DispatchPhase::Received.as_str(), "received");
    assert_eq!(DispatchPhase::Completed.as_str(), "completed");
    assert_eq!(DispatchPhase::Failed.as_str(), "failed");
}
