use super::*;
use crate::capabilities::{DirectoryStore, register_builtins};
use crate::config::Config;
use crate::protocol::Outcome;
use crate::registry::CapabilityRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::BufReader;

fn builtin_dispatcher() -> Dispatcher {
    let mut registry = CapabilityRegistry::new();
    let store = Arc::new(DirectoryStore::seeded());
    register_builtins(&mut registry, store, &Config::default()).expect("registration succeeds");
    Dispatcher::new(Arc::new(registry))
}

async fn run_session(input: &str) -> Vec<ResponseEnvelope> {
    let mut output = Vec::new();
    serve_connection(
        builtin_dispatcher(),
        BufReader::new(input.as_bytes()),
        &mut output,
    )
    .await
    .expect("serve loop completes");

    let text = String::from_utf8(output).expect("output is UTF-8");
    text.lines()
        .map(|line| serde_json::from_str(line).expect("response line parses"))
        .collect()
}

#[tokio::test]
async fn echo_round_trip_over_stdio() {
    let input = r#"{"capabilityName":"echo","kind":"tool","payload":{"message":"hi","timestamp":false},"correlationId":"1"}
"#;

    let responses = run_session(input).await;

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].correlation_id, CorrelationId::new("1"));
    match &responses[0].outcome {
        Outcome::Success { value } => {
            assert_eq!(value["message"], "hi");
        }
        Outcome::Failure { message, .. } => panic!("unexpected failure: {}", message),
    }
}

#[tokio::test]
async fn blank_lines_are_ignored() {
    let input = "\n\n{\"capabilityName\":\"users\",\"kind\":\"resource\",\"correlationId\":\"2\"}\n\n";

    let responses = run_session(input).await;

    assert_eq!(responses.len(), 1);
    assert!(responses[0].outcome.is_success());
}

#[tokio::test]
async fn malformed_line_yields_failure_not_crash() {
    let input = "this is not json\n{\"capabilityName\":\"echo\",\"kind\":\"tool\",\"payload\":{\"message\":\"still up\"},\"correlationId\":\"3\"}\n";

    let responses = run_session(input).await;
    assert_eq!(responses.len(), 2);

    let by_id: HashMap<String, &ResponseEnvelope> = responses
        .iter()
        .map(|r| (r.correlation_id.as_str().to_string(), r))
        .collect();

    // The malformed line answers with an unknown correlation token.
    let malformed = by_id.get("").expect("malformed-line response present");
    match &malformed.outcome {
        Outcome::Failure { error_kind, .. } => {
            assert_eq!(*error_kind, ErrorKind::SchemaMismatch);
        }
        Outcome::Success { .. } => panic!("expected failure outcome"),
    }

    // The well-formed request after it still succeeds.
    let ok = by_id.get("3").expect("valid response present");
    assert!(ok.outcome.is_success());
}

#[tokio::test]
async fn responses_match_requests_by_correlation_id() {
    let mut input = String::new();
    for i in 0..8 {
        input.push_str(&format!(
            "{{\"capabilityName\":\"add_numbers\",\"kind\":\"tool\",\"payload\":{{\"a\":{},\"b\":1}},\"correlationId\":\"req-{}\"}}\n",
            i, i
        ));
    }

    let responses = run_session(&input).await;
    assert_eq!(responses.len(), 8);

    // Responses may arrive in any order; correlation ids carry the match.
    for response in &responses {
        let id = response.correlation_id.as_str();
        let i: i64 = id
            .strip_prefix("req-")
            .expect("correlation id has request prefix")
            .parse()
            .expect("request index parses");
        match &response.outcome {
            Outcome::Success { value } => assert_eq!(value["sum"], i + 1),
            Outcome::Failure { message, .. } => panic!("unexpected failure: {}", message),
        }
    }
}

#[tokio::test]
async fn empty_input_terminates_cleanly() {
    let responses = run_session("").await;
    assert!(responses.is_empty());
}

#[tokio::test]
async fn unknown_capability_over_stdio() {
    let input = r#"{"capabilityName":"missing","kind":"tool","payload":{},"correlationId":"9"}
"#;

    let responses = run_session(input).await;

    assert_eq!(responses.len(), 1);
    match &responses[0].outcome {
        Outcome::Failure { error_kind, .. } => {
            assert_eq!(*error_kind, ErrorKind::UnknownCapability);
        }
        Outcome::Success { .. } => panic!("expected failure outcome"),
    }
}
