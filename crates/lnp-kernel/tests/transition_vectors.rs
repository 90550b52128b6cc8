//! Fixture-driven transition table checks.
//!
//! `tests/fixtures/transitions.json` lists one case per row: the current
//! status (or `null` for no subscription), the event, and the expected
//! transition. The local SPID is always the new provider.

use lnp_kernel::{
    Effect, NotificationKind, RequestKind, SvEvent, SvStatus, SvView, Transition,
    TransitionError, transition,
};
use serde_json::{Value, json};
use std::path::PathBuf;

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/transitions.json")
}

fn parse<T: serde::de::DeserializeOwned>(value: &Value, case: &str) -> T {
    serde_json::from_value(value.clone())
        .unwrap_or_else(|e| panic!("case {case:?}: cannot parse {value}: {e}"))
}

fn view(case: &Value, name: &str) -> Option<SvView> {
    if case["from"].is_null() {
        return None;
    }
    let last_request_type = case
        .get("lastRequestType")
        .map(|v| parse::<RequestKind>(v, name));
    Some(SvView {
        status: parse::<SvStatus>(&case["from"], name),
        spid: "1111".to_string(),
        onsp: Some("2222".to_string()),
        nnsp: Some("1111".to_string()),
        last_request_type,
        activated: false,
    })
}

fn event(case: &Value, name: &str) -> SvEvent {
    let event = &case["event"];
    if let Some(request) = event.get("request") {
        return SvEvent::Request(parse::<RequestKind>(request, name));
    }
    SvEvent::Notification {
        kind: parse::<NotificationKind>(&event["notification"], name),
        reported: event.get("reported").map(|v| parse::<SvStatus>(v, name)),
        immediate_activation: event["immediateActivation"].as_bool().unwrap_or(false),
    }
}

fn describe(result: Result<Transition, TransitionError>) -> Value {
    match result {
        Ok(Transition::Insert { then }) => json!({"insert": then}),
        Ok(Transition::Recreate) => json!("recreate"),
        Ok(Transition::Ignore) => json!("ignore"),
        Ok(Transition::Update(update)) => {
            let effects: Vec<Value> = update
                .effects
                .iter()
                .map(|effect: &Effect| serde_json::to_value(effect).expect("effect serializes"))
                .collect();
            json!({"update": update.next, "effects": effects})
        }
        Err(TransitionError::Invalid { .. }) => json!({"error": "invalid"}),
        Err(TransitionError::UnknownSubscription { .. }) => json!({"error": "unknown"}),
        Err(TransitionError::MissingStatus { .. }) => json!({"error": "missing-status"}),
    }
}

#[test]
fn transition_table_vectors() {
    let path = fixture_path();
    let text = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("failed to read {}: {e}", path.display()));
    let cases: Vec<Value> = serde_json::from_str(&text)
        .unwrap_or_else(|e| panic!("failed to parse {}: {e}", path.display()));
    assert!(!cases.is_empty());

    for case in &cases {
        let name = case["name"].as_str().expect("case should be named");
        let current = view(case, name);
        let got = describe(transition(current.as_ref(), &event(case, name)));
        assert_eq!(
            got,
            case["expect"],
            "\n\nCase: {name}\n\nGot:\n{}\n\nExpected:\n{}\n",
            serde_json::to_string_pretty(&got).expect("json"),
            serde_json::to_string_pretty(&case["expect"]).expect("json"),
        );
    }
}
