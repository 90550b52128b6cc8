use crate::support::{fail, open_existing_or_exit, parse_tn_or_exit, print_json};
use lnp_kernel::EngineConfig;
use lnp_store::{CorrelationStore, StoreError};
use serde_json::{Value, json};

pub fn run(tn: String, db: String, config: &EngineConfig, json_output: bool) {
    let tn = parse_tn_or_exit(&tn);
    let conn = open_existing_or_exit(&db, config);
    let store = CorrelationStore::new(&conn);
    let versions = store.history(&tn).unwrap_or_else(|e| fail(e));

    let details: Vec<Value> = versions
        .iter()
        .map(|sv| -> Result<Value, StoreError> {
            Ok(json!({
                "subscription": sv,
                "messages": store.messages_for(sv.reference_key)?,
                "rangeGroups": store.range_groups_for(sv.reference_key)?,
                "snapshots": store.snapshots_for(sv.reference_key)?,
            }))
        })
        .collect::<Result<_, _>>()
        .unwrap_or_else(|e| fail(e));

    if json_output {
        print_json(&json!({
            "action": "show",
            "tn": tn,
            "versions": details,
        }));
        return;
    }

    println!("lnpgw show {tn}");
    if versions.is_empty() {
        println!();
        println!("  no subscription versions");
        return;
    }
    for (sv, detail) in versions.iter().zip(&details) {
        println!();
        println!("  reference key {}: {} (spid {})", sv.reference_key, sv.status, sv.spid);
        if let Some(kind) = sv.last_request_type {
            println!("    last request: {kind}");
        }
        if let Some(object_id) = sv.object_id {
            println!("    object id: {object_id}");
        }
        let messages = detail["messages"].as_array().map_or(0, Vec::len);
        let snapshots = detail["snapshots"].as_array().map_or(0, Vec::len);
        println!("    messages: {messages}");
        println!("    snapshots: {snapshots}");
    }
}
