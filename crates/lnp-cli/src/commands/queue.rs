use crate::support::{fail, open_existing_or_exit, print_json};
use lnp_kernel::EngineConfig;
use lnp_store::CorrelationStore;
use serde_json::json;

pub fn run(db: String, config: &EngineConfig, json_output: bool) {
    let conn = open_existing_or_exit(&db, config);
    let entries = CorrelationStore::new(&conn)
        .queue_entries()
        .unwrap_or_else(|e| fail(e));

    if json_output {
        print_json(&json!({
            "action": "queue",
            "count": entries.len(),
            "entries": entries,
        }));
    } else {
        println!("lnpgw queue ({} queued)", entries.len());
        for entry in &entries {
            let tns = entry
                .body
                .get("tnRange")
                .or_else(|| entry.body.get("tn"))
                .and_then(|v| v.as_str())
                .unwrap_or("?");
            println!(
                "  #{} message {} {} {}",
                entry.queue_id, entry.message_key, entry.request_type, tns
            );
        }
    }
}
