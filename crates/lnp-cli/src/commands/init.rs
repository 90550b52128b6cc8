use crate::support::{fail, print_json, yes_no};
use lnp_kernel::EngineConfig;
use lnp_store::{CorrelationStore, SCHEMA_VERSION, Table};
use serde_json::json;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct InitOutcome {
    pub db_path: PathBuf,
    pub created_store: bool,
    pub subscription_versions: i64,
}

pub fn init_store(db: impl AsRef<Path>, config: &EngineConfig) -> Result<InitOutcome, String> {
    let db_path = db.as_ref().to_path_buf();
    if db_path.exists() && !db_path.is_file() {
        return Err(format!(
            "store path exists but is not a file: {}",
            db_path.display()
        ));
    }
    let created_store = !db_path.exists();
    let conn = lnp_store::open_connection(&db_path, &config.store)
        .map_err(|e| format!("failed to initialize {}: {e}", db_path.display()))?;
    let subscription_versions = CorrelationStore::new(&conn)
        .count(Table::SubscriptionVersion)
        .map_err(|e| format!("failed to read {}: {e}", db_path.display()))?;
    tracing::info!(db = %db_path.display(), created = created_store, "store ready");
    Ok(InitOutcome {
        db_path,
        created_store,
        subscription_versions,
    })
}

pub fn run(db: String, config: &EngineConfig, json_output: bool) {
    let outcome = init_store(&db, config).unwrap_or_else(|e| fail(e));

    if json_output {
        print_json(&json!({
            "action": "init",
            "dbPath": outcome.db_path.display().to_string(),
            "createdStore": outcome.created_store,
            "schemaVersion": SCHEMA_VERSION,
            "subscriptionVersions": outcome.subscription_versions,
        }));
    } else {
        println!("lnpgw init");
        println!();
        println!("  store: {}", outcome.db_path.display());
        println!("  schema version: {SCHEMA_VERSION}");
        println!("  created store: {}", yes_no(outcome.created_store));
        println!("  subscription versions: {}", outcome.subscription_versions);
    }
}
