use lnp_kernel::{EngineConfig, TelephoneNumber, TnRange};
use rusqlite::Connection;
use serde_json::Value;
use std::path::Path;

pub const DEFAULT_DB_PATH: &str = ".lnp/lnp.sqlite";

pub fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("error: {message}");
    std::process::exit(1);
}

pub fn load_config_or_exit(path: Option<&str>) -> EngineConfig {
    match path {
        Some(path) => EngineConfig::load(path).unwrap_or_else(|e| fail(e)),
        None => EngineConfig::default(),
    }
}

/// Open an existing store; `init` is the only command that creates one.
pub fn open_existing_or_exit(db: &str, config: &EngineConfig) -> Connection {
    if !Path::new(db).is_file() {
        fail(format!("store not found: {db} (run `lnpgw init --db {db}`)"));
    }
    lnp_store::open_connection(db, &config.store)
        .unwrap_or_else(|e| fail(format!("failed to open {db}: {e}")))
}

pub fn parse_tn_or_exit(text: &str) -> TelephoneNumber {
    text.parse().unwrap_or_else(|e| fail(e))
}

pub fn parse_range_or_exit(text: &str) -> TnRange {
    text.parse().unwrap_or_else(|e| fail(e))
}

pub fn print_json(payload: &Value) {
    match serde_json::to_string_pretty(payload) {
        Ok(text) => println!("{text}"),
        Err(e) => fail(format!("json serialization: {e}")),
    }
}

pub fn yes_no(ok: bool) -> &'static str {
    if ok { "yes" } else { "no" }
}
