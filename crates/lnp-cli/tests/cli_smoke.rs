use serde_json::Value;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

struct TempDirGuard {
    path: PathBuf,
}

impl TempDirGuard {
    fn new(prefix: &str) -> Self {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "lnp-cli-{prefix}-{}-{unique}",
            std::process::id()
        ));
        fs::create_dir_all(&path).expect("temp dir should be created");
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

fn run_lnpgw<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let bin = env!("CARGO_BIN_EXE_lnpgw");
    Command::new(bin)
        .args(args)
        .env_remove("LNPGW_LOG")
        .output()
        .expect("lnpgw command should execute")
}

fn assert_success(output: &Output) {
    if !output.status.success() {
        panic!(
            "command failed with status {:?}\nstdout:\n{}\nstderr:\n{}",
            output.status.code(),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );
    }
}

fn assert_failure(output: &Output) {
    if output.status.success() {
        panic!(
            "command unexpectedly succeeded\nstdout:\n{}\nstderr:\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );
    }
}

fn parse_json_stdout(output: &Output) -> Value {
    serde_json::from_slice::<Value>(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout should be JSON: {e}\nstdout:\n{}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

fn init_store(tmp: &TempDirGuard) -> PathBuf {
    let db = tmp.path().join("lnp.sqlite");
    let output = run_lnpgw([
        OsString::from("init"),
        OsString::from("--db"),
        db.as_os_str().to_os_string(),
        OsString::from("--json"),
    ]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["createdStore"], true);
    db
}

#[test]
fn expand_json_smoke() {
    let output = run_lnpgw(["expand", "530-012-0098-0101", "530-012-0200", "--json"]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["count"], 5);
    assert_eq!(payload["tns"][0], "530-012-0098");
    assert_eq!(payload["tns"][4], "530-012-0200");
}

#[test]
fn collapse_json_smoke() {
    let output = run_lnpgw([
        "collapse",
        "530-012-8393",
        "530-012-8391",
        "530-012-8392",
        "--json",
    ]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["ranges"][0]["range"], "530-012-8391-8393");
    assert_eq!(payload["ranges"][0]["count"], 3);
    assert_eq!(payload["ranges"][0]["parts"]["npaNxx"], "530012");
}

#[test]
fn malformed_tn_fails() {
    let output = run_lnpgw(["collapse", "530-12-8393"]);
    assert_failure(&output);
    assert!(String::from_utf8_lossy(&output.stderr).contains("error:"));
}

#[test]
fn submit_show_and_queue_roundtrip() {
    let tmp = TempDirGuard::new("submit");
    let db = init_store(&tmp);
    let input = tmp.path().join("inbound.jsonl");
    fs::write(
        &input,
        concat!(
            "# create a range, then acknowledge one TN\n",
            r#"{"kind":"request","requestType":"SvCreateRequest","spid":"1111","subscription":{"tnRange":"530-012-0001-0003"}}"#,
            "\n",
            r#"{"kind":"notification","notificationType":"CreateAck","spid":"1111","subscription":{"tn":"530-012-0002"},"invokeId":10}"#,
            "\n",
        ),
    )
    .expect("input should be written");

    let output = run_lnpgw([
        OsString::from("submit"),
        input.as_os_str().to_os_string(),
        OsString::from("--db"),
        db.as_os_str().to_os_string(),
        OsString::from("--json"),
    ]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["failed"], 0);
    assert_eq!(payload["documents"][0]["line"], 2);
    assert_eq!(payload["documents"][0]["result"]["outcome"], "complete");
    let correlation = payload["documents"][0]["result"]["report"]["correlation"]
        .as_object()
        .expect("correlation should be an object");
    assert_eq!(correlation.len(), 3);

    let output = run_lnpgw([
        OsString::from("show"),
        OsString::from("530-012-0002"),
        OsString::from("--db"),
        db.as_os_str().to_os_string(),
        OsString::from("--json"),
    ]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["versions"][0]["subscription"]["status"], "pending");
    assert_eq!(
        payload["versions"][0]["messages"][0]["tns"],
        "530-012-0001-0003"
    );

    let output = run_lnpgw([
        OsString::from("queue"),
        OsString::from("--db"),
        db.as_os_str().to_os_string(),
        OsString::from("--json"),
    ]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["count"], 1);
    assert_eq!(payload["entries"][0]["requestType"], "SvCreateRequest");
}

#[test]
fn submit_reports_failed_documents() {
    let tmp = TempDirGuard::new("submit-fail");
    let db = init_store(&tmp);
    let input = tmp.path().join("inbound.jsonl");
    fs::write(
        &input,
        concat!(
            r#"{"kind":"notification","notificationType":"Sending","spid":"1111","subscription":{"tn":"530-012-0001"}}"#,
            "\n",
        ),
    )
    .expect("input should be written");

    let output = run_lnpgw([
        OsString::from("submit"),
        input.as_os_str().to_os_string(),
        OsString::from("--db"),
        db.as_os_str().to_os_string(),
        OsString::from("--json"),
    ]);
    assert_failure(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["failed"], 1);
    assert_eq!(payload["documents"][0]["retryable"], false);
}

#[test]
fn show_requires_existing_store() {
    let tmp = TempDirGuard::new("missing");
    let db = tmp.path().join("absent.sqlite");
    let output = run_lnpgw([
        OsString::from("show"),
        OsString::from("530-012-0001"),
        OsString::from("--db"),
        db.as_os_str().to_os_string(),
    ]);
    assert_failure(&output);
    assert!(!db.exists());
}
