use crate::support::{fail, open_existing_or_exit, print_json};
use lnp_kernel::EngineConfig;
use lnp_store::{BatchResult, EngineError, Gateway, read_documents_from_path};
use serde_json::{Value, json};

enum Outcome {
    Applied(BatchResult),
    Failed(EngineError),
}

pub fn run(input: String, db: String, config: &EngineConfig, json_output: bool) {
    let documents =
        read_documents_from_path(&input).unwrap_or_else(|e| fail(format!("{input}: {e}")));
    let mut conn = open_existing_or_exit(&db, config);
    let gateway = Gateway::new(config);

    let outcomes: Vec<(usize, Outcome)> = documents
        .iter()
        .map(|numbered| {
            let outcome = match gateway.submit_with_retry(&mut conn, &numbered.document) {
                Ok(result) => Outcome::Applied(result),
                Err(err) => {
                    tracing::warn!(line = numbered.line, error = %err, "document failed");
                    Outcome::Failed(err)
                }
            };
            (numbered.line, outcome)
        })
        .collect();
    let failed = outcomes
        .iter()
        .filter(|(_, outcome)| matches!(outcome, Outcome::Failed(_)))
        .count();

    if json_output {
        let items: Vec<Value> = outcomes
            .iter()
            .map(|(line, outcome)| match outcome {
                Outcome::Applied(result) => json!({"line": line, "result": result}),
                Outcome::Failed(err) => json!({
                    "line": line,
                    "error": err.to_string(),
                    "retryable": err.is_retryable(),
                }),
            })
            .collect();
        print_json(&json!({
            "action": "submit",
            "input": input,
            "documents": items,
            "failed": failed,
        }));
    } else {
        println!("lnpgw submit {input}");
        println!();
        for (line, outcome) in &outcomes {
            match outcome {
                Outcome::Applied(result) => {
                    let report = result.report();
                    let shape = if result.is_complete() { "complete" } else { "partial" };
                    println!(
                        "  line {line}: {shape}, {} correlated, {} rejected, {} out of sequence, {} messages",
                        report.correlation.len(),
                        report.rejected.len(),
                        report.out_of_sequence.len(),
                        report.messages.len(),
                    );
                    for (tn, key) in &report.correlation {
                        println!("    {tn} -> {key}");
                    }
                    for rejection in &report.rejected {
                        println!("    {} rejected: {}", rejection.tn, rejection.reason);
                    }
                    for tn in &report.out_of_sequence {
                        println!("    {tn} out of sequence");
                    }
                }
                Outcome::Failed(err) => println!("  line {line}: failed: {err}"),
            }
        }
    }

    if failed > 0 {
        std::process::exit(1);
    }
}
