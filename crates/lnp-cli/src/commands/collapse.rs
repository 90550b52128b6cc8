use crate::support::{parse_tn_or_exit, print_json};
use lnp_kernel::collapse;
use serde_json::json;

pub fn run(tns: Vec<String>, json_output: bool) {
    let tns = tns.iter().map(|text| parse_tn_or_exit(text));
    let ranges = collapse(tns);

    if json_output {
        let items: Vec<_> = ranges
            .iter()
            .map(|range| {
                json!({
                    "range": range,
                    "count": range.len(),
                    "parts": range.parts(),
                })
            })
            .collect();
        print_json(&json!({
            "action": "collapse",
            "ranges": items,
        }));
    } else {
        for range in &ranges {
            println!("{range}");
        }
    }
}
