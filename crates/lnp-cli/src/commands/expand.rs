use crate::support::{parse_range_or_exit, print_json};
use lnp_kernel::{TnRange, expand_list};
use serde_json::json;

pub fn run(ranges: Vec<String>, json_output: bool) {
    let ranges: Vec<TnRange> = ranges.iter().map(|text| parse_range_or_exit(text)).collect();
    let tns = expand_list(&ranges);

    if json_output {
        print_json(&json!({
            "action": "expand",
            "count": tns.len(),
            "tns": tns,
        }));
    } else {
        for tn in &tns {
            println!("{tn}");
        }
    }
}
