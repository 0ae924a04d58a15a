// JSON output for machine consumption

use serde_json::json;

use crate::executor::RunSummary;
use crate::inventory::HostPool;

/// JSON output manager: one object per event, one event per line
pub struct JsonOutput {
    verbose: bool,
    quiet: bool,
}

impl JsonOutput {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        JsonOutput { verbose, quiet }
    }

    /// Print a header for a run
    pub fn print_run_header(&self, mode: &str, hosts_count: usize) {
        if self.quiet {
            return;
        }

        let event = json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "event": "run_start",
            "mode": mode,
            "hosts_count": hosts_count,
        });

        self.emit_json(&event);
    }

    /// Print the run summary, with per-host results in verbose mode
    pub fn print_summary(&self, summary: &RunSummary, pool: &HostPool) {
        let mut event = summary_event(summary);

        if self.verbose {
            let hosts: Vec<_> = pool
                .hosts()
                .iter()
                .map(|host| {
                    json!({
                        "address": host.address,
                        "liveness": host.liveness,
                        "succeeded": host.succeeded,
                        "retries": host.retries,
                        "report": host.report,
                        "error": host.error,
                        "completed_at": host.completed_at.map(|t| t.to_rfc3339()),
                    })
                })
                .collect();

            if let Some(obj) = event.as_object_mut() {
                obj.insert("hosts".to_string(), json!(hosts));
            }
        }

        self.emit_json(&event);
    }

    /// Emit a JSON object as a single line (NDJSON format)
    fn emit_json(&self, value: &serde_json::Value) {
        if let Ok(json_str) = serde_json::to_string(value) {
            println!("{}", json_str);
        }
    }
}

fn summary_event(summary: &RunSummary) -> serde_json::Value {
    json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "event": "run_complete",
        "summary": summary,
    })
}
