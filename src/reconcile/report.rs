//! Human-readable load report

use super::{DiffStatus, HostStatus, Reconciliation};
use crate::record::GenerationRecord;

const RULE_WIDTH: usize = 60;

/// Render the load report for `record` and its reconciliation
pub fn render_report(record: &GenerationRecord, result: &Reconciliation) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();

    out.push_str("FMJ Metadata Load Report:\n");
    out.push_str(&format!("{}\n", rule));
    out.push_str("Full Prompt:\n");
    if record.prompt_text.is_empty() {
        out.push_str("(no prompt)\n");
    } else {
        out.push_str(&format!("{}\n", record.prompt_text));
    }

    out.push_str(&format!("\nSeed:\n   {}\n", record.seed));

    let host = &result.host;
    match host.status {
        HostStatus::Match => {
            out.push_str(&format!("\n[OK] ComfyUI version matches: {}\n", host.current));
        }
        HostStatus::Changed => {
            out.push_str(&format!(
                "\n[!!] ComfyUI version changed: {} -> {}\n",
                host.saved, host.current
            ));
        }
        HostStatus::UnknownSaved => {
            out.push_str(&format!(
                "\n[--] ComfyUI version not recorded, currently {}\n",
                host.current
            ));
        }
    }

    if !result.entries.is_empty() {
        out.push_str("\nCustom Nodes:\n");
        for entry in &result.entries {
            match entry.status {
                DiffStatus::Match => {
                    out.push_str(&format!(
                        "   [OK] {}: {}\n",
                        entry.component_name, entry.current_value
                    ));
                }
                DiffStatus::Changed | DiffStatus::MissingNow | DiffStatus::NewlyInstalled => {
                    out.push_str(&format!(
                        "   [!!] {}: {} -> {} ({})\n",
                        entry.component_name, entry.saved_value, entry.current_value, entry.status
                    ));
                }
            }
        }
    }

    if let Some(reference) = &record.snapshot_reference {
        out.push_str(&format!("\nSnapshot: {}\n", reference));
    }

    out.push_str(&format!("\n{}", rule));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::VersionFingerprint;
    use crate::reconcile::reconcile;

    fn fp(host: &str, ext: &[(&str, &str)]) -> VersionFingerprint {
        VersionFingerprint {
            host_app_version: host.to_string(),
            extensions: ext.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            ..VersionFingerprint::default()
        }
    }

    #[test]
    fn test_report_lines() {
        let saved = fp("v1.0", &[("alpha", "1"), ("beta", "2")]);
        let current = fp("v1.1", &[("alpha", "1")]);
        let record = GenerationRecord::new(saved.clone())
            .with_prompt("a castle")
            .with_seed(42u64);
        let report = render_report(&record, &reconcile(&saved, &current, "ComfyUI-Manager"));

        assert!(report.starts_with("FMJ Metadata Load Report:\n"));
        assert!(report.contains("a castle"));
        assert!(report.contains("   42"));
        assert!(report.contains("ComfyUI version changed: v1.0 -> v1.1"));
        assert!(report.contains("[OK] alpha: 1"));
        assert!(report.contains("[!!] beta: 2 -> NOT INSTALLED (MISSING_NOW)"));
        assert!(report.ends_with(&"=".repeat(60)));
    }

    #[test]
    fn test_report_empty_prompt_and_unknown_host() {
        let saved = VersionFingerprint::default();
        let current = fp("v2", &[]);
        let record = GenerationRecord::new(saved.clone());
        let report = render_report(&record, &reconcile(&saved, &current, "ComfyUI-Manager"));

        assert!(report.contains("(no prompt)"));
        assert!(report.contains("unknown"));
        assert!(report.contains("not recorded, currently v2"));
        assert!(!report.contains("Custom Nodes:"));
    }
}
