//! Notification history commands

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use opsbot_lib::{history::load_entries, HistoryEntry, DEFAULT_ANOMALY_THRESHOLD};
use tabled::Tabled;

use crate::output::{color_usage, format_timestamp, print_info, print_warning, truncate, OutputFormat};

/// Row for the history table
#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "Time (UTC)")]
    time: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Remediation")]
    remediation: String,
    #[tabled(rename = "Logs")]
    logs: String,
}

/// Keep the newest `limit` entries, still oldest first
pub fn tail(entries: Vec<HistoryEntry>, limit: Option<usize>) -> Vec<HistoryEntry> {
    match limit {
        Some(limit) if entries.len() > limit => {
            let skip = entries.len() - limit;
            entries.into_iter().skip(skip).collect()
        }
        _ => entries,
    }
}

/// List recorded incidents, newest last
pub async fn show_history(path: &Path, limit: Option<usize>, format: OutputFormat) -> Result<()> {
    let entries = load_entries(path).await?;
    let total = entries.len();
    let entries = tail(entries, limit);

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&entries)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            println!("{}", "Notification History".bold());
            println!("{}", "=".repeat(60));
            println!("File: {}", path.display().to_string().cyan());
            println!();

            if entries.is_empty() {
                print_warning("No notifications recorded yet");
                return Ok(());
            }

            let rows: Vec<HistoryRow> = entries
                .iter()
                .map(|e| HistoryRow {
                    time: format_timestamp(e.timestamp),
                    cpu: color_usage(e.cpu_usage, DEFAULT_ANOMALY_THRESHOLD),
                    remediation: e.remediation.clone(),
                    logs: if e.logs.is_empty() {
                        "-".to_string()
                    } else {
                        truncate(&e.logs, 40)
                    },
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);

            if let Some(latest) = entries.last() {
                println!();
                print_info(&format!("Latest analysis: {}", latest.analysis));
            }
            println!("\nShowing {} of {} entries", entries.len(), total);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(timestamp: i64) -> HistoryEntry {
        HistoryEntry {
            timestamp,
            cpu_usage: 90.0,
            analysis: String::new(),
            logs: String::new(),
            remediation: "No action taken".to_string(),
        }
    }

    #[test]
    fn test_tail_keeps_newest_in_order() {
        let entries = (1..=5).map(entry).collect();
        let kept: Vec<i64> = tail(entries, Some(2)).iter().map(|e| e.timestamp).collect();
        assert_eq!(kept, vec![4, 5]);
    }

    #[test]
    fn test_tail_without_limit_or_short_history() {
        assert_eq!(tail((1..=3).map(entry).collect(), None).len(), 3);
        assert_eq!(tail((1..=3).map(entry).collect(), Some(10)).len(), 3);
        assert!(tail(Vec::new(), Some(0)).is_empty());
    }
}
