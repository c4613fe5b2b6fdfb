//! Agent health commands

use anyhow::Result;
use colored::Colorize;
use opsbot_lib::ComponentStatus;
use serde_json::json;
use tabled::Tabled;

use crate::client::AgentClient;
use crate::output::{color_status, format_timestamp, print_success, print_warning, OutputFormat};

/// Row for the component table
#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Last Check (UTC)")]
    last_check: String,
}

fn status_label(status: ComponentStatus) -> &'static str {
    match status {
        ComponentStatus::Healthy => "healthy",
        ComponentStatus::Degraded => "degraded",
        ComponentStatus::Unhealthy => "unhealthy",
    }
}

/// Print the agent's liveness and readiness; fails when the agent is unhealthy
pub async fn show_health(client: &AgentClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;
    let readiness = client.readiness().await?;

    match format {
        OutputFormat::Json => {
            let combined = json!({
                "health": health.body,
                "readiness": readiness.body,
            });
            println!("{}", serde_json::to_string_pretty(&combined)?);
        }
        OutputFormat::Table => {
            println!("{}", "Agent Health".bold());
            println!("{}", "=".repeat(60));
            println!(
                "Status:     {}",
                color_status(status_label(health.body.status))
            );
            let ready = if readiness.body.ready {
                "ready"
            } else {
                "not ready"
            };
            println!("Readiness:  {}", color_status(ready));
            if let Some(reason) = &readiness.body.reason {
                println!("Reason:     {}", reason);
            }
            match health.body.last_cycle_timestamp {
                Some(ts) => println!("Last cycle: {}", format_timestamp(ts)),
                None => println!("Last cycle: {}", "none yet".dimmed()),
            }
            println!();

            let mut rows: Vec<ComponentRow> = health
                .body
                .components
                .iter()
                .map(|(name, component)| ComponentRow {
                    name: name.clone(),
                    status: color_status(status_label(component.status)),
                    message: component.message.clone().unwrap_or_else(|| "-".to_string()),
                    last_check: format_timestamp(component.last_check_timestamp),
                })
                .collect();
            rows.sort_by(|a, b| a.name.cmp(&b.name));

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!();

            match health.body.status {
                ComponentStatus::Healthy => print_success("All components healthy"),
                ComponentStatus::Degraded => {
                    print_warning("Agent is running with degraded components")
                }
                ComponentStatus::Unhealthy => {}
            }
        }
    }

    if !health.body.status.is_operational() {
        anyhow::bail!("Agent is unhealthy");
    }
    Ok(())
}
