//! Incident reporting CLI commands

use anyhow::Result;
use colored::Colorize;

use crate::client::{ApiClient, IncidentReport, IncidentResponse};
use crate::output::{color_status, print_json, print_success, print_warning, OutputFormat};

/// Report an incident directly to the tracker
pub async fn report(
    client: &ApiClient,
    report: IncidentReport,
    format: OutputFormat,
) -> Result<()> {
    let response: IncidentResponse = client.post("incident", &report).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => match response.status.as_deref() {
            Some(status) => print_warning(&format!(
                "{} {}",
                response.jira_issue.cyan(),
                color_status(status)
            )),
            None => {
                print_success(&format!("Created {}", response.jira_issue.cyan()));
                match &response.assigned_to {
                    Some(owner) => println!("Assigned to: {}", owner),
                    None => println!("Assigned to: {}", "nobody".dimmed()),
                }
            }
        },
    }
    Ok(())
}
