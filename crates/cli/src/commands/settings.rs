//! Runtime configuration CLI commands

use anyhow::Result;
use serde::Serialize;
use serde_json::{Map, Value};
use tabled::Tabled;

use crate::client::{ApiClient, ConfigUpdateResponse};
use crate::output::{print_json, print_success, print_table, OutputFormat};

#[derive(Tabled, Serialize)]
struct SettingRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
}

fn rows(config: &Map<String, Value>) -> Vec<SettingRow> {
    let mut rows: Vec<SettingRow> = config
        .iter()
        .map(|(key, value)| SettingRow {
            key: key.clone(),
            value: match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        })
        .collect();
    rows.sort_by(|a, b| a.key.cmp(&b.key));
    rows
}

/// Turn `KEY=VALUE` pairs into a config patch. Booleans are sent as JSON booleans.
pub fn build_patch(pairs: &[(String, String)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(key, value)| {
            let value = match value.to_lowercase().as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::String(value.clone()),
            };
            (key.to_uppercase(), value)
        })
        .collect()
}

/// Show the masked runtime configuration
pub async fn show(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let config: Map<String, Value> = client.get("config").await?;
    match format {
        OutputFormat::Json => print_json(&config)?,
        OutputFormat::Table => print_table(&rows(&config), format),
    }
    Ok(())
}

/// Apply a partial update
pub async fn set(client: &ApiClient, pairs: &[(String, String)], format: OutputFormat) -> Result<()> {
    let patch = build_patch(pairs);
    let response: ConfigUpdateResponse = client.post("config", &patch).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            print_success(&format!("Updated {} setting(s)", patch.len()));
            print_table(&rows(&response.config), format);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_patch() {
        let patch = build_patch(&[
            ("jira_project".to_string(), "OPS".to_string()),
            ("ENABLE_INCIDENT_INTEGRATION".to_string(), "False".to_string()),
        ]);
        assert_eq!(patch["JIRA_PROJECT"], Value::String("OPS".to_string()));
        assert_eq!(patch["ENABLE_INCIDENT_INTEGRATION"], Value::Bool(false));
    }

    #[test]
    fn test_rows_sorted_and_unquoted() {
        let config: Map<String, Value> = serde_json::from_value(serde_json::json!({
            "JIRA_TOKEN": "****",
            "ENABLE_INCIDENT_INTEGRATION": true
        }))
        .unwrap();
        let rows = rows(&config);
        assert_eq!(rows[0].key, "ENABLE_INCIDENT_INTEGRATION");
        assert_eq!(rows[0].value, "true");
        assert_eq!(rows[1].value, "****");
    }
}
