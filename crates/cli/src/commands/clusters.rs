//! Cluster discovery CLI commands

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::client::{ApiClient, ClusterList};
use crate::output::{print_json, print_table, print_warning, OutputFormat};

#[derive(Tabled, Serialize)]
struct ClusterRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Context")]
    context: String,
    #[tabled(rename = "Cluster")]
    cluster: String,
    #[tabled(rename = "User")]
    user: String,
}

#[derive(Deserialize, Serialize)]
struct NamespaceList {
    namespaces: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

/// List kubeconfig contexts known to the orchestrator
pub async fn list_clusters(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let list: ClusterList = client.get("clusters").await?;
    if let OutputFormat::Json = format {
        return print_json(&list);
    }

    if let Some(error) = &list.error {
        print_warning(error);
    }
    let rows: Vec<ClusterRow> = list
        .clusters
        .into_iter()
        .map(|c| ClusterRow {
            name: c.name,
            context: c.context,
            cluster: c.cluster,
            user: c.user,
        })
        .collect();
    print_table(&rows, format);
    Ok(())
}

/// List namespaces of a context
pub async fn list_namespaces(client: &ApiClient, cluster: &str, format: OutputFormat) -> Result<()> {
    let list: NamespaceList = client.get(&format!("namespaces/{}", cluster)).await?;
    if let OutputFormat::Json = format {
        return print_json(&list);
    }

    if let Some(error) = &list.error {
        print_warning(error);
    }
    for namespace in &list.namespaces {
        println!("{}", namespace);
    }
    Ok(())
}
