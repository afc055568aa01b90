//! Per-scan cluster credentials
//!
//! An inline kubeconfig is materialized to a private temporary file that lives
//! exactly as long as the handle. Without one, kubectl resolves credentials on
//! its own (KUBECONFIG, ~/.kube/config, in-cluster service account).

use crate::error::{OrchestratorError, Result};
use crate::models::ClusterTarget;
use base64::Engine;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Scoped access to one cluster
#[derive(Debug)]
pub struct CredentialHandle {
    kubeconfig: Option<NamedTempFile>,
    context: Option<String>,
    server: Option<String>,
}

impl CredentialHandle {
    /// Use whatever kubectl finds by itself
    pub fn ambient() -> Self {
        Self {
            kubeconfig: None,
            context: None,
            server: None,
        }
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context.filter(|c| !c.is_empty());
        self
    }

    pub fn with_server(mut self, server: Option<String>) -> Self {
        self.server = server.filter(|s| !s.is_empty());
        self
    }

    pub fn kubeconfig_path(&self) -> Option<&Path> {
        self.kubeconfig.as_ref().map(|f| f.path())
    }

    pub fn is_materialized(&self) -> bool {
        self.kubeconfig.is_some()
    }

    /// Full kubectl argument list for `args` under these credentials
    pub fn command(&self, args: &[&str]) -> Vec<String> {
        let mut full = Vec::with_capacity(args.len() + 6);
        if let Some(path) = self.kubeconfig_path() {
            full.push("--kubeconfig".to_string());
            full.push(path.to_string_lossy().into_owned());
        }
        full.extend(args.iter().map(|a| a.to_string()));
        if let Some(server) = &self.server {
            full.push("--server".to_string());
            full.push(server.clone());
        }
        if let Some(context) = &self.context {
            full.push("--context".to_string());
            full.push(context.clone());
        }
        full
    }
}

/// Build credentials for a scan target
pub async fn setup_credentials(target: &ClusterTarget) -> Result<CredentialHandle> {
    let handle = match target.kubeconfig.as_deref().filter(|k| !k.trim().is_empty()) {
        Some(encoded) => {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| {
                    OrchestratorError::Validation(format!("kubeconfig is not valid base64: {e}"))
                })?;

            let file = tokio::task::spawn_blocking(move || write_kubeconfig(&decoded))
                .await
                .map_err(|e| {
                    OrchestratorError::Internal(format!("kubeconfig write task failed: {e}"))
                })??;

            debug!(cluster = %target.name, path = %file.path().display(), "Materialized kubeconfig");
            CredentialHandle {
                kubeconfig: Some(file),
                context: None,
                server: None,
            }
        }
        None => CredentialHandle::ambient(),
    };

    Ok(handle
        .with_context(target.context.clone())
        .with_server(target.cluster_url.clone()))
}

fn write_kubeconfig(contents: &[u8]) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("kubeconfig-")
        .suffix(".yaml")
        .tempfile()?;
    file.write_all(contents)?;
    file.flush()?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClusterType;

    fn target(kubeconfig: Option<&str>) -> ClusterTarget {
        ClusterTarget {
            name: "staging".to_string(),
            cluster_type: ClusterType::Gke,
            kubeconfig: kubeconfig.map(str::to_string),
            context: Some("gke_staging".to_string()),
            cluster_url: None,
        }
    }

    #[tokio::test]
    async fn test_ambient_credentials() {
        let handle = setup_credentials(&target(None)).await.unwrap();
        assert!(!handle.is_materialized());
        assert_eq!(
            handle.command(&["get", "pods"]),
            vec!["get", "pods", "--context", "gke_staging"]
        );
    }

    #[tokio::test]
    async fn test_inline_kubeconfig_is_removed_on_drop() {
        let yaml = "apiVersion: v1\nkind: Config\n";
        let encoded = base64::engine::general_purpose::STANDARD.encode(yaml);

        let handle = setup_credentials(&target(Some(&encoded))).await.unwrap();
        let path = handle.kubeconfig_path().unwrap().to_path_buf();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), yaml);

        let args = handle.command(&["get", "pods"]);
        assert_eq!(args[0], "--kubeconfig");
        assert_eq!(args[1], path.to_string_lossy());

        drop(handle);
        assert!(!path.exists());
    }

    #[test]
    fn test_server_and_context_appended() {
        let handle = CredentialHandle::ambient()
            .with_server(Some("https://10.0.0.1".to_string()))
            .with_context(Some(String::new()));
        assert_eq!(
            handle.command(&["version"]),
            vec!["version", "--server", "https://10.0.0.1"]
        );
    }

    #[tokio::test]
    async fn test_bad_base64_is_validation_error() {
        let err = setup_credentials(&target(Some("%%%"))).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Validation(_)));
    }
}
