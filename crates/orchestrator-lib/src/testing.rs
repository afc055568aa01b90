//! Shared test doubles

use crate::collector::CommandRunner;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

type Script = Box<dyn Fn(&[String]) -> Result<String> + Send + Sync>;

/// Command runner answering from a closure and recording every call
pub struct ScriptedRunner {
    calls: Mutex<Vec<Vec<String>>>,
    script: Script,
}

impl ScriptedRunner {
    pub fn new(script: impl Fn(&[String]) -> Result<String> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            script: Box::new(script),
        })
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, args: &[String]) -> Result<String> {
        self.calls.lock().unwrap().push(args.to_vec());
        (self.script)(args)
    }
}

/// `kubectl get pods -o json` body with the given (name, phase) pairs
pub fn pod_list(namespace: &str, pods: &[(&str, &str)]) -> String {
    let items: Vec<serde_json::Value> = pods
        .iter()
        .map(|(name, phase)| {
            serde_json::json!({
                "metadata": {"name": name, "namespace": namespace, "labels": {"app": name}},
                "status": {"phase": phase}
            })
        })
        .collect();
    serde_json::json!({ "items": items }).to_string()
}

/// Value following `flag` in an argument list
pub fn arg_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}
