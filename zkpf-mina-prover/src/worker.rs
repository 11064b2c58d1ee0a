//! Compiler and proving engine backed by an external worker process.
//!
//! The worker is spawned once per call with the mode (`compile` or `prove`)
//! appended to its command line. It receives one JSON request on stdin and
//! answers with one JSON line on stdout, either `{"ok": <value>}` or
//! `{"errors": ["..."]}`. Anything it prints before the last line is logged
//! and otherwise ignored; stderr is inherited.
//!
//! A proof whose caller gives up is cancelled by killing the worker.

use std::{process::Stdio, sync::Arc, time::Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::{debug, warn};

use crate::{
    compile::{CompilationArtifacts, CompilationConfig, ContractCompiler},
    engine::{ProofCallbacks, ProvingContext, ProvingEngine, TxProvingInput},
    error::CompileError,
    network::NetworkContext,
};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WorkerReply {
    Ok { ok: serde_json::Value },
    Errors { errors: Vec<String> },
}

#[derive(Clone, Debug)]
pub struct WorkerProcess {
    command: Arc<[String]>,
}

impl WorkerProcess {
    /// `command` is the program followed by its arguments.
    pub fn new(command: Vec<String>) -> Option<Self> {
        if command.is_empty() {
            return None;
        }
        Some(Self {
            command: command.into(),
        })
    }

    async fn run(&self, mode: &str, request: &serde_json::Value) -> Result<WorkerReply, String> {
        let started = Instant::now();
        let mut child = Command::new(&self.command[0])
            .args(&self.command[1..])
            .arg(mode)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("failed to spawn worker {}: {e}", self.command[0]))?;

        let input = serde_json::to_vec(request).map_err(|e| e.to_string())?;
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&input).await?;
            }
            Ok::<_, std::io::Error>(())
        };

        // stdout is drained while stdin is written, so neither pipe can fill up.
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(|e| format!("worker {mode} did not complete: {e}"))?;
        if let Err(e) = fed {
            warn!(mode, "failed to write worker stdin: {e}");
        }
        debug!(
            mode,
            status = %output.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "worker exited"
        );

        let stdout = String::from_utf8_lossy(&output.stdout);
        let Some(last_line) = stdout.lines().rev().find(|l| !l.trim().is_empty()) else {
            return Err(format!("worker {mode} exited with {} and no reply", output.status));
        };
        if !output.status.success() {
            warn!(mode, status = %output.status, "worker exited unsuccessfully");
        }

        serde_json::from_str(last_line).map_err(|e| format!("invalid worker reply: {e}"))
    }
}

#[async_trait]
impl ContractCompiler for WorkerProcess {
    async fn compile(
        &self,
        config: &CompilationConfig,
        network: &NetworkContext,
    ) -> Result<CompilationArtifacts, CompileError> {
        let started = Instant::now();
        let request = serde_json::json!({
            "network": network,
            "config": config,
        });

        match self.run("compile", &request).await.map_err(CompileError::Process)? {
            WorkerReply::Ok { ok } => {
                let mut artifacts: CompilationArtifacts = serde_json::from_value(ok)?;
                artifacts.compile_time = started.elapsed();
                Ok(artifacts)
            }
            WorkerReply::Errors { errors } => Err(CompileError::Rejected(errors)),
        }
    }
}

impl ProvingEngine for WorkerProcess {
    fn prove_transaction(
        &self,
        context: ProvingContext,
        request: &TxProvingInput,
        callbacks: ProofCallbacks,
    ) {
        let payload = serde_json::json!({
            "network": &*context.network,
            "verificationKeys": &context.artifacts.verification_keys,
            "engine": &context.artifacts.engine,
            "account": &context.account,
            "request": request,
        });
        let worker = self.clone();

        tokio::spawn(async move {
            // Dropping `run` drops the child, which kills it.
            let reply = tokio::select! {
                reply = worker.run("prove", &payload) => reply,
                _ = callbacks.cancelled() => {
                    warn!("proof cancelled, stopping worker");
                    return;
                }
            };
            let delivered = match reply {
                Ok(WorkerReply::Ok { ok }) => match ok {
                    serde_json::Value::String(tx) => callbacks.on_success(tx),
                    other => callbacks.on_failure(vec![format!(
                        "worker returned a non-string transaction: {other}"
                    )]),
                },
                Ok(WorkerReply::Errors { errors }) => callbacks.on_failure(errors),
                Err(e) => callbacks.on_failure(vec![e]),
            };
            if let Err(e) = delivered {
                debug!("proof outcome not delivered: {e}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::BTreeMap, time::Duration};

    use crate::{
        bridge::completion_bridge,
        compile::TokenEngine,
        error::BridgeError,
        network::{AccountState, MinaNetwork},
    };

    fn proving_context() -> ProvingContext {
        let network = MinaNetwork::Devnet;
        ProvingContext {
            network: Arc::new(NetworkContext {
                network,
                graphql_endpoint: network.default_graphql_endpoint().to_string(),
                reported_network_id: None,
                sync_status: None,
            }),
            artifacts: Arc::new(CompilationArtifacts {
                verification_keys: BTreeMap::new(),
                engine: TokenEngine {
                    token_address: "T1".into(),
                    derived_token_id: "tok-T1".into(),
                },
                compile_time: Duration::ZERO,
            }),
            account: AccountState {
                public_key: "T1".into(),
                token_id: "tok-T1".into(),
                balance: 0,
                nonce: 0,
                zkapp_state: None,
                verification_key_hash: None,
            },
        }
    }

    #[test]
    fn test_empty_command_is_rejected() {
        assert!(WorkerProcess::new(Vec::new()).is_none());
        assert!(WorkerProcess::new(vec!["node".into(), "worker.js".into()]).is_some());
    }

    #[test]
    fn test_reply_parsing() {
        let ok: WorkerReply = serde_json::from_str(r#"{"ok":"tx"}"#).unwrap();
        assert!(matches!(ok, WorkerReply::Ok { ok } if ok == "tx"));

        let errors: WorkerReply =
            serde_json::from_str(r#"{"errors":["insufficient balance"]}"#).unwrap();
        assert!(matches!(errors, WorkerReply::Errors { errors } if errors.len() == 1));

        assert!(serde_json::from_str::<WorkerReply>(r#"{"status":"ok"}"#).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_reads_last_line() {
        let worker = WorkerProcess::new(vec![
            "sh".into(),
            "-c".into(),
            r#"cat > /dev/null; echo "compiling..."; echo '{"ok": 42}'"#.into(),
        ])
        .unwrap();

        let reply = worker.run("compile", &serde_json::json!({})).await.unwrap();
        assert!(matches!(reply, WorkerReply::Ok { ok } if ok == 42));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_large_request_with_chatty_worker() {
        // Prints more than a pipe buffer before it reads its input.
        let worker = WorkerProcess::new(vec![
            "sh".into(),
            "-c".into(),
            r#"head -c 200000 /dev/zero | tr '\000' x; echo; cat > /dev/null; echo '{"ok": 1}'"#.into(),
        ])
        .unwrap();
        let request = serde_json::json!({ "blob": "y".repeat(200_000) });

        let reply = tokio::time::timeout(Duration::from_secs(10), worker.run("prove", &request))
            .await
            .expect("worker pipes deadlocked")
            .unwrap();
        assert!(matches!(reply, WorkerReply::Ok { ok } if ok == 1));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancelled_proof_stops_worker() {
        let worker = WorkerProcess::new(vec![
            "sh".into(),
            "-c".into(),
            r#"cat > /dev/null; sleep 30; echo '{"ok": "tx"}'"#.into(),
        ])
        .unwrap();
        let (callbacks, pending) = completion_bridge();

        let started = Instant::now();
        worker.prove_transaction(
            proving_context(),
            &crate::testing::proving_input("T1", "E1"),
            callbacks,
        );

        let limit = Duration::from_millis(100);
        let outcome = pending.wait_within(limit).await;
        assert_eq!(outcome, Err(BridgeError::TimedOut(limit)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_program() {
        let worker = WorkerProcess::new(vec!["/nonexistent/zkpf-worker".into()]).unwrap();
        let err = worker.run("prove", &serde_json::json!({})).await.unwrap_err();
        assert!(err.contains("failed to spawn worker"));
    }
}
