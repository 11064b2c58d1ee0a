//! Process configuration, read once at start-up.

use std::{env, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::network::MinaNetwork;

const NETWORK_ENV: &str = "ZKPF_MINA_NETWORK";
const GRAPHQL_URL_ENV: &str = "ZKPF_MINA_GRAPHQL_URL";
const CACHE_DIR_ENV: &str = "ZKPF_PROVER_CACHE_DIR";
const WORKER_ENV: &str = "ZKPF_PROVER_WORKER";
const TIMEOUT_ENV: &str = "ZKPF_PROVER_TIMEOUT_SECS";
const DEFAULT_CACHE_DIR: &str = "/tmp/zkpf-mina-prover";

/// Prover configuration.
#[derive(Clone, Debug, Serialize)]
pub struct ProverConfig {
    /// Network every request in this process must target.
    pub network: MinaNetwork,
    /// GraphQL endpoint override.
    pub graphql_url: Option<String>,
    /// Compilation cache and invocation counter location.
    pub cache_dir: PathBuf,
    /// Command line of the external compile/prove worker.
    pub worker_command: Vec<String>,
    /// Upper bound on one proof; `None` waits for the engine indefinitely.
    pub proof_timeout: Option<Duration>,
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            network: MinaNetwork::default(),
            graphql_url: None,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            worker_command: Vec::new(),
            proof_timeout: None,
        }
    }
}

impl ProverConfig {
    /// Load configuration from environment variables, after reading `.env`
    /// if one exists.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let network = match env::var(NETWORK_ENV) {
            Ok(value) => value
                .parse::<MinaNetwork>()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("invalid {NETWORK_ENV}"))?,
            Err(_) => MinaNetwork::default(),
        };

        let graphql_url = env::var(GRAPHQL_URL_ENV).ok().filter(|s| !s.is_empty());

        let cache_dir = env::var(CACHE_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CACHE_DIR));

        let worker_command = env::var(WORKER_ENV)
            .map(|s| parse_command(&s))
            .unwrap_or_default();

        let proof_timeout = match env::var(TIMEOUT_ENV) {
            Ok(value) => Some(Duration::from_secs(
                value
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid {TIMEOUT_ENV}: {value}"))?,
            )),
            Err(_) => None,
        };

        Ok(Self {
            network,
            graphql_url,
            cache_dir,
            worker_command,
            proof_timeout,
        })
    }
}

fn parse_command(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}
