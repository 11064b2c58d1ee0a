//! Proof orchestration.
//!
//! [`TxProver::prove`] resolves the chain context and compiled artifacts,
//! reads the token account, then runs the proving engine while holding the
//! process gate until the engine reports an outcome. Only one proof runs per
//! process at a time.
//!
//! With a proof timeout configured, an overdue proof is cancelled and the
//! gate stays held until the engine has dropped its callbacks.

use std::{sync::Arc, time::Instant};

use tracing::{error, info, instrument, warn};

use crate::{
    bridge::{completion_bridge, Completion, PendingCompletion},
    compile::{CompilationConfig, ContractCompiler},
    config::ProverConfig,
    engine::{ProvingContext, ProvingEngine, ProvingOutcome, TxProvingInput},
    error::{BridgeError, ProverError},
    network::ChainClient,
    state::ProverState,
};

/// Proves transactions against the process-wide [`ProverState`].
pub struct TxProver {
    state: Arc<ProverState>,
    chain: Arc<dyn ChainClient>,
    compiler: Arc<dyn ContractCompiler>,
    engine: Arc<dyn ProvingEngine>,
    config: ProverConfig,
}

impl TxProver {
    pub fn new(
        state: Arc<ProverState>,
        chain: Arc<dyn ChainClient>,
        compiler: Arc<dyn ContractCompiler>,
        engine: Arc<dyn ProvingEngine>,
        config: ProverConfig,
    ) -> Self {
        Self {
            state,
            chain,
            compiler,
            engine,
            config,
        }
    }

    pub fn state(&self) -> &ProverState {
        &self.state
    }

    pub fn config(&self) -> &ProverConfig {
        &self.config
    }

    /// Compilation config for a request: its two contract addresses plus the
    /// process cache directory.
    pub fn compilation_config(&self, request: &TxProvingInput) -> CompilationConfig {
        CompilationConfig::new(
            request.token_address.clone(),
            request.admin_contract_address.clone(),
            self.config.cache_dir.clone(),
        )
    }

    /// Prove one transaction.
    ///
    /// Configuration and network problems are returned as `Err`; a proof the
    /// engine rejects is `Ok(Completion::Failure(errors))`.
    #[instrument(skip_all, fields(token = %request.token_address))]
    pub async fn prove(&self, request: &TxProvingInput) -> Result<ProvingOutcome, ProverError> {
        let started = Instant::now();
        let config = self.compilation_config(request);

        let (network, artifacts) = self
            .state
            .artifacts(&*self.chain, &*self.compiler, self.config.network, &config)
            .await?;

        let query = artifacts.engine.account_query();
        let account = self
            .chain
            .fetch_account(&network, &query)
            .await
            .map_err(|e| {
                error!(public_key = %query.public_key, token_id = %query.token_id, "account lookup failed: {e}");
                ProverError::NetworkQueryFailed(e)
            })?;

        let (callbacks, pending) = completion_bridge();
        let context = ProvingContext {
            network,
            artifacts,
            account,
        };

        let outcome = self
            .state
            .gate()
            .run_exclusive(|| async move {
                let _proving = self.state.begin_proof();
                info!("proof started");
                self.engine.prove_transaction(context, request, callbacks);
                self.await_outcome(pending).await
            })
            .await?;

        match &outcome {
            Completion::Success(_) => {
                info!(elapsed_ms = started.elapsed().as_millis() as u64, "proof succeeded")
            }
            Completion::Failure(errors) => warn!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                ?errors,
                "proof failed"
            ),
        }
        Ok(outcome)
    }

    async fn await_outcome(
        &self,
        pending: PendingCompletion<String, Vec<String>>,
    ) -> Result<ProvingOutcome, ProverError> {
        let delivered = match self.config.proof_timeout {
            Some(limit) => pending.wait_within(limit).await,
            None => pending.wait().await,
        };
        delivered.map_err(|e| match e {
            BridgeError::TimedOut(limit) => ProverError::ProvingTimedOut(limit),
            _ => ProverError::EngineAbandoned,
        })
    }
}
