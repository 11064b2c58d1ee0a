//! Process-lifetime state shared by every request in a warm process.
//!
//! One [`ProverState`] is created by the entry point and shared by reference;
//! tests create a fresh one each.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde::Serialize;
use tracing::info;

use crate::{
    compile::{CompilationArtifacts, CompilationConfig, ContractCompiler},
    error::{CompileError, ProverError},
    gate::ExclusiveGate,
    network::{ChainClient, MinaNetwork, NetworkContext},
    slot::{BoundSlot, SlotError, SlotPhase},
};

#[derive(Debug)]
pub struct ProverState {
    gate: ExclusiveGate,
    network: BoundSlot<MinaNetwork, NetworkContext>,
    artifacts: BoundSlot<CompilationConfig, CompilationArtifacts>,
    proof_in_flight: AtomicBool,
}

/// What the process is currently bound to.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub network: Option<MinaNetwork>,
    pub compilation_config: Option<CompilationConfig>,
    pub artifacts_ready: bool,
    /// A proof is running in the proving engine.
    pub proving: bool,
    /// Some request holds the gate: building, compiling or proving.
    pub gate_held: bool,
}

/// Marks a proof as in flight until dropped.
pub(crate) struct ProofInFlight<'a> {
    flag: &'a AtomicBool,
}

impl Drop for ProofInFlight<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl Default for ProverState {
    fn default() -> Self {
        Self {
            gate: ExclusiveGate::new(),
            network: BoundSlot::new("network"),
            artifacts: BoundSlot::new("artifacts"),
            proof_in_flight: AtomicBool::new(false),
        }
    }
}

impl ProverState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gate(&self) -> &ExclusiveGate {
        &self.gate
    }

    /// Return the chain context, building it on first use.
    ///
    /// Fails with [`ProverError::ConfigurationMismatch`] if the process is
    /// already bound to another network.
    pub async fn network_context(
        &self,
        chain: &dyn ChainClient,
        expected: MinaNetwork,
    ) -> Result<Arc<NetworkContext>, ProverError> {
        self.network
            .resolve(&self.gate, &expected, |network| async move {
                chain.init_chain(network).await
            })
            .await
            .map_err(|err| match err {
                SlotError::Mismatch { bound, requested } => {
                    ProverError::ConfigurationMismatch { bound, requested }
                }
                SlotError::Build(e) => ProverError::NetworkInitFailed(e),
            })
    }

    /// Return the compiled artifacts for `config`, compiling on first use.
    ///
    /// The chain context is resolved first since compilation may depend on
    /// network-specific keys. Fails with
    /// [`ProverError::CompilationConfigMismatch`] if the artifacts were built
    /// for another config.
    pub async fn artifacts(
        &self,
        chain: &dyn ChainClient,
        compiler: &dyn ContractCompiler,
        expected_network: MinaNetwork,
        config: &CompilationConfig,
    ) -> Result<(Arc<NetworkContext>, Arc<CompilationArtifacts>), ProverError> {
        let network = self.network_context(chain, expected_network).await?;

        let artifacts = self
            .artifacts
            .resolve(&self.gate, config, |config| {
                let network = network.clone();
                async move {
                    let artifacts = compiler.compile(&config, &network).await?;
                    info!(
                        %config,
                        contracts = artifacts.verification_keys.len(),
                        compile_ms = artifacts.compile_time.as_millis() as u64,
                        "contracts compiled"
                    );
                    Ok::<_, CompileError>(artifacts)
                }
            })
            .await
            .map_err(|err| match err {
                SlotError::Mismatch { bound, requested } => ProverError::CompilationConfigMismatch {
                    bound: Box::new(bound),
                    requested: Box::new(requested),
                },
                SlotError::Build(e) => ProverError::CompilationFailed(e),
            })?;

        Ok((network, artifacts))
    }

    pub fn bound_network(&self) -> Option<MinaNetwork> {
        self.network.bound_key()
    }

    pub fn bound_config(&self) -> Option<CompilationConfig> {
        self.artifacts.bound_key()
    }

    /// Flag a proof as running. Call while holding the gate.
    pub(crate) fn begin_proof(&self) -> ProofInFlight<'_> {
        self.proof_in_flight.store(true, Ordering::SeqCst);
        ProofInFlight {
            flag: &self.proof_in_flight,
        }
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            network: self.bound_network(),
            compilation_config: self.bound_config(),
            artifacts_ready: self.artifacts.phase() == SlotPhase::Bound,
            proving: self.proof_in_flight.load(Ordering::SeqCst),
            gate_held: self.gate.is_held(),
        }
    }
}
