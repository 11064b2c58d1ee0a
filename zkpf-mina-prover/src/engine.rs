//! Proving request/outcome types and the proving engine collaborator.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    bridge::{Completer, Completion},
    compile::CompilationArtifacts,
    network::{AccountState, NetworkContext},
};

/// Transaction to prove. Only the two contract addresses are read by the
/// prover; everything else is passed to the engine untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxProvingInput {
    pub token_address: String,
    pub admin_contract_address: String,
    /// Serialized zkApp command.
    pub serialized_transaction: String,
    /// Signatures and signing metadata for the command.
    pub signed_data: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Serialized proven transaction on success, error descriptors on failure.
pub type ProvingOutcome = Completion<String, Vec<String>>;

/// Callback pair handed to the engine.
pub type ProofCallbacks = Completer<String, Vec<String>>;

/// Everything the engine needs besides the request itself.
#[derive(Clone, Debug)]
pub struct ProvingContext {
    pub network: Arc<NetworkContext>,
    pub artifacts: Arc<CompilationArtifacts>,
    pub account: AccountState,
}

/// The proving engine collaborator.
///
/// `prove_transaction` must return promptly and later invoke exactly one of
/// `callbacks.on_success` / `callbacks.on_failure`, from any task or thread.
/// When `callbacks.cancelled()` resolves the engine must stop the proof and
/// drop the callbacks; with a proof timeout set, the next proof is held back
/// until it does.
pub trait ProvingEngine: Send + Sync {
    fn prove_transaction(
        &self,
        context: ProvingContext,
        request: &TxProvingInput,
        callbacks: ProofCallbacks,
    );
}
