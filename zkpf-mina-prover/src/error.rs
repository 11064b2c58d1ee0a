//! Error types for the Mina transaction prover.

use std::time::Duration;

use thiserror::Error;

use crate::{compile::CompilationConfig, network::MinaNetwork};

/// Fatal errors surfaced by the prover.
///
/// A proof that the engine rejects is *not* an error; it comes back as
/// [`crate::ProvingOutcome::Failure`].
#[derive(Error, Debug)]
pub enum ProverError {
    /// The process is bound to a different network than the one requested.
    #[error("network mismatch: process is bound to {bound}, request expects {requested}")]
    ConfigurationMismatch {
        bound: MinaNetwork,
        requested: MinaNetwork,
    },

    /// The cached artifacts were compiled for a different configuration.
    #[error("compilation config mismatch: artifacts were built for {bound}, request expects {requested}")]
    CompilationConfigMismatch {
        bound: Box<CompilationConfig>,
        requested: Box<CompilationConfig>,
    },

    /// Building the network context failed.
    #[error("network initialization failed: {0}")]
    NetworkInitFailed(#[source] NetworkError),

    /// The account lookup needed by the proof failed.
    #[error("network query failed: {0}")]
    NetworkQueryFailed(#[source] NetworkError),

    /// The external compilation procedure failed.
    #[error("compilation failed: {0}")]
    CompilationFailed(#[source] CompileError),

    /// The proving engine released the bridge without firing a callback.
    #[error("proving engine dropped the request without reporting an outcome")]
    EngineAbandoned,

    /// The proof did not complete within the configured timeout.
    #[error("proof did not complete within {0:?}")]
    ProvingTimedOut(Duration),
}

impl ProverError {
    /// Stable identifier used in HTTP error envelopes and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProverError::ConfigurationMismatch { .. } => "ConfigurationMismatch",
            ProverError::CompilationConfigMismatch { .. } => "CompilationConfigMismatch",
            ProverError::NetworkInitFailed(_) => "NetworkInitFailed",
            ProverError::NetworkQueryFailed(_) => "NetworkQueryFailed",
            ProverError::CompilationFailed(_) => "CompilationFailed",
            ProverError::EngineAbandoned => "EngineAbandoned",
            ProverError::ProvingTimedOut(_) => "ProvingTimedOut",
        }
    }
}

/// Errors from the network collaborator.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Transport-level failure talking to the endpoint.
    #[error("request failed: {0}")]
    Request(String),

    /// The endpoint answered with GraphQL errors.
    #[error("GraphQL error: {0}")]
    GraphQL(String),

    /// The response could not be decoded.
    #[error("failed to parse response: {0}")]
    Decode(String),

    /// The requested account does not exist on chain.
    #[error("account {public_key} not found for token {token_id}")]
    AccountNotFound { public_key: String, token_id: String },

    /// The endpoint reports a different chain than the one requested.
    #[error("endpoint reports network {reported}, expected {expected}")]
    UnexpectedNetwork { expected: String, reported: String },
}

impl From<serde_json::Error> for NetworkError {
    fn from(err: serde_json::Error) -> Self {
        NetworkError::Decode(err.to_string())
    }
}

/// Errors from the compilation collaborator.
#[derive(Error, Debug)]
pub enum CompileError {
    /// The compiler could not be started or crashed.
    #[error("compiler process error: {0}")]
    Process(String),

    /// The compiler reported errors for the configuration.
    #[error("compiler rejected configuration: {}", .0.join("; "))]
    Rejected(Vec<String>),

    /// The compiler output could not be decoded.
    #[error("invalid compiler output: {0}")]
    InvalidOutput(String),
}

impl From<serde_json::Error> for CompileError {
    fn from(err: serde_json::Error) -> Self {
        CompileError::InvalidOutput(err.to_string())
    }
}

/// Misuse of a completion bridge.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BridgeError {
    /// `on_success` / `on_failure` was invoked after the outcome was delivered.
    #[error("completion already delivered")]
    AlreadyCompleted,

    /// The waiting side is gone, so the outcome has nowhere to go.
    #[error("completion receiver dropped")]
    ReceiverDropped,

    /// Every producer handle was dropped without completing.
    #[error("completion abandoned by producer")]
    Abandoned,

    /// No outcome arrived in time; the producer was cancelled.
    #[error("no completion within {0:?}")]
    TimedOut(Duration),
}
