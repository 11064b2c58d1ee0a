//! # zkpf-mina-prover
//!
//! Transaction prover for Mina token contracts, built for warm, reused
//! processes (serverless workers, long-lived pods).
//!
//! Compiling the contracts and connecting to the network are expensive, so
//! both happen once per process and are then shared by every request:
//!
//! ```text
//!   request ──► TxProver::prove
//!                 │
//!                 ├─► ProverState::network_context ──► ChainClient::init_chain   (once)
//!                 ├─► ProverState::artifacts ────────► ContractCompiler::compile (once)
//!                 ├─► ChainClient::fetch_account
//!                 └─► [gate held] ProvingEngine::prove_transaction
//!                                     │ on_success / on_failure
//!                                     ▼
//!                               completion bridge ──► ProvingOutcome
//! ```
//!
//! ## Guarantees
//!
//! - The chain context and the artifacts are each built at most once, under
//!   the process gate, with the emptiness check repeated inside the gate.
//! - Every request is checked against what the process is bound to. A
//!   different network fails with [`ProverError::ConfigurationMismatch`], a
//!   different contract pair with [`ProverError::CompilationConfigMismatch`].
//!   The bound values are never replaced.
//! - One proof runs at a time: the gate is held from engine submission until
//!   the engine reports an outcome.
//! - A rejected proof is a normal outcome ([`Completion::Failure`]), not an
//!   error.

pub mod bridge;
pub mod compile;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
#[cfg(feature = "mina-graphql")]
pub mod graphql;
pub mod network;
pub mod prover;
pub mod slot;
pub mod state;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod worker;

pub use bridge::{completion_bridge, Completer, Completion, PendingCompletion};
pub use compile::{CompilationArtifacts, CompilationConfig, ContractCompiler, TokenEngine, VerificationKey};
pub use config::ProverConfig;
pub use engine::{ProofCallbacks, ProvingContext, ProvingEngine, ProvingOutcome, TxProvingInput};
pub use error::{BridgeError, CompileError, NetworkError, ProverError};
pub use gate::ExclusiveGate;
#[cfg(feature = "mina-graphql")]
pub use graphql::GraphQLChainClient;
pub use network::{AccountQuery, AccountState, ChainClient, MinaNetwork, NetworkContext};
pub use prover::TxProver;
pub use state::{ProverState, StateSnapshot};
pub use worker::WorkerProcess;
