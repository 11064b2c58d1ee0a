//! In-memory collaborators for tests.
//!
//! Each mock counts its calls and sleeps briefly before answering so that
//! concurrent callers actually interleave at the gate.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    compile::{CompilationArtifacts, CompilationConfig, ContractCompiler, TokenEngine, VerificationKey},
    engine::{ProofCallbacks, ProvingContext, ProvingEngine, TxProvingInput},
    error::{CompileError, NetworkError},
    network::{AccountQuery, AccountState, ChainClient, MinaNetwork, NetworkContext},
};

const MOCK_DELAY: Duration = Duration::from_millis(5);

#[derive(Debug, Default)]
pub struct MockChain {
    init_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    fail_next_init: AtomicBool,
    fail_fetch: AtomicBool,
}

impl MockChain {
    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn fail_next_init(&self) {
        self.fail_next_init.store(true, Ordering::SeqCst);
    }

    pub fn fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn init_chain(&self, network: MinaNetwork) -> Result<NetworkContext, NetworkError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(MOCK_DELAY).await;
        if self.fail_next_init.swap(false, Ordering::SeqCst) {
            return Err(NetworkError::Request("connection refused".into()));
        }
        Ok(NetworkContext {
            network,
            graphql_endpoint: network.default_graphql_endpoint().to_string(),
            reported_network_id: network.expected_network_id().map(str::to_string),
            sync_status: Some("SYNCED".into()),
        })
    }

    async fn fetch_account(
        &self,
        _context: &NetworkContext,
        query: &AccountQuery,
    ) -> Result<AccountState, NetworkError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(MOCK_DELAY).await;
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(NetworkError::AccountNotFound {
                public_key: query.public_key.clone(),
                token_id: query.token_id.clone(),
            });
        }
        Ok(AccountState {
            public_key: query.public_key.clone(),
            token_id: query.token_id.clone(),
            balance: 1_000_000_000,
            nonce: 1,
            zkapp_state: None,
            verification_key_hash: None,
        })
    }
}

#[derive(Debug, Default)]
pub struct MockCompiler {
    compile_calls: AtomicUsize,
}

impl MockCompiler {
    pub fn compile_calls(&self) -> usize {
        self.compile_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContractCompiler for MockCompiler {
    async fn compile(
        &self,
        config: &CompilationConfig,
        _network: &NetworkContext,
    ) -> Result<CompilationArtifacts, CompileError> {
        self.compile_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(MOCK_DELAY).await;

        let mut verification_keys = BTreeMap::new();
        verification_keys.insert(
            "FungibleToken".to_string(),
            VerificationKey {
                hash: format!("vk-{}", config.token_address),
                data: String::new(),
            },
        );
        verification_keys.insert(
            "FungibleTokenAdmin".to_string(),
            VerificationKey {
                hash: format!("vk-{}", config.admin_address),
                data: String::new(),
            },
        );

        Ok(CompilationArtifacts {
            verification_keys,
            engine: TokenEngine {
                token_address: config.token_address.clone(),
                derived_token_id: format!("tok-{}", config.token_address),
            },
            compile_time: MOCK_DELAY,
        })
    }
}

/// How [`MockEngine`] answers a proof request.
#[derive(Clone, Debug)]
pub enum EngineBehavior {
    /// Succeed with `proven:<serializedTransaction>`.
    Succeed,
    /// Fire the failure callback with these errors.
    Fail(Vec<String>),
    /// Drop the callbacks without firing.
    Abandon,
    /// Never answer on its own; stops when the caller cancels.
    Hang,
    /// Succeed, then also fire the failure callback.
    FireTwice,
}

#[derive(Debug)]
pub struct MockEngine {
    behavior: Mutex<EngineBehavior>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
    cancelled: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new(EngineBehavior::Succeed)
    }
}

impl MockEngine {
    pub fn new(behavior: EngineBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            delay: Duration::from_millis(20),
            calls: Arc::default(),
            cancelled: Arc::default(),
            in_flight: Arc::default(),
            max_in_flight: Arc::default(),
        }
    }

    pub fn set_behavior(&self, behavior: EngineBehavior) {
        *self.behavior.lock().unwrap_or_else(PoisonError::into_inner) = behavior;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Proofs stopped because the caller gave up on them.
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Highest number of proofs observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl ProvingEngine for MockEngine {
    fn prove_transaction(
        &self,
        _context: ProvingContext,
        request: &TxProvingInput,
        callbacks: ProofCallbacks,
    ) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let behavior = self
            .behavior
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let proven = format!("proven:{}", request.serialized_transaction);
        let delay = self.delay;
        let in_flight = self.in_flight.clone();
        let cancelled = self.cancelled.clone();

        tokio::spawn(async move {
            let hang = matches!(behavior, EngineBehavior::Hang);
            let work = async move {
                if hang {
                    std::future::pending::<()>().await;
                }
                tokio::time::sleep(delay).await;
            };
            let stopped = tokio::select! {
                _ = work => false,
                _ = callbacks.cancelled() => true,
            };
            in_flight.fetch_sub(1, Ordering::SeqCst);
            if stopped {
                cancelled.fetch_add(1, Ordering::SeqCst);
                return;
            }
            match behavior {
                EngineBehavior::Succeed => {
                    let _ = callbacks.on_success(proven);
                }
                EngineBehavior::Fail(errors) => {
                    let _ = callbacks.on_failure(errors);
                }
                EngineBehavior::Abandon | EngineBehavior::Hang => drop(callbacks),
                EngineBehavior::FireTwice => {
                    let _ = callbacks.on_success(proven);
                    let _ = callbacks.on_failure(vec!["late failure".into()]);
                }
            }
        });
    }
}

/// A well-formed request for token `token` administered by `admin`.
pub fn proving_input(token: &str, admin: &str) -> TxProvingInput {
    TxProvingInput {
        token_address: token.to_string(),
        admin_contract_address: admin.to_string(),
        serialized_transaction: format!("tx-{token}"),
        signed_data: "{}".to_string(),
        extra: serde_json::Map::new(),
    }
}
