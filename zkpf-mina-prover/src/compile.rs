//! Compilation configuration, compiled artifacts and the compiler collaborator.

use std::{collections::BTreeMap, fmt, path::PathBuf, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    error::CompileError,
    network::{AccountQuery, NetworkContext},
};

/// Everything that determines the compiled output.
///
/// Two configs are equal iff every field is equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilationConfig {
    /// Token contract public key.
    pub token_address: String,
    /// Admin contract public key.
    pub admin_address: String,
    /// Where the compiler keeps its on-disk cache.
    pub cache_dir: PathBuf,
}

impl CompilationConfig {
    pub fn new(
        token_address: impl Into<String>,
        admin_address: impl Into<String>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            token_address: token_address.into(),
            admin_address: admin_address.into(),
            cache_dir: cache_dir.into(),
        }
    }
}

impl fmt::Display for CompilationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{token: {}, admin: {}, cache: {}}}",
            self.token_address,
            self.admin_address,
            self.cache_dir.display()
        )
    }
}

/// Verification key produced by compiling one contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationKey {
    pub hash: String,
    pub data: String,
}

/// Contract instance bound to the compiled token contract, used to derive
/// account identifiers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenEngine {
    pub token_address: String,
    /// Token id derived from `token_address`.
    pub derived_token_id: String,
}

impl TokenEngine {
    /// The token contract's own account under its derived token.
    pub fn account_query(&self) -> AccountQuery {
        AccountQuery {
            public_key: self.token_address.clone(),
            token_id: self.derived_token_id.clone(),
        }
    }
}

/// Output of one compilation run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilationArtifacts {
    /// Verification keys by contract name.
    pub verification_keys: BTreeMap<String, VerificationKey>,
    pub engine: TokenEngine,
    #[serde(default, with = "duration_ms")]
    pub compile_time: Duration,
}

/// The compilation collaborator.
///
/// Deterministic for a given config; the prover calls it at most once per
/// process.
#[async_trait]
pub trait ContractCompiler: Send + Sync {
    async fn compile(
        &self,
        config: &CompilationConfig,
        network: &NetworkContext,
    ) -> Result<CompilationArtifacts, CompileError>;
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
