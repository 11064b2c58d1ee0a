//! Network identity, chain context and the chain collaborator.

use std::{fmt, str::FromStr};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::NetworkError;

/// Mina network the process proves for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MinaNetwork {
    Mainnet,
    #[default]
    Devnet,
    Zeko,
    Lightnet,
    Local,
}

impl MinaNetwork {
    /// Get the string identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            MinaNetwork::Mainnet => "mainnet",
            MinaNetwork::Devnet => "devnet",
            MinaNetwork::Zeko => "zeko",
            MinaNetwork::Lightnet => "lightnet",
            MinaNetwork::Local => "local",
        }
    }

    /// Default GraphQL endpoint for the network.
    pub fn default_graphql_endpoint(&self) -> &'static str {
        match self {
            MinaNetwork::Mainnet => "https://api.minascan.io/node/mainnet/v1/graphql",
            MinaNetwork::Devnet => "https://api.minascan.io/node/devnet/v1/graphql",
            MinaNetwork::Zeko => "https://devnet.zeko.io/graphql",
            MinaNetwork::Lightnet => "http://localhost:8080/graphql",
            MinaNetwork::Local => "http://localhost:3085/graphql",
        }
    }

    /// The `networkID` a GraphQL node reports for this network, if it is fixed.
    pub fn expected_network_id(&self) -> Option<&'static str> {
        match self {
            MinaNetwork::Mainnet => Some("mina:mainnet"),
            MinaNetwork::Devnet | MinaNetwork::Zeko => Some("mina:testnet"),
            MinaNetwork::Lightnet | MinaNetwork::Local => None,
        }
    }
}

impl fmt::Display for MinaNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MinaNetwork {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(MinaNetwork::Mainnet),
            "devnet" => Ok(MinaNetwork::Devnet),
            "zeko" => Ok(MinaNetwork::Zeko),
            "lightnet" => Ok(MinaNetwork::Lightnet),
            "local" => Ok(MinaNetwork::Local),
            other => Err(format!("unknown Mina network: {other}")),
        }
    }
}

/// Live handle to the target network.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NetworkContext {
    pub network: MinaNetwork,
    pub graphql_endpoint: String,
    /// `networkID` reported by the node, when it could be probed.
    pub reported_network_id: Option<String>,
    pub sync_status: Option<String>,
}

impl NetworkContext {
    pub fn id(&self) -> MinaNetwork {
        self.network
    }
}

/// Account to read before proving.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountQuery {
    pub public_key: String,
    pub token_id: String,
}

/// On-chain state of an account, as needed by the proving engine.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountState {
    pub public_key: String,
    pub token_id: String,
    pub balance: u64,
    pub nonce: u64,
    pub zkapp_state: Option<Vec<String>>,
    pub verification_key_hash: Option<String>,
}

/// The network collaborator.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Connect to `network` and return a context for it.
    async fn init_chain(&self, network: MinaNetwork) -> Result<NetworkContext, NetworkError>;

    /// Read-only account lookup.
    async fn fetch_account(
        &self,
        context: &NetworkContext,
        query: &AccountQuery,
    ) -> Result<AccountState, NetworkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_round_trips_through_str() {
        for network in [
            MinaNetwork::Mainnet,
            MinaNetwork::Devnet,
            MinaNetwork::Zeko,
            MinaNetwork::Lightnet,
            MinaNetwork::Local,
        ] {
            assert_eq!(network.as_str().parse::<MinaNetwork>().unwrap(), network);
        }
        assert_eq!(" DevNet ".parse::<MinaNetwork>().unwrap(), MinaNetwork::Devnet);
        assert!("berkeley".parse::<MinaNetwork>().is_err());
    }

    #[test]
    fn test_network_serializes_lowercase() {
        let json = serde_json::to_string(&MinaNetwork::Zeko).unwrap();
        assert_eq!(json, "\"zeko\"");
    }
}
