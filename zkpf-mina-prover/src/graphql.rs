//! GraphQL client for Mina network interactions.
//!
//! Implements [`ChainClient`] against a Mina daemon / archive GraphQL
//! endpoint: a probe query when the chain context is built, and the
//! `account(publicKey, token)` lookup used before proving.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
    error::NetworkError,
    network::{AccountQuery, AccountState, ChainClient, MinaNetwork, NetworkContext},
};

/// Mina GraphQL client.
#[derive(Clone, Debug)]
pub struct GraphQLChainClient {
    /// HTTP client.
    client: reqwest::Client,
    /// Endpoint override; the network default is used when unset.
    endpoint: Option<String>,
}

impl GraphQLChainClient {
    pub fn new(endpoint: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }

    fn endpoint_for(&self, network: MinaNetwork) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| network.default_graphql_endpoint().to_string())
    }

    /// Execute a GraphQL query and return its `data` member.
    async fn execute_query(
        &self,
        endpoint: &str,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<serde_json::Value, NetworkError> {
        let body = serde_json::json!({
            "query": query,
            "variables": variables,
        });

        let response = self
            .client
            .post(endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| NetworkError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NetworkError::Request(format!(
                "request failed with status: {}",
                response.status()
            )));
        }

        let envelope: GraphQLEnvelope = response
            .json()
            .await
            .map_err(|e| NetworkError::Decode(e.to_string()))?;

        if let Some(errors) = envelope.errors.filter(|e| !e.is_empty()) {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(NetworkError::GraphQL(messages.join("; ")));
        }

        envelope
            .data
            .ok_or_else(|| NetworkError::Decode("response has no data".into()))
    }
}

#[async_trait]
impl ChainClient for GraphQLChainClient {
    async fn init_chain(&self, network: MinaNetwork) -> Result<NetworkContext, NetworkError> {
        let endpoint = self.endpoint_for(network);
        let query = r#"
            query {
                networkID
                syncStatus
            }
        "#;

        let data = self
            .execute_query(&endpoint, query, serde_json::json!({}))
            .await?;
        let probe: NetworkProbe = serde_json::from_value(data)?;

        if let (Some(expected), Some(reported)) =
            (network.expected_network_id(), probe.network_id.as_deref())
        {
            if expected != reported {
                return Err(NetworkError::UnexpectedNetwork {
                    expected: expected.to_string(),
                    reported: reported.to_string(),
                });
            }
        }
        if probe.sync_status.as_deref().is_some_and(|s| s != "SYNCED") {
            warn!(%network, status = ?probe.sync_status, "node is not synced");
        }

        debug!(%network, %endpoint, "chain context ready");
        Ok(NetworkContext {
            network,
            graphql_endpoint: endpoint,
            reported_network_id: probe.network_id,
            sync_status: probe.sync_status,
        })
    }

    async fn fetch_account(
        &self,
        context: &NetworkContext,
        query: &AccountQuery,
    ) -> Result<AccountState, NetworkError> {
        let gql = r#"
            query($publicKey: PublicKey!, $token: TokenId) {
                account(publicKey: $publicKey, token: $token) {
                    publicKey
                    tokenId
                    balance {
                        total
                    }
                    nonce
                    zkappState
                    verificationKey {
                        hash
                    }
                }
            }
        "#;

        let variables = serde_json::json!({
            "publicKey": query.public_key,
            "token": query.token_id,
        });

        let data = self
            .execute_query(&context.graphql_endpoint, gql, variables)
            .await?;
        let response: AccountResponse = serde_json::from_value(data)?;

        let account = response
            .account
            .ok_or_else(|| NetworkError::AccountNotFound {
                public_key: query.public_key.clone(),
                token_id: query.token_id.clone(),
            })?;
        account.into_state()
    }
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct GraphQLEnvelope {
    data: Option<serde_json::Value>,
    errors: Option<Vec<GraphQLErrorMessage>>,
}

#[derive(Debug, Deserialize)]
struct GraphQLErrorMessage {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkProbe {
    #[serde(rename = "networkID")]
    network_id: Option<String>,
    sync_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    account: Option<AccountInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountInfo {
    public_key: String,
    token_id: String,
    balance: Balance,
    nonce: String,
    zkapp_state: Option<Vec<String>>,
    verification_key: Option<VerificationKeyInfo>,
}

#[derive(Debug, Deserialize)]
struct Balance {
    total: String,
}

#[derive(Debug, Deserialize)]
struct VerificationKeyInfo {
    hash: String,
}

impl AccountInfo {
    fn into_state(self) -> Result<AccountState, NetworkError> {
        let balance = self
            .balance
            .total
            .parse()
            .map_err(|_| NetworkError::Decode(format!("invalid balance {}", self.balance.total)))?;
        let nonce = self
            .nonce
            .parse()
            .map_err(|_| NetworkError::Decode(format!("invalid nonce {}", self.nonce)))?;

        Ok(AccountState {
            public_key: self.public_key,
            token_id: self.token_id,
            balance,
            nonce,
            zkapp_state: self.zkapp_state,
            verification_key_hash: self.verification_key.map(|vk| vk.hash),
        })
    }
}
