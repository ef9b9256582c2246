//! Public-key registry
//!
//! Users register the public half of their age identity under a name; `share`
//! looks keys up by email.

use async_trait::async_trait;
use chartcrypt_core::{CryptError, CryptResult};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// A registered public key and the user it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    pub email: String,
    /// `age1...`
    pub content: String,
}

#[async_trait]
pub trait KeyRegistry: Send + Sync {
    async fn create_key(&self, name: &str, public_key: &str) -> CryptResult<()>;

    /// Every key registered for any of `emails`. Users with no key are simply absent.
    async fn list_keys(&self, emails: &[String]) -> CryptResult<Vec<PublicKey>>;
}

const CREATE_KEY: &str = "mutation CreateKey($name: String!, $content: String!) {
  createPublicKey(attributes: {name: $name, content: $content}) { id }
}";

const LIST_KEYS: &str = "query ListKeys($emails: [String]) {
  publicKeys(emails: $emails, first: 1000) {
    edges { node { content user { email } } }
  }
}";

/// GraphQL over HTTPS with a bearer token.
pub struct GraphqlRegistry {
    client: reqwest::Client,
    endpoint: String,
    token: SecretString,
}

#[derive(Serialize)]
struct Request<'a> {
    query: &'a str,
    variables: serde_json::Value,
}

#[derive(Deserialize)]
struct Response<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListKeysData {
    public_keys: Connection,
}

#[derive(Deserialize)]
struct Connection {
    #[serde(default)]
    edges: Vec<Edge>,
}

#[derive(Deserialize)]
struct Edge {
    node: KeyNode,
}

#[derive(Deserialize)]
struct KeyNode {
    content: String,
    user: UserNode,
}

#[derive(Deserialize)]
struct UserNode {
    email: String,
}

impl GraphqlRegistry {
    pub fn new(endpoint: impl Into<String>, token: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            token,
        }
    }

    async fn execute<T: for<'de> Deserialize<'de>>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> CryptResult<T> {
        tracing::debug!(endpoint = %self.endpoint, "registry request");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.token.expose_secret())
            .json(&Request { query, variables })
            .send()
            .await
            .map_err(|e| CryptError::Registry(format!("request to {} failed: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CryptError::Registry(format!("HTTP {status}: {body}")));
        }

        let body: Response<T> = response
            .json()
            .await
            .map_err(|e| CryptError::Registry(format!("decoding response: {e}")))?;
        into_data(body)
    }
}

fn into_data<T>(body: Response<T>) -> CryptResult<T> {
    if !body.errors.is_empty() {
        let messages: Vec<_> = body.errors.into_iter().map(|e| e.message).collect();
        return Err(CryptError::Registry(messages.join("; ")));
    }
    body.data
        .ok_or_else(|| CryptError::Registry("response carried no data".into()))
}

fn keys_from(data: ListKeysData) -> Vec<PublicKey> {
    data.public_keys
        .edges
        .into_iter()
        .map(|edge| PublicKey {
            email: edge.node.user.email,
            content: edge.node.content,
        })
        .collect()
}

#[async_trait]
impl KeyRegistry for GraphqlRegistry {
    async fn create_key(&self, name: &str, public_key: &str) -> CryptResult<()> {
        let _: serde_json::Value = self
            .execute(CREATE_KEY, json!({ "name": name, "content": public_key }))
            .await?;
        tracing::info!(%name, "registered public key");
        Ok(())
    }

    async fn list_keys(&self, emails: &[String]) -> CryptResult<Vec<PublicKey>> {
        let data: ListKeysData = self.execute(LIST_KEYS, json!({ "emails": emails })).await?;
        Ok(keys_from(data))
    }
}
