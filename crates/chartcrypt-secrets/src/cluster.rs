//! Read-only access to cluster secrets.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chartcrypt_core::{CryptError, CryptResult};
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};

/// Decoded secret data, field name to raw bytes.
pub type SecretData = BTreeMap<String, Vec<u8>>;

#[async_trait]
pub trait SecretSource: Send + Sync {
    /// `Ok(None)` when the secret does not exist.
    async fn fetch(&self, namespace: &str, name: &str) -> CryptResult<Option<SecretData>>;
}

/// Talks to the cluster from the current kubeconfig, or the in-cluster service account.
pub struct KubeSecretSource {
    client: Client,
}

impl KubeSecretSource {
    pub async fn try_default() -> CryptResult<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| CryptError::Cluster(format!("loading kube config: {e}")))?;
        tracing::debug!("kube client initialized");
        Ok(Self { client })
    }

    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretSource for KubeSecretSource {
    async fn fetch(&self, namespace: &str, name: &str) -> CryptResult<Option<SecretData>> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        match secrets.get(name).await {
            Ok(secret) => Ok(Some(
                secret
                    .data
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(field, value)| (field, value.0))
                    .collect(),
            )),
            Err(kube::Error::Api(err)) if err.code == 404 => Ok(None),
            Err(e) => Err(CryptError::Cluster(format!(
                "reading secret {namespace}/{name}: {e}"
            ))),
        }
    }
}
