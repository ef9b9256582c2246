//! Restore the repository key from a running cluster.

use chartcrypt_core::config::ClusterConfig;
use chartcrypt_core::{CryptError, CryptResult};
use chartcrypt_crypto::{KeyRecord, KeyStore};

use crate::cluster::SecretSource;

/// Fetch the configured secret field, parse it, and overwrite the local key file.
///
/// The local file is only touched once the fetched record has parsed cleanly,
/// so a failed recovery leaves whatever was there (even a broken key) in place.
pub async fn recover(
    source: &dyn SecretSource,
    cluster: &ClusterConfig,
    store: &KeyStore,
) -> CryptResult<KeyRecord> {
    let secret = source
        .fetch(&cluster.namespace, &cluster.secret_name)
        .await?
        .ok_or_else(|| {
            CryptError::ClusterSecretMissing(format!(
                "secret {}/{} not found",
                cluster.namespace, cluster.secret_name
            ))
        })?;

    let blob = secret.get(&cluster.field).ok_or_else(|| {
        CryptError::ClusterSecretMissing(format!(
            "could not find `{}` in {} secret",
            cluster.field, cluster.secret_name
        ))
    })?;

    let record = KeyRecord::parse_bytes(blob)?;
    store.persist(&record)?;

    tracing::info!(
        namespace = %cluster.namespace,
        secret = %cluster.secret_name,
        id = %record.id(),
        "recovered key from cluster"
    );
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::SecretData;
    use async_trait::async_trait;

    struct FakeSource(Option<SecretData>);

    #[async_trait]
    impl SecretSource for FakeSource {
        async fn fetch(&self, _namespace: &str, _name: &str) -> CryptResult<Option<SecretData>> {
            Ok(self.0.clone())
        }
    }

    const KEY: &str = "gKNJBnflqQA6lfUKLWMwl7CMJk4j+qqG9jnGYdTvwTk=";

    fn source_with(field: &str, value: &str) -> FakeSource {
        FakeSource(Some(
            [(field.to_string(), value.as_bytes().to_vec())]
                .into_iter()
                .collect(),
        ))
    }

    #[tokio::test]
    async fn test_recover_writes_canonical_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path().join("key"));

        recover(
            &source_with("key", &format!("key: {KEY}")),
            &ClusterConfig::default(),
            &store,
        )
        .await
        .unwrap();

        assert_eq!(
            std::fs::read_to_string(store.path()).unwrap(),
            format!("key: {KEY}\n")
        );
    }

    #[tokio::test]
    async fn test_recover_replaces_broken_local_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path().join("key"));
        std::fs::write(store.path(), "      key: |\n        key: |\n          key: abc").unwrap();

        recover(
            &source_with("key", &format!("key: {KEY}")),
            &ClusterConfig::default(),
            &store,
        )
        .await
        .unwrap();

        assert_eq!(
            std::fs::read_to_string(store.path()).unwrap(),
            format!("key: {KEY}\n")
        );
    }

    #[tokio::test]
    async fn test_recover_unwraps_nested_secret() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path().join("key"));

        recover(
            &source_with("key", &format!("key: |\n  key: {KEY}\n")),
            &ClusterConfig::default(),
            &store,
        )
        .await
        .unwrap();

        assert_eq!(
            std::fs::read_to_string(store.path()).unwrap(),
            format!("key: {KEY}\n")
        );
    }

    #[tokio::test]
    async fn test_missing_secret_leaves_local_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path().join("key"));
        std::fs::write(store.path(), "local").unwrap();

        let err = recover(&FakeSource(None), &ClusterConfig::default(), &store)
            .await
            .unwrap_err();

        assert!(matches!(err, CryptError::ClusterSecretMissing(_)));
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "local");
    }

    #[tokio::test]
    async fn test_missing_field_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path().join("key"));

        let err = recover(
            &source_with("other", &format!("key: {KEY}")),
            &ClusterConfig::default(),
            &store,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CryptError::ClusterSecretMissing(ref m) if m.contains("`key`")));
        assert!(!store.exists());
    }

    #[tokio::test]
    async fn test_unparseable_secret_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path().join("key"));

        let err = recover(
            &source_with("key", "key: abc"),
            &ClusterConfig::default(),
            &store,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CryptError::KeyUnreadable(_)));
        assert!(!store.exists());
    }

    #[tokio::test]
    async fn test_configured_field_names_are_used() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path().join("key"));
        let cluster = ClusterConfig {
            namespace: "infra".into(),
            secret_name: "repo-key".into(),
            field: "aes".into(),
        };

        recover(&source_with("aes", &format!("key: {KEY}")), &cluster, &store)
            .await
            .unwrap();

        assert!(store.exists());
    }
}
