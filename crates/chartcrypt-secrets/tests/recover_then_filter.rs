//! A machine that recovers the key from the cluster can read what another
//! machine sealed with the same key.

use async_trait::async_trait;
use chartcrypt_core::config::ClusterConfig;
use chartcrypt_core::CryptResult;
use chartcrypt_crypto::{KeyStore, MAGIC_PREFIX};
use chartcrypt_secrets::cluster::SecretData;
use chartcrypt_secrets::{recover, KeyResolver, KeySource, SecretSource};

struct StaticSecret(SecretData);

#[async_trait]
impl SecretSource for StaticSecret {
    async fn fetch(&self, namespace: &str, name: &str) -> CryptResult<Option<SecretData>> {
        assert_eq!((namespace, name), ("console", "console-conf"));
        Ok(Some(self.0.clone()))
    }
}

#[tokio::test]
async fn recovered_key_opens_sealed_content() {
    let dir = tempfile::tempdir().unwrap();

    let writer = KeyResolver::new(
        KeyStore::new(dir.path().join("writer/key")),
        dir.path().join("writer/identity"),
        dir.path().to_path_buf(),
    );
    let sealed = writer
        .seal(b"image:\n  tag: v1.2.3\n".to_vec())
        .await
        .unwrap();
    assert!(sealed.starts_with(MAGIC_PREFIX));

    let exported = writer.store().export().unwrap();
    let source = StaticSecret(
        [("key".to_string(), exported.into_bytes())]
            .into_iter()
            .collect(),
    );

    let reader_store = KeyStore::new(dir.path().join("reader/key"));
    recover(&source, &ClusterConfig::default(), &reader_store)
        .await
        .unwrap();

    let reader = KeyResolver::new(
        reader_store,
        dir.path().join("reader/identity"),
        dir.path().to_path_buf(),
    );
    let (_, source) = reader.resolve().await.unwrap();
    assert!(matches!(source, KeySource::LocalFile(_)));
    assert_eq!(
        reader.open(sealed).await.unwrap(),
        b"image:\n  tag: v1.2.3\n"
    );
}
