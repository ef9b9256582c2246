use std::path::PathBuf;

use thiserror::Error;

pub type CryptResult<T> = Result<T, CryptError>;

#[derive(Debug, Error)]
pub enum CryptError {
    /// Local key missing, malformed, or not exactly the expected length.
    #[error("key unreadable: {0}")]
    KeyUnreadable(String),

    /// Tampered ciphertext, truncated payload, or a foreign key.
    #[error("ciphertext failed integrity check (wrong key or corrupted data)")]
    CipherIntegrity,

    #[error("key blob is still nested after {depth} unwraps, refusing to continue")]
    CorruptedKeyBlob { depth: usize },

    #[error("cluster secret missing: {0}")]
    ClusterSecretMissing(String),

    #[error("failed to write git config `{entry}`: {stderr}")]
    FilterConfig { entry: String, stderr: String },

    /// Carries every requested identity that has no registered public key.
    #[error("no public key registered for: {}", identities.join(", "))]
    RecipientResolution { identities: Vec<String> },

    /// A subprocess exited unsuccessfully; its captured stderr is kept.
    #[error("`{program} {}` failed ({}): {stderr}", args.join(" "), exit_label(status))]
    Command {
        program: String,
        args: Vec<String>,
        status: Option<i32>,
        stderr: String,
    },

    #[error("cluster error: {0}")]
    Cluster(String),

    #[error("registry error: {0}")]
    Registry(String),

    #[error("identity error: {0}")]
    Identity(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error on {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn exit_label(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit {code}"),
        None => "killed by signal".to_string(),
    }
}

impl CryptError {
    /// Wrap an I/O error with the path it happened on.
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CryptError::File {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipient_resolution_lists_every_identity() {
        let err = CryptError::RecipientResolution {
            identities: vec!["a@example.com".into(), "b@example.com".into()],
        };
        assert_eq!(
            err.to_string(),
            "no public key registered for: a@example.com, b@example.com"
        );
    }

    #[test]
    fn test_command_error_includes_stderr() {
        let err = CryptError::Command {
            program: "git".into(),
            args: vec!["checkout".into(), "HEAD".into()],
            status: Some(128),
            stderr: "fatal: not a git repository".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("git checkout HEAD"));
        assert!(msg.contains("exit 128"));
        assert!(msg.contains("not a git repository"));
    }
}
