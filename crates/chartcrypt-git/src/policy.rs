//! Canonical filter policy and its install/reconcile/unlock operations.

use std::fs;
use std::path::Path;

use chartcrypt_core::{CryptError, CryptResult};

use crate::backend::GitBackend;

/// Name of the git filter and diff driver.
pub const FILTER_NAME: &str = "chartcrypt";

pub const GITATTRIBUTES_FILE: &str = ".gitattributes";
pub const GITIGNORE_FILE: &str = ".gitignore";

pub const GITATTRIBUTES: &str = "/**/helm/**/values.yaml filter=chartcrypt diff=chartcrypt
/**/helm/**/values.yaml* filter=chartcrypt diff=chartcrypt
/**/terraform/**/main.tf filter=chartcrypt diff=chartcrypt
/**/terraform/**/main.tf* filter=chartcrypt diff=chartcrypt
/**/manifest.yaml filter=chartcrypt diff=chartcrypt
/**/output.yaml filter=chartcrypt diff=chartcrypt
/diffs/**/* filter=chartcrypt diff=chartcrypt
context.yaml filter=chartcrypt diff=chartcrypt
workspace.yaml filter=chartcrypt diff=chartcrypt
context.yaml* filter=chartcrypt diff=chartcrypt
workspace.yaml* filter=chartcrypt diff=chartcrypt
.gitattributes !filter !diff
";

pub const GITIGNORE: &str = "/**/.terraform
/**/.terraform*
/**/terraform.tfstate*
/bin
*~
.idea
*.swp
*.swo
.DS_STORE
.vscode
";

/// Git config entries binding the filter to `command`.
///
/// `required` makes git refuse to stage content when the clean filter fails,
/// so plaintext never lands in a commit. Git hands these values to `sh`, so
/// `command` is quoted when it holds anything beyond plain path characters.
pub fn filter_entries(command: &str) -> [(String, String); 4] {
    let command = shell_quote(command);
    [
        (
            format!("filter.{FILTER_NAME}.smudge"),
            format!("{command} decrypt"),
        ),
        (
            format!("filter.{FILTER_NAME}.clean"),
            format!("{command} encrypt"),
        ),
        (format!("filter.{FILTER_NAME}.required"), "true".into()),
        (
            format!("diff.{FILTER_NAME}.textconv"),
            format!("{command} decrypt"),
        ),
    ]
}

fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+:@%=,".contains(c));
    if plain {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', r"'\''"))
}

/// Outcome of [`FilterPolicy::check_and_reconcile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    UpToDate,
    Reinstalled,
}

/// Snapshot of how far a repository has drifted from the policy.
#[derive(Debug, Clone, Default)]
pub struct PolicyStatus {
    pub attributes_current: bool,
    pub ignore_current: bool,
    /// `(config key, matches expected value)`
    pub config: Vec<(String, bool)>,
}

impl PolicyStatus {
    pub fn is_current(&self) -> bool {
        self.attributes_current && self.ignore_current && self.config.iter().all(|(_, ok)| *ok)
    }
}

pub struct FilterPolicy<'a, G: GitBackend + ?Sized> {
    git: &'a G,
    command: String,
}

impl<'a, G: GitBackend + ?Sized> FilterPolicy<'a, G> {
    /// `command` is what git invokes, e.g. `chartcrypt` or an absolute path.
    pub fn new(git: &'a G, command: impl Into<String>) -> Self {
        Self {
            git,
            command: command.into(),
        }
    }

    /// Write the filter config, then overwrite both policy files at the repo root.
    pub fn install(&self) -> CryptResult<()> {
        let root = self.git.root()?;

        for (key, value) in filter_entries(&self.command) {
            self.git.config_set(&key, &value)?;
            tracing::debug!(%key, %value, "set git config");
        }

        write_policy_file(&root.join(GITATTRIBUTES_FILE), GITATTRIBUTES)?;
        write_policy_file(&root.join(GITIGNORE_FILE), GITIGNORE)?;

        tracing::info!(root = %root.display(), "installed chartcrypt filter policy");
        Ok(())
    }

    /// Reinstall everything unless both policy files match byte for byte.
    pub fn check_and_reconcile(&self) -> CryptResult<Reconciled> {
        let root = self.git.root()?;

        let attributes_ok = file_matches(&root.join(GITATTRIBUTES_FILE), GITATTRIBUTES)?;
        let ignore_ok = file_matches(&root.join(GITIGNORE_FILE), GITIGNORE)?;

        if attributes_ok && ignore_ok {
            return Ok(Reconciled::UpToDate);
        }

        tracing::info!(
            attributes_ok,
            ignore_ok,
            "filter policy out of date, reinstalling"
        );
        self.install()?;
        Ok(Reconciled::Reinstalled)
    }

    /// Rewrite every filtered file in the working tree through the smudge filter.
    ///
    /// Drops the index so git cannot trust its cached stat info, then checks
    /// the whole tree out again from HEAD.
    pub fn unlock(&self) -> CryptResult<()> {
        let root = self.git.root()?;
        let index = self.git.git_dir()?.join("index");

        match fs::remove_file(&index) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(index = %index.display(), "no index to remove");
            }
            Err(e) => return Err(CryptError::file(&index, e)),
        }

        self.git.checkout_head(&root)?;
        tracing::info!(root = %root.display(), "working tree re-checked out");
        Ok(())
    }

    /// Report drift without changing anything.
    pub fn status(&self) -> CryptResult<PolicyStatus> {
        let root = self.git.root()?;

        let mut config = Vec::new();
        for (key, expected) in filter_entries(&self.command) {
            let actual = self.git.config_get(&key)?;
            config.push((key, actual.as_deref() == Some(expected.as_str())));
        }

        Ok(PolicyStatus {
            attributes_current: file_matches(&root.join(GITATTRIBUTES_FILE), GITATTRIBUTES)?,
            ignore_current: file_matches(&root.join(GITIGNORE_FILE), GITIGNORE)?,
            config,
        })
    }
}

fn write_policy_file(path: &Path, content: &str) -> CryptResult<()> {
    fs::write(path, content).map_err(|e| CryptError::file(path, e))
}

/// Missing counts as a mismatch.
fn file_matches(path: &Path, expected: &str) -> CryptResult<bool> {
    match fs::read(path) {
        Ok(actual) => Ok(actual == expected.as_bytes()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(CryptError::file(path, e)),
    }
}
