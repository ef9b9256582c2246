//! Narrow view of git used by the filter policy.

use std::path::{Path, PathBuf};
use std::process::Command;

use chartcrypt_core::{CryptError, CryptResult};

pub trait GitBackend {
    /// Top of the working tree.
    fn root(&self) -> CryptResult<PathBuf>;

    /// The repository's git directory (`.git` or a worktree gitdir).
    fn git_dir(&self) -> CryptResult<PathBuf>;

    /// Local config value, `None` when unset.
    fn config_get(&self, key: &str) -> CryptResult<Option<String>>;

    /// Write a local config value. Failures map to `CryptError::FilterConfig`.
    fn config_set(&self, key: &str, value: &str) -> CryptResult<()>;

    /// `git checkout HEAD -- <path>`
    fn checkout_head(&self, path: &Path) -> CryptResult<()>;
}

/// Shells out to the `git` binary, running every command from `workdir`.
#[derive(Debug, Clone)]
pub struct GitCli {
    workdir: PathBuf,
}

impl GitCli {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Use the process working directory.
    pub fn current() -> CryptResult<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    fn run(&self, args: &[&str]) -> CryptResult<std::process::Output> {
        tracing::debug!(args = ?args, workdir = %self.workdir.display(), "running git");
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .map_err(|e| CryptError::Io(std::io::Error::new(e.kind(), format!("running git: {e}"))))
    }

    fn run_checked(&self, args: &[&str]) -> CryptResult<String> {
        let output = self.run(args)?;
        if !output.status.success() {
            return Err(command_error(args, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }
}

fn command_error(args: &[&str], output: &std::process::Output) -> CryptError {
    CryptError::Command {
        program: "git".into(),
        args: args.iter().map(|a| a.to_string()).collect(),
        status: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

impl GitBackend for GitCli {
    fn root(&self) -> CryptResult<PathBuf> {
        self.run_checked(&["rev-parse", "--show-toplevel"])
            .map(PathBuf::from)
    }

    fn git_dir(&self) -> CryptResult<PathBuf> {
        let dir = PathBuf::from(self.run_checked(&["rev-parse", "--git-dir"])?);
        if dir.is_absolute() {
            Ok(dir)
        } else {
            Ok(self.workdir.join(dir))
        }
    }

    fn config_get(&self, key: &str) -> CryptResult<Option<String>> {
        let args = ["config", "--local", "--get", key];
        let output = self.run(&args)?;
        match output.status.code() {
            Some(0) => Ok(Some(
                String::from_utf8_lossy(&output.stdout).trim_end().to_string(),
            )),
            // git exits 1 when the key is not set
            Some(1) => Ok(None),
            _ => Err(command_error(&args, &output)),
        }
    }

    fn config_set(&self, key: &str, value: &str) -> CryptResult<()> {
        let output = self.run(&["config", "--local", key, value])?;
        if !output.status.success() {
            return Err(CryptError::FilterConfig {
                entry: key.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    fn checkout_head(&self, path: &Path) -> CryptResult<()> {
        let path = path.to_string_lossy();
        self.run_checked(&["checkout", "HEAD", "--", &path])
            .map(|_| ())
    }
}
