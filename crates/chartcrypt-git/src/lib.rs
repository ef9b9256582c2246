//! chartcrypt-git: keeps a repository wired to the chartcrypt filters
//!
//! Two tracked files carry the policy (`.gitattributes`, `.gitignore`) and
//! four local config entries bind the `chartcrypt` filter and diff driver to
//! the `encrypt`/`decrypt` commands. Any drift in the tracked files is fixed by
//! reinstalling everything, never by patching.

pub mod backend;
pub mod policy;

pub use backend::{GitBackend, GitCli};
pub use policy::{
    filter_entries, FilterPolicy, PolicyStatus, Reconciled, FILTER_NAME, GITATTRIBUTES,
    GITATTRIBUTES_FILE, GITIGNORE, GITIGNORE_FILE,
};
