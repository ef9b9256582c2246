//! chartcrypt: transparent encryption for chart and infra repositories
//!
//! Filter commands (invoked by git, stdin → stdout):
//!   encrypt             - clean filter
//!   decrypt [file]      - smudge filter and diff textconv
//!
//! Repository commands:
//!   init [--check]      - install (or reconcile) the filter policy
//!   unlock              - re-check out the tree through the smudge filter
//!   status              - policy drift, key and envelope presence
//!   share --email ...   - wrap the key to registered users
//!   recipients          - list who the key is wrapped to
//!
//! Key commands:
//!   import / export [--id] / random [N] / recover / setup-keys --name

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use chartcrypt_core::config::ChartcryptConfig;
use chartcrypt_core::paths;
use chartcrypt_crypto::{random_bytes, KeyStore};
use chartcrypt_git::{FilterPolicy, GitBackend, GitCli, Reconciled};
use chartcrypt_secrets::{
    GraphqlRegistry, KeyResolver, KeySource, KubeSecretSource, RepoEnvelope,
};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "chartcrypt",
    version,
    about = "Transparent git encryption for chart and infrastructure repositories"
)]
struct Cli {
    /// Path to config.toml (default: ~/.chartcrypt/config.toml)
    #[arg(long, short = 'c', global = true, env = "CHARTCRYPT_CONFIG")]
    config: Option<PathBuf>,

    /// Symmetric key file (overrides [crypto] key_file)
    #[arg(long, global = true, env = "CHARTCRYPT_KEY_FILE")]
    encryption_key_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG wins
    #[arg(long, global = true, env = "CHARTCRYPT_LOG")]
    log: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true, env = "CHARTCRYPT_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt stdin to stdout (git clean filter)
    Encrypt,

    /// Decrypt a file, or stdin, to stdout (git smudge filter / textconv)
    Decrypt {
        /// File to read instead of stdin
        file: Option<PathBuf>,
    },

    /// Install the git filters, .gitattributes and .gitignore, and make sure a key exists
    Init {
        /// Only reinstall when .gitattributes or .gitignore have drifted
        #[arg(long)]
        check: bool,
    },

    /// Decrypt every filtered file in the working tree
    Unlock,

    /// Replace the local key with a record read from stdin
    Import,

    /// Print the key record the filters use to stdout
    Export {
        /// Print the key fingerprint instead of the key
        #[arg(long)]
        id: bool,
    },

    /// Print N random bytes as base64
    Random {
        /// Number of random bytes
        #[arg(long, default_value_t = 32)]
        len: usize,

        /// Overrides --len
        length: Option<usize>,
    },

    /// Restore the key from the cluster's console secret
    Recover,

    /// Let other users decrypt this repository
    Share {
        /// Email to share with (repeatable)
        #[arg(long = "email", required = true)]
        emails: Vec<String>,
    },

    /// Create an age identity and register its public key
    #[command(name = "setup-keys")]
    SetupKeys {
        /// Name to register the key under
        #[arg(long)]
        name: String,
    },

    /// Show filter policy and key status
    Status,

    /// List the recipients the repository key is wrapped to
    Recipients,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(paths::default_config_path);
    let mut config = load_config(&config_path)?;
    if let Some(key_file) = &cli.encryption_key_file {
        config.crypto.key_file = Some(key_file.clone());
    }

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli.log_format.clone().unwrap_or(match config.log.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, &format);

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        command = ?cli.command,
        "chartcrypt starting"
    );

    match cli.command {
        Commands::Encrypt => cmd_encrypt(&config).await,
        Commands::Decrypt { file } => cmd_decrypt(&config, file.as_deref()).await,
        Commands::Init { check } => cmd_init(&config, check).await,
        Commands::Unlock => cmd_unlock(&config),
        Commands::Import => cmd_import(&config).await,
        Commands::Export { id } => cmd_export(&config, id).await,
        Commands::Random { len, length } => cmd_random(length.unwrap_or(len)),
        Commands::Recover => cmd_recover(&config).await,
        Commands::Share { emails } => cmd_share(&config, &emails).await,
        Commands::SetupKeys { name } => cmd_setup_keys(&config, &name).await,
        Commands::Status => cmd_status(&config).await,
        Commands::Recipients => cmd_recipients().await,
    }
}

// ── Config / logging ──────────────────────────────────────────────────────────

fn load_config(path: &Path) -> Result<ChartcryptConfig> {
    ChartcryptConfig::load(path).with_context(|| format!("loading config: {}", path.display()))
}

/// stdout carries filter data, so every log line goes to stderr.
fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn key_store(config: &ChartcryptConfig) -> KeyStore {
    KeyStore::new(config.crypto.key_path())
}

fn key_resolver(config: &ChartcryptConfig) -> Result<KeyResolver> {
    let cwd = std::env::current_dir().context("reading current directory")?;
    Ok(KeyResolver::new(
        key_store(config),
        config.crypto.identity_path(),
        cwd,
    ))
}

fn registry(config: &ChartcryptConfig) -> Result<GraphqlRegistry> {
    let endpoint = config.api.endpoint.clone().context(
        "no registry endpoint configured\n\
         Set [api] endpoint in ~/.chartcrypt/config.toml",
    )?;
    let token = std::env::var("CHARTCRYPT_TOKEN")
        .ok()
        .filter(|t| !t.is_empty())
        .or_else(|| config.api.token.clone())
        .context("no registry token: set CHARTCRYPT_TOKEN or [api] token")?;
    Ok(GraphqlRegistry::new(endpoint, SecretString::from(token)))
}

// ── Filter commands ───────────────────────────────────────────────────────────

async fn read_stdin() -> Result<Vec<u8>> {
    let mut input = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut input)
        .await
        .context("reading stdin")?;
    Ok(input)
}

async fn write_stdout(bytes: &[u8]) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(bytes).await.context("writing stdout")?;
    stdout.flush().await.context("flushing stdout")?;
    Ok(())
}

async fn cmd_encrypt(config: &ChartcryptConfig) -> Result<()> {
    let input = read_stdin().await?;
    let output = key_resolver(config)?.seal(input).await?;
    write_stdout(&output).await
}

async fn cmd_decrypt(config: &ChartcryptConfig, file: Option<&Path>) -> Result<()> {
    let input = match file {
        Some(path) => tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?,
        None => read_stdin().await?,
    };
    let output = key_resolver(config)?.open(input).await?;
    write_stdout(&output).await
}

// ── Repository commands ───────────────────────────────────────────────────────

async fn cmd_init(config: &ChartcryptConfig, check: bool) -> Result<()> {
    let git = GitCli::current()?;
    let policy = FilterPolicy::new(&git, config.filter.command.as_str());

    if check {
        match policy.check_and_reconcile()? {
            Reconciled::UpToDate => println!("git encryption filters up to date"),
            Reconciled::Reinstalled => println!("git encryption filters reinstalled"),
        }
    } else {
        println!("Creating git encryption filters");
        policy.install()?;
    }

    let (record, source) = key_resolver(config)?.resolve().await?;
    match source {
        KeySource::Generated(path) => {
            println!("generated new key {} at {}", record.id(), path.display())
        }
        KeySource::LocalFile(path) => println!("using key {} from {}", record.id(), path.display()),
        KeySource::Envelope(path) => {
            println!("using shared key {} from {}", record.id(), path.display())
        }
    }
    Ok(())
}

fn cmd_unlock(config: &ChartcryptConfig) -> Result<()> {
    let git = GitCli::current()?;
    FilterPolicy::new(&git, config.filter.command.as_str())
        .unlock()
        .context("unlocking repository")?;
    Ok(())
}

async fn cmd_status(config: &ChartcryptConfig) -> Result<()> {
    let store = key_store(config);
    match store.load() {
        Ok(Some(record)) => println!("key:         {} ({})", record.id(), store.path().display()),
        Ok(None) => println!("key:         none ({})", store.path().display()),
        Err(e) => println!("key:         UNREADABLE: {e}"),
    }

    let identity = config.crypto.identity_path();
    println!(
        "identity:    {}",
        if identity.exists() {
            identity.display().to_string()
        } else {
            "none (run: chartcrypt setup-keys --name <name>)".to_string()
        }
    );

    let git = GitCli::current()?;
    let root = git.root()?;
    let status = FilterPolicy::new(&git, config.filter.command.as_str()).status()?;

    println!("repository:  {}", root.display());
    println!("  .gitattributes: {}", current_label(status.attributes_current));
    println!("  .gitignore:     {}", current_label(status.ignore_current));
    for (key, ok) in &status.config {
        println!("  {key}: {}", current_label(*ok));
    }

    let envelope = RepoEnvelope::new(&root);
    if envelope.envelope_path().exists() {
        let recipients = envelope.load_recipients().await?;
        println!("  shared with:    {} recipient(s)", recipients.len());
    } else {
        println!("  shared with:    nobody");
    }

    if !status.is_current() {
        println!("\nrun `chartcrypt init --check` to reconcile");
    }
    Ok(())
}

fn current_label(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "OUT OF DATE"
    }
}

async fn cmd_share(config: &ChartcryptConfig, emails: &[String]) -> Result<()> {
    let registry = registry(config)?;
    let root = GitCli::current()?.root()?;
    let envelope = RepoEnvelope::new(&root);

    let outcome =
        chartcrypt_secrets::share(&registry, &envelope, &key_resolver(config)?, emails).await?;

    println!(
        "key shared with {} new recipient(s), {} total",
        outcome.added, outcome.total
    );
    println!(
        "commit {} to publish the change",
        envelope.dir().strip_prefix(&root).unwrap_or(envelope.dir()).display()
    );
    Ok(())
}

async fn cmd_recipients() -> Result<()> {
    let root = GitCli::current()?.root()?;
    let recipients = RepoEnvelope::new(&root).load_recipients().await?;

    if recipients.is_empty() {
        println!("repository key is not shared with anyone");
        return Ok(());
    }
    for recipient in &recipients.recipients {
        println!("{}\t{}", recipient.email, recipient.public_key);
    }
    Ok(())
}

// ── Key commands ──────────────────────────────────────────────────────────────

async fn cmd_import(config: &ChartcryptConfig) -> Result<()> {
    let input = read_stdin().await?;
    let record = key_store(config).import(&input).context("importing key")?;
    eprintln!("imported key {}", record.id());
    Ok(())
}

async fn cmd_export(config: &ChartcryptConfig, id: bool) -> Result<()> {
    let keys = key_resolver(config)?;
    if id {
        println!("{}", keys.resolve().await?.0.id());
        return Ok(());
    }
    write_stdout(keys.export().await?.as_bytes()).await
}

fn cmd_random(len: usize) -> Result<()> {
    println!("{}", random_bytes(len));
    Ok(())
}

async fn cmd_recover(config: &ChartcryptConfig) -> Result<()> {
    let source = KubeSecretSource::try_default().await?;
    let record = chartcrypt_secrets::recover(&source, &config.cluster, &key_store(config))
        .await
        .context("recovering key from cluster")?;

    println!("recovered key {}", record.id());
    println!("next: run `chartcrypt init` in the repository, then `chartcrypt unlock`");
    Ok(())
}

async fn cmd_setup_keys(config: &ChartcryptConfig, name: &str) -> Result<()> {
    let registry = registry(config)?;
    let setup =
        chartcrypt_secrets::setup_identity(&registry, &config.crypto.identity_path(), name).await?;

    if setup.generated {
        println!("generated age identity at {}", config.crypto.identity_path().display());
    }
    println!("public key {} uploaded as {name}", setup.public_key);
    Ok(())
}
