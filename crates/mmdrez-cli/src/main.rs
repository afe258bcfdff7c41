//! mmdrez: hybrid file encryption CLI
//!
//! Commands:
//!   keygen                  - generate an RSA key pair, private half password-protected
//!   encrypt <input>         - encrypt a file for the configured public key
//!   decrypt <container>     - decrypt a container with the protected private key
//!   wipe <path>...          - overwrite and delete files
//!   inspect <container>     - show container header and chunk layout (no key needed)
//!   passwd                  - change the private key password
//!   config show             - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::time::Duration;

use mmdrez_core::{MmdrezConfig, MmdrezResult};
use mmdrez_crypto::{KeyGenParams, WipeOptions};

const PASSWORD_ENV: &str = "MMDREZ_PASSWORD";
const NEW_PASSWORD_ENV: &str = "MMDREZ_NEW_PASSWORD";

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "mmdrez",
    version,
    about = "Hybrid RSA + AES-256-GCM file encryption",
    long_about = "mmdrez: encrypt files for an RSA public key, keep the private key \
                  password-protected at rest, and securely wipe plaintext originals"
)]
struct Cli {
    /// Path to config.toml
    #[arg(
        long,
        short = 'c',
        env = "MMDREZ_CONFIG",
        default_value = "~/.config/mmdrez/config.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides config
    #[arg(long, env = "MMDREZ_LOG")]
    log: Option<String>,

    /// Log format; overrides config
    #[arg(long, env = "MMDREZ_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate an RSA key pair; the private key is stored password-protected
    ///
    /// The password is read from MMDREZ_PASSWORD or prompted for (twice).
    Keygen {
        /// Public key output (default: config keys.public_key_path)
        #[arg(long)]
        public: Option<PathBuf>,
        /// Protected private key output (default: config keys.private_key_path)
        #[arg(long)]
        private: Option<PathBuf>,
        /// RSA modulus size in bits
        #[arg(long)]
        bits: Option<usize>,
        /// PBKDF2 iterations
        #[arg(long)]
        iterations: Option<u32>,
        /// Overwrite existing key files
        #[arg(long)]
        force: bool,
    },

    /// Encrypt a file into a container
    Encrypt {
        /// File to encrypt
        input: PathBuf,
        /// Recipient public key PEM (default: config keys.public_key_path)
        #[arg(long)]
        public_key: Option<PathBuf>,
        /// Container output path (default: input with the configured extension)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Plaintext bytes per chunk
        #[arg(long)]
        chunk_size: Option<u32>,
        /// Securely wipe the input after a successful encryption
        #[arg(long)]
        wipe: bool,
    },

    /// Decrypt a container
    ///
    /// The private key password is read from MMDREZ_PASSWORD or prompted for.
    Decrypt {
        /// Container to decrypt
        input: PathBuf,
        /// Protected private key (default: config keys.private_key_path)
        #[arg(long)]
        private_key: Option<PathBuf>,
        /// Output directory (default: the container's directory)
        #[arg(long, short = 'd')]
        out_dir: Option<PathBuf>,
    },

    /// Overwrite files with random data, then delete them
    ///
    /// Best-effort only: journaling, copy-on-write and flash storage may keep
    /// old blocks.
    Wipe {
        /// Files to wipe
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Overwrite passes
        #[arg(long)]
        passes: Option<u32>,
        /// Overwrite buffer size in bytes
        #[arg(long)]
        buffer_size: Option<usize>,
    },

    /// Show a container's header and chunk layout without decrypting
    Inspect {
        /// Container to inspect
        container: PathBuf,
        /// Emit JSON
        #[arg(long)]
        json: bool,
    },

    /// Change the private key password
    ///
    /// Current password: MMDREZ_PASSWORD or prompt. New password:
    /// MMDREZ_NEW_PASSWORD or prompt (twice).
    Passwd {
        /// Protected private key (default: config keys.private_key_path)
        #[arg(long)]
        private_key: Option<PathBuf>,
        /// PBKDF2 iterations for the re-protected key
        #[arg(long)]
        iterations: Option<u32>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let config = load_config(&config_path)?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = match cli.log_format {
        Some(f) => f,
        None if config.log.format.eq_ignore_ascii_case("json") => LogFormat::Json,
        None => LogFormat::Text,
    };
    init_logging(&level, &format);

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "mmdrez starting"
    );

    match cli.command {
        Commands::Keygen {
            public,
            private,
            bits,
            iterations,
            force,
        } => cmd_keygen(&config, public, private, bits, iterations, force).await,
        Commands::Encrypt {
            input,
            public_key,
            output,
            chunk_size,
            wipe,
        } => cmd_encrypt(&config, input, public_key, output, chunk_size, wipe).await,
        Commands::Decrypt {
            input,
            private_key,
            out_dir,
        } => cmd_decrypt(&config, input, private_key, out_dir).await,
        Commands::Wipe {
            paths,
            passes,
            buffer_size,
        } => cmd_wipe(&config, paths, passes, buffer_size).await,
        Commands::Inspect { container, json } => cmd_inspect(container, json).await,
        Commands::Passwd {
            private_key,
            iterations,
        } => cmd_passwd(&config, private_key, iterations).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &config_path),
    }
}

// ── Config loading / logging ──────────────────────────────────────────────────

fn load_config(path: &Path) -> Result<MmdrezConfig> {
    MmdrezConfig::load(path).with_context(|| format!("loading config: {}", path.display()))
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command output
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

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_prefix("~/") {
        Some(rest) => match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(rest),
            None => path.to_path_buf(),
        },
        None => path.to_path_buf(),
    }
}

// ── Password input ────────────────────────────────────────────────────────────

/// Read a password from `env_var`, or prompt on the terminal.
fn read_password(env_var: &str, prompt: &str, confirm: bool) -> Result<SecretString> {
    if let Ok(pw) = std::env::var(env_var) {
        return Ok(SecretString::from(pw));
    }
    let first = SecretString::from(
        rpassword::prompt_password(prompt).context("reading password from terminal")?,
    );
    if confirm {
        let second = SecretString::from(
            rpassword::prompt_password("Confirm password: ")
                .context("reading password from terminal")?,
        );
        if first.expose_secret() != second.expose_secret() {
            anyhow::bail!("passwords do not match");
        }
    }
    Ok(first)
}

// ── Background execution ──────────────────────────────────────────────────────

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Run a blocking engine call on the blocking pool behind a spinner.
async fn run_blocking<T, F>(prefix: &str, message: String, f: F) -> Result<T>
where
    F: FnOnce() -> MmdrezResult<T> + Send + 'static,
    T: Send + 'static,
{
    let pb = make_spinner(prefix);
    pb.set_message(message);
    let joined = tokio::task::spawn_blocking(f).await;
    pb.finish_and_clear();
    Ok(joined.context("background task failed")??)
}

// ── `mmdrez keygen` ───────────────────────────────────────────────────────────

async fn cmd_keygen(
    config: &MmdrezConfig,
    public: Option<PathBuf>,
    private: Option<PathBuf>,
    bits: Option<usize>,
    iterations: Option<u32>,
    force: bool,
) -> Result<()> {
    let public_path = expand_tilde(&public.unwrap_or_else(|| config.keys.public_key_path.clone()));
    let private_path =
        expand_tilde(&private.unwrap_or_else(|| config.keys.private_key_path.clone()));
    if !force {
        for path in [&public_path, &private_path] {
            if path.exists() {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
        }
    }

    let params = KeyGenParams {
        key_bits: bits.unwrap_or(config.keys.key_bits),
        iterations: iterations.unwrap_or(config.keys.pbkdf2_iterations),
    };
    let password = read_password(PASSWORD_ENV, "New private key password: ", true)?;

    let message = format!("generating {}-bit RSA key pair", params.key_bits);
    let (pub_out, priv_out) = (public_path.clone(), private_path.clone());
    run_blocking("keygen", message, move || {
        let pair = mmdrez_crypto::generate_key_pair(&password, &params)?;
        mmdrez_crypto::write_key_files(&pair, &pub_out, &priv_out)
    })
    .await
    .context("key generation failed")?;

    println!("Key pair generated");
    println!("  public:  {}", public_path.display());
    println!("  private: {} (password-protected)", private_path.display());
    Ok(())
}

// ── `mmdrez encrypt` ──────────────────────────────────────────────────────────

async fn cmd_encrypt(
    config: &MmdrezConfig,
    input: PathBuf,
    public_key: Option<PathBuf>,
    output: Option<PathBuf>,
    chunk_size: Option<u32>,
    wipe: bool,
) -> Result<()> {
    let key_path =
        expand_tilde(&public_key.unwrap_or_else(|| config.keys.public_key_path.clone()));
    let output = output
        .unwrap_or_else(|| mmdrez_crypto::default_output_path(&input, &config.encrypt.extension));
    let chunk_size = chunk_size.unwrap_or(config.encrypt.chunk_size);
    let wipe = wipe || config.encrypt.wipe_original;
    let wipe_opts = wipe_options(config, None, None);

    let message = format!("encrypting {}", input.display());
    let src = input.clone();
    let outcome = run_blocking("encrypt", message, move || {
        let pem = mmdrez_crypto::load_public_key(&key_path)?;
        mmdrez_crypto::encrypt_path(&src, &pem, Some(&output), chunk_size)
    })
    .await
    .with_context(|| format!("encrypting {}", input.display()))?;

    println!("Encrypted: {} → {}", input.display(), outcome.path.display());
    println!("  chunks: {}", outcome.summary.chunks);
    println!("  bytes:  {}", fmt_bytes(outcome.summary.bytes));

    if wipe {
        wipe_original(&input, &outcome.path, wipe_opts).await?;
        println!("  original wiped");
    }
    Ok(())
}

/// Wipe the plaintext once its container is safely on disk.
async fn wipe_original(input: &Path, container: &Path, opts: WipeOptions) -> Result<()> {
    let message = format!("wiping {} ({} passes)", input.display(), opts.passes);
    let target = input.to_path_buf();
    run_blocking("wipe", message, move || mmdrez_crypto::wipe_file(&target, &opts))
        .await
        .with_context(|| {
            format!(
                "container written to {}, but wiping {} failed",
                container.display(),
                input.display()
            )
        })
}

// ── `mmdrez decrypt` ──────────────────────────────────────────────────────────

async fn cmd_decrypt(
    config: &MmdrezConfig,
    input: PathBuf,
    private_key: Option<PathBuf>,
    out_dir: Option<PathBuf>,
) -> Result<()> {
    let key_path =
        expand_tilde(&private_key.unwrap_or_else(|| config.keys.private_key_path.clone()));
    let password = read_password(PASSWORD_ENV, "Private key password: ", false)?;

    let message = format!("decrypting {}", input.display());
    let src = input.clone();
    let outcome = run_blocking("decrypt", message, move || {
        let pem = mmdrez_crypto::load_private_key(&password, &key_path)?;
        mmdrez_crypto::decrypt_path(&src, pem.expose_secret(), out_dir.as_deref())
    })
    .await
    .with_context(|| format!("decrypting {}", input.display()))?;

    println!("Decrypted: {} → {}", input.display(), outcome.path.display());
    println!("  chunks: {}", outcome.summary.chunks);
    println!("  bytes:  {}", fmt_bytes(outcome.summary.bytes));
    Ok(())
}

// ── `mmdrez wipe` ─────────────────────────────────────────────────────────────

fn wipe_options(
    config: &MmdrezConfig,
    passes: Option<u32>,
    buffer_size: Option<usize>,
) -> WipeOptions {
    WipeOptions {
        passes: passes.unwrap_or(config.wipe.passes),
        buffer_size: buffer_size.unwrap_or(config.wipe.buffer_size),
    }
    .normalized()
}

async fn cmd_wipe(
    config: &MmdrezConfig,
    paths: Vec<PathBuf>,
    passes: Option<u32>,
    buffer_size: Option<usize>,
) -> Result<()> {
    let opts = wipe_options(config, passes, buffer_size);
    let mut failed = 0usize;

    for path in paths {
        let message = format!("wiping {} ({} passes)", path.display(), opts.passes);
        let (target, o) = (path.clone(), opts.clone());
        match run_blocking("wipe", message, move || mmdrez_crypto::wipe_file(&target, &o)).await {
            Ok(()) => println!("Wiped: {}", path.display()),
            Err(e) => {
                eprintln!("error: {}: {e:#}", path.display());
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} file(s) could not be wiped");
    }
    Ok(())
}

// ── `mmdrez inspect` ──────────────────────────────────────────────────────────

async fn cmd_inspect(container: PathBuf, json: bool) -> Result<()> {
    let src = container.clone();
    let info = run_blocking("inspect", format!("reading {}", container.display()), move || {
        let file = std::fs::File::open(&src).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => mmdrez_core::MmdrezError::NotFound(src.clone()),
            _ => e.into(),
        })?;
        mmdrez_crypto::inspect(&mut std::io::BufReader::new(file))
    })
    .await
    .with_context(|| format!("inspecting {}", container.display()))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&info).context("serializing container info")?
        );
        return Ok(());
    }

    println!("Container: {}", container.display());
    println!("  version:     {}", info.header.version);
    println!("  file name:   {}", info.header.file_name);
    println!("  wrapped key: {} bytes", info.header.wrapped_key_len);
    println!("  base nonce:  {}", info.header.base_nonce);
    println!("  chunk size:  {}", fmt_bytes(info.header.chunk_size as u64));
    println!("  header:      {} bytes", info.header.header_len);
    println!("  chunks:      {}", info.chunks);
    println!("  plaintext:   {}", fmt_bytes(info.plaintext_len));
    Ok(())
}

// ── `mmdrez passwd` ───────────────────────────────────────────────────────────

async fn cmd_passwd(
    config: &MmdrezConfig,
    private_key: Option<PathBuf>,
    iterations: Option<u32>,
) -> Result<()> {
    let key_path =
        expand_tilde(&private_key.unwrap_or_else(|| config.keys.private_key_path.clone()));
    if !key_path.is_file() {
        anyhow::bail!("private key not found: {}", key_path.display());
    }
    let iterations = iterations.unwrap_or(config.keys.pbkdf2_iterations);
    let old = read_password(PASSWORD_ENV, "Current password: ", false)?;
    let new = read_password(NEW_PASSWORD_ENV, "New password: ", true)?;

    let target = key_path.clone();
    run_blocking("passwd", "re-protecting private key".to_string(), move || {
        let current = std::fs::read(&target)?;
        let rewrapped = mmdrez_crypto::change_password(&old, &new, &current, iterations)?;
        mmdrez_crypto::write_private_key_file(&rewrapped, &target)
    })
    .await
    .context("changing password failed")?;

    println!("Password changed: {}", key_path.display());
    Ok(())
}

// ── `mmdrez config show` ──────────────────────────────────────────────────────

fn cmd_config_show(config: &MmdrezConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_encrypt_args() {
        let cli = Cli::try_parse_from([
            "mmdrez",
            "encrypt",
            "report.pdf",
            "--chunk-size",
            "4096",
            "--wipe",
        ])
        .unwrap();
        match cli.command {
            Commands::Encrypt {
                input,
                chunk_size,
                wipe,
                output,
                ..
            } => {
                assert_eq!(input, PathBuf::from("report.pdf"));
                assert_eq!(chunk_size, Some(4096));
                assert!(wipe);
                assert!(output.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_wipe_requires_path() {
        assert!(Cli::try_parse_from(["mmdrez", "wipe"]).is_err());
    }

    #[test]
    fn test_expand_tilde() {
        let plain = Path::new("/etc/mmdrez.toml");
        assert_eq!(expand_tilde(plain), plain);
        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(
                expand_tilde(Path::new("~/keys/public.pem")),
                PathBuf::from(home).join("keys/public.pem")
            );
        }
    }

    #[test]
    fn test_wipe_options_from_config() {
        let config = MmdrezConfig::default();
        let opts = wipe_options(&config, Some(0), None);
        assert_eq!(opts.passes, 1);
        assert_eq!(opts.buffer_size, 65536);
    }

    #[test]
    fn test_fmt_bytes() {
        assert_eq!(fmt_bytes(512), "512 B");
        assert_eq!(fmt_bytes(1536), "1.5 KB");
        assert_eq!(fmt_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_load_config_missing_is_default() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("none.toml")).unwrap();
        assert_eq!(config.encrypt.chunk_size, 65536);
    }

    #[test]
    fn test_load_config_invalid_reports_path() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[encrypt]\nchunk_size = \"big\"\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("config.toml"));
    }

    #[tokio::test]
    async fn test_wipe_failure_names_existing_container() {
        let tmp = tempfile::TempDir::new().unwrap();
        let input = tmp.path().join("not-a-file");
        std::fs::create_dir(&input).unwrap();
        let container = tmp.path().join("report.mmdrez");

        let err = wipe_original(&input, &container, WipeOptions::default())
            .await
            .unwrap_err();

        let rendered = format!("{err:#}");
        assert!(rendered.contains("container written to"), "{rendered}");
        assert!(rendered.contains("report.mmdrez"), "{rendered}");
        assert!(!rendered.starts_with("encrypting"), "{rendered}");
    }

    #[tokio::test]
    async fn test_wipe_original_removes_input() {
        let tmp = tempfile::TempDir::new().unwrap();
        let input = tmp.path().join("plain.txt");
        std::fs::write(&input, b"plaintext").unwrap();

        wipe_original(&input, &tmp.path().join("plain.mmdrez"), WipeOptions::default())
            .await
            .unwrap();
        assert!(!input.exists());
    }
}
