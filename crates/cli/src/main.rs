mod commands;
mod datasets;
mod workspace;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use workspace::Workspace;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Deterministic MRV calculation and audit engine.
#[derive(Parser)]
#[command(
    name = "mrv",
    version,
    about = "Deterministic MRV calculation and audit engine for ETS/CBAM"
)]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Snapshot ledger file
    #[arg(long, global = true, default_value = "mrv-ledger.json")]
    ledger: PathBuf,

    /// Directory holding content-addressed datasets and the factor catalog
    #[arg(long, global = true, default_value = "mrv-data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a calculation and append a snapshot to the ledger
    Run {
        /// Path to the calculation request JSON file
        request: PathBuf,
        /// Engine configuration TOML; replaces the request's `config`
        #[arg(long)]
        config: Option<PathBuf>,
        /// Lock the snapshot right after saving it
        #[arg(long)]
        lock: bool,
    },

    /// List snapshots, optionally for one project/facility
    List {
        #[arg(long)]
        project: Option<String>,
        /// Requires --project
        #[arg(long, requires = "project")]
        facility: Option<String>,
    },

    /// Lock a snapshot; locked snapshots can no longer change
    Lock {
        id: u64,
    },

    /// Delete a draft snapshot
    Delete {
        id: u64,
    },

    /// Verify the hash chain of one project/facility
    Chain {
        project: String,
        facility: String,
    },

    /// Recompute a snapshot from its recorded references and compare hashes
    Replay {
        id: u64,
        /// Factor catalog JSON (array of factors); defaults to the one
        /// recorded in the data directory
        #[arg(long)]
        factors: Option<PathBuf>,
    },

    /// Re-evaluate compliance rules against a stored snapshot
    Check {
        id: u64,
        /// Rule set TOML files; defaults to the built-in ETS and CBAM sets
        #[arg(long = "rules")]
        rules: Vec<PathBuf>,
    },

    /// Build a signed evidence pack for a snapshot
    Pack {
        id: u64,
        /// Output archive path
        #[arg(long)]
        out: PathBuf,
        /// File holding a shared HMAC-SHA256 secret
        #[arg(long)]
        hmac_secret: Option<PathBuf>,
        /// Ed25519 secret key file (from `mrv keygen`)
        #[arg(long)]
        key: Option<PathBuf>,
    },

    /// Verify an evidence pack's hashes and signatures
    VerifyPack {
        /// Path to the evidence pack archive
        pack: PathBuf,
        /// File holding the shared HMAC-SHA256 secret
        #[arg(long)]
        hmac_secret: Option<PathBuf>,
        /// Ed25519 public key file
        #[arg(long)]
        pubkey: Option<PathBuf>,
        /// Fail unless at least one signature verifies
        #[arg(long)]
        require_signature: bool,
    },

    /// Generate an Ed25519 signing keypair
    Keygen {
        /// Output file prefix (writes <prefix>.secret and <prefix>.pub)
        #[arg(long, default_value = "mrv-key")]
        prefix: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let workspace = Workspace::new(cli.ledger, cli.data_dir);
    let out = Printer {
        format: cli.output,
        quiet: cli.quiet,
    };

    let result = match cli.command {
        Commands::Run {
            request,
            config,
            lock,
        } => commands::run::cmd_run(&workspace, &request, config.as_deref(), lock, out),
        Commands::List { project, facility } => {
            commands::snapshots::cmd_list(&workspace, project.as_deref(), facility.as_deref(), out)
        }
        Commands::Lock { id } => commands::snapshots::cmd_lock(&workspace, id, out),
        Commands::Delete { id } => commands::snapshots::cmd_delete(&workspace, id, out),
        Commands::Chain { project, facility } => {
            commands::snapshots::cmd_chain(&workspace, &project, &facility, out)
        }
        Commands::Replay { id, factors } => {
            commands::replay::cmd_replay(&workspace, id, factors.as_deref(), out)
        }
        Commands::Check { id, rules } => commands::check::cmd_check(&workspace, id, &rules, out),
        Commands::Pack {
            id,
            out: path,
            hmac_secret,
            key,
        } => commands::evidence::cmd_pack(
            &workspace,
            id,
            &path,
            hmac_secret.as_deref(),
            key.as_deref(),
            out,
        ),
        Commands::VerifyPack {
            pack,
            hmac_secret,
            pubkey,
            require_signature,
        } => commands::evidence::cmd_verify_pack(
            &pack,
            hmac_secret.as_deref(),
            pubkey.as_deref(),
            require_signature,
            out,
        ),
        Commands::Keygen { prefix } => commands::evidence::cmd_keygen(&prefix, out),
    };

    if let Err(msg) = result {
        report_error(&format!("error: {}", msg), cli.output, cli.quiet);
        process::exit(1);
    }
}

/// Log to stderr, filtered by `MRV_LOG` (default `warn`).
fn init_tracing() {
    let filter = EnvFilter::try_from_env("MRV_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Where command results go: stdout, as text or JSON.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Printer {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl Printer {
    /// Print `value` as pretty JSON, or `text()` in text mode.
    pub(crate) fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) {
        if self.quiet {
            return;
        }
        match self.format {
            OutputFormat::Json => println!(
                "{}",
                serde_json::to_string_pretty(value)
                    .unwrap_or_else(|e| format!("serialization error: {}", e))
            ),
            OutputFormat::Text => println!("{}", text()),
        }
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
