use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Table};

use plakar_core::commands;
use plakar_core::config::CreateOptions;
use plakar_core::context::AppContext;
use plakar_core::repository::Repository;
use plakar_core::signify;
use plakar_core::storage;

type CliError = Box<dyn std::error::Error>;

#[derive(Parser)]
#[command(
    name = "plakar",
    version,
    about = "Content-addressed, deduplicating snapshot engine",
    after_help = "\
Environment variables:
  PLAKAR_REPOSITORY   Repository location (overrides --repository)
  PLAKAR_PASSPHRASE   Repository passphrase (skips interactive prompt)"
)]
struct Cli {
    /// Repository location (path)
    #[arg(short = 'r', long, global = true, env = "PLAKAR_REPOSITORY")]
    repository: Option<String>,

    /// Local cache directory override
    #[arg(long, global = true)]
    cache: Option<PathBuf>,

    /// Disable the local artifact cache
    #[arg(long, global = true)]
    no_cache: bool,

    /// Worker parallelism (default: number of CPUs minus one)
    #[arg(long, global = true)]
    cpu: Option<usize>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Enable trace-level logging
    #[arg(long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new repository
    Create {
        /// Repository path (defaults to --repository)
        path: Option<String>,

        /// Do not encrypt repository contents
        #[arg(long)]
        no_encryption: bool,

        /// Do not compress repository contents
        #[arg(long)]
        no_compression: bool,

        /// Digest algorithm (sha256, blake2b256)
        #[arg(long, default_value = "sha256")]
        hashing: String,
    },

    /// Create a new snapshot of one or more directories
    Push {
        /// Tag to assign to this snapshot
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Keyfile to use for snapshot signing
        #[arg(long)]
        sign: Option<PathBuf>,

        /// Directories to snapshot (defaults to the current directory)
        paths: Vec<String>,
    },

    /// List snapshots
    Ls,

    /// Print a file from a snapshot to stdout
    Cat {
        /// <snapshot>:<path>
        target: String,
    },

    /// Search pathnames across snapshots
    Find {
        pattern: String,
    },

    /// Verify snapshot integrity
    Check {
        /// Restrict the check to one snapshot
        snapshot: Option<String>,
    },

    /// Reclaim space from unreferenced packfiles and artifacts
    Cleanup,

    /// Remove a snapshot
    Rm {
        snapshot: String,
    },

    /// Generate a signify keypair for snapshot signing
    Keygen {
        /// Destination keyfile (JSON)
        keyfile: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.trace {
        "trace"
    } else {
        match cli.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("plakar: error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut ctx = AppContext::new(
        std::env::args().collect::<Vec<_>>().join(" "),
    );
    if let Some(cpu) = cli.cpu {
        ctx.num_cpu = cpu.max(1);
    }
    if cli.no_cache {
        ctx.cache_dir = None;
    } else if let Some(cache) = &cli.cache {
        ctx.cache_dir = Some(cache.clone());
    }

    match cli.command {
        Commands::Create {
            path,
            no_encryption,
            no_compression,
            hashing,
        } => {
            let location = path
                .or(cli.repository)
                .ok_or("no repository path; pass one or set PLAKAR_REPOSITORY")?;
            let passphrase = if no_encryption {
                None
            } else {
                Some(new_passphrase()?)
            };
            let id = commands::create::run(
                &location,
                CreateOptions {
                    hashing,
                    compression: !no_compression,
                    passphrase,
                },
            )?;
            println!("created repository {id} at {location}");
            Ok(())
        }

        Commands::Push { tags, sign, paths } => {
            let mut repo = open_repository(&cli.repository, &ctx)?;
            let sign_key = match sign {
                Some(keyfile) => Some(unlock_keyfile(&keyfile)?),
                None => None,
            };
            let paths = if paths.is_empty() {
                vec![std::env::current_dir()?.display().to_string()]
            } else {
                paths
            };
            let outcome = commands::push::run(
                &ctx,
                &mut repo,
                &paths,
                commands::push::PushOptions {
                    tags,
                    sign_key,
                    concurrency: 0,
                },
            )?;
            println!(
                "created snapshot {} ({} files, {} new chunks, {} packfiles, {})",
                &outcome.snapshot_id.to_string()[..8],
                outcome.stats.files,
                outcome.stats.chunks_written,
                outcome.stats.packfiles_written,
                format_bytes(outcome.stats.bytes_written),
            );
            if outcome.stats.errors > 0 {
                eprintln!("warning: {} files skipped", outcome.stats.errors);
            }
            Ok(())
        }

        Commands::Ls => {
            let repo = open_repository(&cli.repository, &ctx)?;
            let summaries = commands::ls::run(&repo)?;
            if summaries.is_empty() {
                println!("no snapshots");
                return Ok(());
            }
            let mut table = Table::new();
            table.load_preset(UTF8_FULL_CONDENSED);
            table.set_header(vec!["Id", "Date", "Host", "User", "Files", "Tags", "Signed"]);
            for s in &summaries {
                table.add_row(vec![
                    s.id.to_string()[..8].to_string(),
                    s.creation_time.format("%Y-%m-%d %H:%M:%S").to_string(),
                    s.hostname.clone(),
                    s.username.clone(),
                    s.files_count.to_string(),
                    s.tags.join(","),
                    if s.signed { "yes" } else { "" }.to_string(),
                ]);
            }
            println!("{table}");
            Ok(())
        }

        Commands::Cat { target } => {
            let repo = open_repository(&cli.repository, &ctx)?;
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            commands::cat::run(&repo, &target, &mut out)?;
            out.flush()?;
            Ok(())
        }

        Commands::Find { pattern } => {
            let repo = open_repository(&cli.repository, &ctx)?;
            for m in commands::find::run(&repo, &pattern)? {
                println!("{}:{}", &m.snapshot_id.to_string()[..8], m.pathname);
            }
            Ok(())
        }

        Commands::Check { snapshot } => {
            let repo = open_repository(&cli.repository, &ctx)?;
            let result = commands::check::run(&repo, snapshot.as_deref())?;
            for error in &result.errors {
                eprintln!(
                    "{}: {}: {}",
                    &error.snapshot_id.to_string()[..8],
                    error.context,
                    error.message
                );
            }
            println!(
                "checked {} snapshots, {} objects, {} chunks: {}",
                result.snapshots_checked,
                result.objects_checked,
                result.chunks_checked,
                if result.is_clean() {
                    "ok".to_string()
                } else {
                    format!("{} errors", result.errors.len())
                }
            );
            if !result.is_clean() {
                std::process::exit(1);
            }
            Ok(())
        }

        Commands::Cleanup => {
            let mut repo = open_repository(&cli.repository, &ctx)?;
            let stats = commands::cleanup::run(&ctx, &mut repo)?;
            println!(
                "cleanup: {} packfiles deleted, {} artifacts deleted, {} freed",
                stats.packfiles_deleted,
                stats.artifacts_deleted,
                format_bytes(stats.space_freed),
            );
            Ok(())
        }

        Commands::Rm { snapshot } => {
            let repo = open_repository(&cli.repository, &ctx)?;
            let id = commands::rm::run(&repo, &snapshot)?;
            println!("removed snapshot {}", &id.to_string()[..8]);
            Ok(())
        }

        Commands::Keygen { keyfile } => {
            if keyfile.exists() {
                return Err(format!("file already exists: {}", keyfile.display()).into());
            }
            let p1 = rpassword::prompt_password("signify passphrase: ")?;
            let p2 = rpassword::prompt_password("confirm passphrase: ")?;
            if p1 != p2 {
                return Err("passphrases do not match".into());
            }
            let keypair = signify::generate(&p1)?;
            keypair.save(&keyfile)?;
            println!("keypair written to {}", keyfile.display());
            Ok(())
        }
    }
}

/// Open the repository named by `--repository` / `PLAKAR_REPOSITORY`,
/// prompting for the passphrase only when the CONFIG requires one.
fn open_repository(
    repository: &Option<String>,
    ctx: &AppContext,
) -> Result<Repository, CliError> {
    let location = repository
        .as_deref()
        .ok_or("no repository; pass --repository or set PLAKAR_REPOSITORY")?;

    let backend = storage::backend_for_location(location)?;
    let config = backend.open()?;

    let passphrase = if config.encryption.is_empty() {
        None
    } else {
        Some(get_passphrase()?)
    };

    Ok(Repository::open(
        backend,
        passphrase.as_deref(),
        ctx.cache_dir.clone(),
    )?)
}

fn get_passphrase() -> Result<String, CliError> {
    if let Ok(pass) = std::env::var("PLAKAR_PASSPHRASE") {
        if !pass.is_empty() {
            return Ok(pass);
        }
    }
    Ok(rpassword::prompt_password("repository passphrase: ")?)
}

fn new_passphrase() -> Result<String, CliError> {
    if let Ok(pass) = std::env::var("PLAKAR_PASSPHRASE") {
        if !pass.is_empty() {
            return Ok(pass);
        }
    }
    let p1 = rpassword::prompt_password("new repository passphrase: ")?;
    let p2 = rpassword::prompt_password("confirm passphrase: ")?;
    if p1 != p2 {
        return Err("passphrases do not match".into());
    }
    Ok(p1)
}

/// Unlock a signing keyfile, re-prompting on a wrong passphrase.
fn unlock_keyfile(path: &std::path::Path) -> Result<signify::SecretKey, CliError> {
    let keypair = signify::KeypairFile::load(path)?;
    loop {
        let passphrase = rpassword::prompt_password("signify passphrase: ")?;
        match keypair.unlock(&passphrase) {
            Ok(key) => return Ok(key),
            Err(e) => eprintln!("unlock failed: {e}"),
        }
    }
}

fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;

    if bytes >= GIB {
        format!("{:.2} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.2} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}
