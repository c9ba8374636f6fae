use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "mrc")]
#[command(about = "Sorted-feed mirror reconciler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile a PRIMARY feed against its SECONDARY mirror and deliver the
    /// resulting CREATE / UPDATE / DELETE events.
    Reconcile {
        /// PRIMARY feed, sorted ascending by key
        #[arg(long)]
        primary: PathBuf,

        /// SECONDARY feed, sorted ascending by key
        #[arg(long)]
        secondary: PathBuf,

        /// Run timestamp: epoch seconds or RFC 3339. Defaults to the PRIMARY
        /// file's modification time.
        #[arg(long)]
        ts: Option<String>,

        #[command(flatten)]
        delivery: DeliveryArgs,
    },

    /// Deliver events from a JSON-lines file written by `reconcile --jsonout`.
    Replay {
        #[arg(long)]
        input: PathBuf,

        #[command(flatten)]
        delivery: DeliveryArgs,
    },

    /// Deliver the CREATE / UPDATE / DELETE events of a unified diff between
    /// two sorted `uid,email` exports.
    ReconcileDiff {
        /// Output of `diff -u old.csv new.csv`
        #[arg(long)]
        input: PathBuf,

        /// Run timestamp: epoch seconds or RFC 3339. Defaults to the diff
        /// file's modification time.
        #[arg(long)]
        ts: Option<String>,

        #[command(flatten)]
        delivery: DeliveryArgs,
    },

    /// Write the mirror without the rows listed in a deleted-keys feed.
    PruneDeleted {
        /// Deleted keys as `uid,email`, sorted ascending by key
        #[arg(long)]
        deleted: PathBuf,

        #[command(flatten)]
        mirror: MirrorArgs,
    },

    /// Write the mirror with emails replaced from an update feed.
    UpdateEmails {
        /// New emails as `uid,email`, sorted ascending by key
        #[arg(long)]
        updates: PathBuf,

        #[command(flatten)]
        mirror: MirrorArgs,
    },

    /// Write a synthetic sorted PRIMARY/SECONDARY pair and print the
    /// expected counts.
    Generate {
        /// Distinct keys to generate
        #[arg(long)]
        count: usize,

        #[arg(long)]
        primary: PathBuf,

        #[arg(long)]
        secondary: PathBuf,

        /// % of keys only in PRIMARY (CREATE)
        #[arg(long, default_value_t = 10)]
        pc: u8,

        /// % of keys in both feeds with different emails (UPDATE)
        #[arg(long, default_value_t = 5)]
        pu: u8,

        /// % of keys only in SECONDARY (DELETE)
        #[arg(long, default_value_t = 10)]
        pd: u8,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> overrides)
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

/// Where events go. Without `--go` or `--jsonout` the run is a dry run
/// against a simulated queue.
#[derive(Args, Clone, Debug, Default)]
pub struct DeliveryArgs {
    /// Layered config paths in merge order
    #[arg(long = "config")]
    pub config_paths: Vec<PathBuf>,

    /// Queue URL (overrides `queue.url`)
    #[arg(long)]
    pub url: Option<String>,

    /// SQS-compatible endpoint that signs requests (overrides `queue.endpoint`)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Deliver to the real queue
    #[arg(long, default_value_t = false, conflicts_with = "jsonout")]
    pub go: bool,

    /// Write events as JSON lines on stdout instead of enqueueing them
    #[arg(long, default_value_t = false)]
    pub jsonout: bool,

    /// Dry-run only: probability that a simulated send fails
    #[arg(long)]
    pub failure_rate: Option<f64>,
}

/// Mirror input and output for the maintenance commands.
#[derive(Args, Clone, Debug)]
pub struct MirrorArgs {
    /// SECONDARY mirror, sorted ascending by key
    #[arg(long)]
    pub mirror: PathBuf,

    /// New mirror file (stdout when omitted)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Count outcomes without writing the new mirror
    #[arg(long, default_value_t = false, conflicts_with = "output")]
    pub dry_run: bool,

    /// Layered config paths in merge order
    #[arg(long = "config")]
    pub config_paths: Vec<PathBuf>,
}

impl MirrorArgs {
    fn for_feed<'a>(&'a self, feed: &'a std::path::Path) -> commands::maintain::MaintainArgs<'a> {
        commands::maintain::MaintainArgs {
            feed,
            mirror: &self.mirror,
            output: self.output.as_deref(),
            dry_run: self.dry_run,
            config_paths: &self.config_paths,
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Best effort: a missing .env.local is normal outside development.
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    let code = match cli.cmd {
        Commands::Reconcile {
            primary,
            secondary,
            ts,
            delivery,
        } => commands::reconcile::run(&primary, &secondary, ts.as_deref(), &delivery).await?,

        Commands::Replay { input, delivery } => commands::replay::run(&input, &delivery).await?,

        Commands::ReconcileDiff {
            input,
            ts,
            delivery,
        } => commands::diff::run(&input, ts.as_deref(), &delivery).await?,

        Commands::PruneDeleted { deleted, mirror } => commands::maintain::run(
            commands::maintain::Maintenance::PruneDeleted,
            &mirror.for_feed(&deleted),
        )?,

        Commands::UpdateEmails { updates, mirror } => commands::maintain::run(
            commands::maintain::Maintenance::UpdateEmails,
            &mirror.for_feed(&updates),
        )?,

        Commands::Generate {
            count,
            primary,
            secondary,
            pc,
            pu,
            pd,
            seed,
        } => {
            commands::generate::run(count, &primary, &secondary, pc, pu, pd, seed)?;
            0
        }

        Commands::ConfigHash { paths } => {
            let loaded = mrc_config::load_layered_yaml(&paths)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
            0
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
