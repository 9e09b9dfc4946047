mod config;
mod input;
mod output;
mod watch;

use agentlens_core::{SessionView, reconstruct_tree};
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use output::OutputFormat;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "agentlens",
    about = "Replay multi-agent chat event logs into rows, turns and timers"
)]
struct Cli {
    /// Config file (defaults to ~/.config/agentlens/agentlens.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print display rows with nesting
    Rows(ReplayArgs),
    /// Print conversational turns
    Turns(ReplayArgs),
    /// Print delegation groups
    Groups(ReplayArgs),
    /// Print session and per-agent timers
    Timers(ReplayArgs),
    /// Re-render timers on a fixed tick until no timer is running
    Watch {
        /// JSONL event log
        file: PathBuf,
        /// Session to replay (defaults to the root session in the log)
        #[arg(long)]
        session: Option<String>,
        /// Tick interval override in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Show the effective configuration
    Config,
}

#[derive(Args)]
struct ReplayArgs {
    /// JSONL event log
    file: PathBuf,
    /// Session to replay (defaults to the root session in the log)
    #[arg(long)]
    session: Option<String>,
    /// Output format (defaults to `output.format` from config)
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,
    /// Wall-clock time in epoch milliseconds for live timers
    #[arg(long)]
    now: Option<i64>,
    /// Attach forked child sessions to their delegation groups
    #[arg(long)]
    tree: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match config::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.filter)),
        )
        .init();

    let result = run(cli.command, &config).await;

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: &agentlens_runtime_config::AgentlensConfig) -> Result<()> {
    let options = config::reconstruct_options(config);
    match command {
        Commands::Rows(args) => replay(&args, config, &options, output::render_rows),
        Commands::Turns(args) => replay(&args, config, &options, output::render_turns),
        Commands::Groups(args) => replay(&args, config, &options, output::render_groups),
        Commands::Timers(args) => replay(&args, config, &options, output::render_timers),
        Commands::Watch {
            file,
            session,
            interval_ms,
        } => {
            let interval_ms = interval_ms
                .filter(|ms| *ms > 0)
                .unwrap_or(config.timer.tick_interval_ms);
            watch::run_watch(&file, session.as_deref(), &options, interval_ms).await
        }
        Commands::Config => config::show_config(config),
    }
}

type Renderer = fn(&SessionView, OutputFormat, i64, &mut dyn std::io::Write) -> Result<()>;

fn replay(
    args: &ReplayArgs,
    config: &agentlens_runtime_config::AgentlensConfig,
    options: &agentlens_core::ReconstructOptions,
    render: Renderer,
) -> Result<()> {
    let log = input::load_log(&args.file)?;
    let session_id = input::resolve_session(&log, args.session.as_deref(), &args.file)?;
    let events = log.all_events();
    let view = if args.tree {
        reconstruct_tree(&session_id, &events, options)
    } else {
        SessionView::build(&session_id, &events, None, options)
    };

    let format = args
        .format
        .unwrap_or_else(|| OutputFormat::from_config(config.output.format));
    let now = args.now.unwrap_or_else(output::now_ms);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    render(&view, format, now, &mut out)
}
