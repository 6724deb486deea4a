use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, CommandReport};
use crate::logging;

#[derive(Debug, Parser)]
#[command(
    name = "stitch",
    version,
    about = "Generate one complete artifact from a token-capped model by stitching continuations"
)]
struct Cli {
    /// Print the command report as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a generation session for one prompt.
    Generate(GenerateArgs),
    /// Show the effective configuration.
    Config,
    /// List fenced code blocks in a generated result file.
    Blocks {
        file: PathBuf,
    },
}

#[derive(Debug, Args)]
struct GenerateArgs {
    prompt: Option<String>,
    #[arg(long)]
    prompt_file: Option<PathBuf>,
    #[arg(long)]
    session_id: Option<String>,
    /// Override the output directory (defaults to $STITCH_HOME/output).
    #[arg(long)]
    out: Option<PathBuf>,
    /// Print each chunk to stderr as soon as it is stored.
    #[arg(long)]
    stream: bool,
    /// Abort the session after this many seconds.
    #[arg(long)]
    deadline_secs: Option<u64>,
    #[arg(long)]
    dry_run: bool,
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let report = match cli.command {
        Command::Generate(args) => commands::generate::run(&commands::generate::GenerateOptions {
            prompt: args.prompt,
            prompt_file: args.prompt_file,
            session_id: args.session_id,
            out_dir: args.out,
            stream: args.stream,
            deadline_secs: args.deadline_secs,
            dry_run: args.dry_run,
        })?,
        Command::Config => {
            logging::init(None)?;
            commands::show_config::run()?
        }
        Command::Blocks { file } => {
            logging::init(None)?;
            commands::blocks::run(&commands::blocks::BlocksOptions { file })?
        }
    };

    print_report(&report, cli.json)?;
    if !report.ok {
        bail!("{} reported {} issue(s)", report.command, report.issues.len());
    }
    Ok(())
}
