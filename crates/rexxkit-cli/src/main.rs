//! Rexxkit CLI - Parse Rexx-dialect scripts to a JSON command tree
//!
//! Usage:
//!   rexxkit -c 'SAY "hello"'       # Parse a command string
//!   rexxkit script.rexx            # Parse a script file
//!   rexxkit --pretty script.rexx   # Pretty-print the JSON output

use anyhow::{Context, Result};
use clap::Parser;
use rexxkit::ParserConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Rexxkit - Rexx-dialect script parser
#[derive(Parser, Debug)]
#[command(name = "rexxkit")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Parse the given script string
    #[arg(short = 'c')]
    command: Option<String>,

    /// Script file to parse
    #[arg()]
    script: Option<PathBuf>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,

    /// Fail on unrecognized statement lines instead of dropping them
    #[arg(long)]
    strict: bool,

    /// Maximum block and expression nesting depth
    #[arg(long, default_value_t = 100)]
    max_depth: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let source = if let Some(cmd) = args.command {
        cmd
    } else if let Some(script_path) = args.script {
        std::fs::read_to_string(&script_path)
            .with_context(|| format!("Failed to read script: {}", script_path.display()))?
    } else {
        eprintln!("rexxkit: no input given");
        eprintln!("Usage: rexxkit -c 'statements' or rexxkit script.rexx");
        std::process::exit(2);
    };

    let config = ParserConfig::new()
        .strict(args.strict)
        .max_depth(args.max_depth);
    let program = rexxkit::Parser::with_config(config)
        .parse(&source)
        .context("Failed to parse script")?;

    let json = if args.pretty {
        serde_json::to_string_pretty(&program)?
    } else {
        serde_json::to_string(&program)?
    };
    println!("{json}");
    Ok(())
}
