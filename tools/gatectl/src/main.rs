//! Gatectl - Ruleset Management Tool for DBGate
//!
//! Operator tooling for admission-control ruleset files: validate them
//! before rollout, dump them for inspection, rewrite them in canonical
//! form, and test-evaluate a synthetic request against them.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use dbgate_ruleset::{
    decode_fingerprint_hex, dump_ruleset, evaluate_ruleset, load_ruleset, save_ruleset,
    serialize_ruleset, MatchOverrides, RequestSnapshot, RuleSet, RuleSetResult,
};

#[derive(Parser)]
#[command(name = "gatectl")]
#[command(about = "Gatectl - DBGate Ruleset Management Tool")]
#[command(long_about = "Gatectl - DBGate Ruleset Management Tool

Commands:
  check       Validate a ruleset file without installing it
  dump        Render a human-readable (or JSON) dump of a ruleset file
  fmt         Rewrite a ruleset file in canonical form
  eval        Evaluate a synthetic request against a ruleset file

Examples:
  gatectl check rules.conf
  gatectl dump rules.conf --json
  gatectl fmt rules.conf -o rules.canonical.conf
  gatectl eval rules.conf --origin-task billing --user alice --sql 'select 1'

Use 'gatectl <command> --help' for more information on a specific command.")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a ruleset file without installing it
    Check {
        /// Ruleset file to validate
        file: PathBuf,
    },

    /// Render a dump of a ruleset file
    Dump {
        /// Ruleset file to dump
        file: PathBuf,

        /// Emit the ruleset as JSON instead of the diagnostic text form
        #[arg(long)]
        json: bool,
    },

    /// Rewrite a ruleset file in canonical form
    Fmt {
        /// Ruleset file to canonicalize
        file: PathBuf,

        /// Write to this path instead of rewriting in place
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Evaluate a synthetic request against a ruleset file
    Eval {
        /// Ruleset file to evaluate against
        file: PathBuf,

        /// Origin host of the synthetic request
        #[arg(long, default_value = "")]
        origin_host: String,

        /// Origin task/program name of the synthetic request
        #[arg(long, default_value = "")]
        origin_task: String,

        /// Authenticated username; omit for an unauthenticated session
        #[arg(long)]
        user: Option<String>,

        /// SQL text of the synthetic request
        #[arg(long, default_value = "")]
        sql: String,

        /// SQL fingerprint as 32 hex digits
        #[arg(long)]
        fingerprint: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(false)
        .init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {:#}", "error:".bright_red(), err);
            ExitCode::FAILURE
        },
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Check { file } => {
            let rules = load(&file)?;
            println!(
                "{} {} ({} rules, {} with fingerprints)",
                "OK".bright_green(),
                file.display(),
                rules.rule_count(),
                rules.fingerprint_count()
            );
            Ok(())
        },
        Commands::Dump { file, json } => {
            let rules = load(&file)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rules)?);
            } else {
                print!("{}", dump_ruleset(&rules));
            }
            Ok(())
        },
        Commands::Fmt { file, output } => {
            let rules = load(&file)?;
            let target = output.as_deref().unwrap_or(file.as_path());
            save_ruleset(target, &rules)
                .with_context(|| format!("failed to write {}", target.display()))?;
            tracing::debug!("canonical form:\n{}", serialize_ruleset(&rules));
            println!("{} wrote {}", "OK".bright_green(), target.display());
            Ok(())
        },
        Commands::Eval {
            file,
            origin_host,
            origin_task,
            user,
            sql,
            fingerprint,
        } => {
            let rules = load(&file)?;
            let snapshot = RequestSnapshot {
                origin_host,
                origin_task,
                user,
                sql,
                fingerprint: match fingerprint {
                    Some(hex) => decode_fingerprint_hex(&hex).with_context(|| {
                        format!("invalid fingerprint '{}' (expected 32 hex digits)", hex)
                    })?,
                    None => [0u8; 16],
                },
            };

            let mut result = RuleSetResult::default();
            let count =
                evaluate_ruleset(&rules, &snapshot, MatchOverrides::default(), &mut result);
            print_decision(count, &result);
            Ok(())
        },
    }
}

fn load(file: &Path) -> Result<RuleSet> {
    load_ruleset(file, 1).with_context(|| format!("failed to load {}", file.display()))
}

fn print_decision(count: usize, result: &RuleSetResult) {
    let verdict = if result.is_rejected() {
        if result.is_retryable() {
            "REJECTED (retryable)".bright_red()
        } else {
            "REJECTED (no retry)".bright_red()
        }
    } else {
        "ACCEPTED".bright_green()
    };
    println!("{} after {} matching rule(s)", verdict, count);
    println!("  {}", result);
    if let Some(rule_no) = result.rule_no {
        println!("  decided by rule #{}", rule_no);
    }
}
