//! Build automation tasks for sodium-xchacha
//!
//! Run with: cargo xtask <command>

use clap::{Parser, Subcommand};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "sodium-xchacha build automation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all tests, once per backend selection
    Test,

    /// Run clippy lints for both backend selections
    Lint,

    /// Check formatting
    Fmt,

    /// Run all CI checks
    Ci,

    /// Generate documentation
    Doc,

    /// Run the criterion benchmarks
    Bench,
}

const TEST_NATIVE: &[&str] = &["test", "--workspace"];
const TEST_WASM: &[&str] = &[
    "test",
    "--workspace",
    "--features",
    "sodium-xchacha/wasm,sodium-integration-tests/wasm",
];
const CLIPPY_NATIVE: &[&str] = &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"];
const CLIPPY_WASM: &[&str] = &[
    "clippy",
    "--workspace",
    "--all-targets",
    "--features",
    "sodium-xchacha/wasm",
    "--",
    "-D",
    "warnings",
];
const FMT_CHECK: &[&str] = &["fmt", "--all", "--check"];

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Test => {
            run_command("cargo", TEST_NATIVE)?;
            run_command("cargo", TEST_WASM)?;
        }
        Commands::Lint => {
            run_command("cargo", CLIPPY_NATIVE)?;
            run_command("cargo", CLIPPY_WASM)?;
        }
        Commands::Fmt => {
            run_command("cargo", FMT_CHECK)?;
        }
        Commands::Ci => {
            println!("Running CI checks...");
            run_command("cargo", FMT_CHECK)?;
            run_command("cargo", CLIPPY_NATIVE)?;
            run_command("cargo", CLIPPY_WASM)?;
            run_command("cargo", TEST_NATIVE)?;
            run_command("cargo", TEST_WASM)?;
            println!("All CI checks passed!");
        }
        Commands::Doc => {
            run_command("cargo", &["doc", "--workspace", "--no-deps", "--open"])?;
        }
        Commands::Bench => {
            run_command("cargo", &["bench", "-p", "sodium-xchacha"])?;
        }
    }

    Ok(())
}

fn run_command(program: &str, args: &[&str]) -> anyhow::Result<()> {
    println!("$ {program} {}", args.join(" "));
    let status = Command::new(program).args(args).status()?;

    if !status.success() {
        anyhow::bail!("{} {:?} failed", program, args);
    }

    Ok(())
}
