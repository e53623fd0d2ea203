use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;

/// Build and package mods from source.
///
/// Resolves dependencies between mods, compiles each mod for both backends,
/// verifies the binaries and packages everything into a `.tmod` archive in
/// the mods folder.
///
/// EXAMPLES:
///     modsmith build ~/.modsmith/ModSources/ExampleMod
///     modsmith build ExampleMod --define DEBUG --unsafe
///     modsmith build-all                Build every mod in ModSources
///     modsmith refs                     Refresh the IDE references folder
///
/// ENVIRONMENT VARIABLES:
///     MODSMITH_CONFIG        Global config file
///     MODSMITH_SAVE_DIR      Save directory (mods, sources, references)
///     MODSMITH_HOST_DIR      Host install directory
///     MODSMITH_COMPILER      Compiler program
///     MODSMITH_INSPECTOR     Metadata inspector program
///     MODSMITH_UNSAFE        Allow unsafe code ("true"/"1")
///     MODSMITH_DEFINE        Extra preprocessor symbols
///     MODSMITH_DEBUG_BINARY  Prebuilt binary used instead of compiling
///     MODSMITH_LOG           Log filter (default: info)
#[derive(Parser)]
#[command(name = "modsmith")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Global config file (default: ~/.modsmith/config.toml)
    #[arg(long, global = true, env = "MODSMITH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build one mod from its source folder
    ///
    /// Waits for other command-line builds to finish first. Exits with 0 on
    /// success and 1 on any failure.
    #[command(visible_alias = "b")]
    Build {
        /// Mod source folder
        dir: PathBuf,
        #[command(flatten)]
        launch: LaunchArgs,
    },

    /// Build every mod in the mod sources folder, dependencies first
    BuildAll {
        #[command(flatten)]
        launch: LaunchArgs,
    },

    /// Refresh the shared references folder used by IDE builds
    Refs,
}

/// Compile switches, layered over MODSMITH_* settings
#[derive(clap::Args, Debug, Default)]
pub struct LaunchArgs {
    /// Allow unsafe code in mod sources
    #[arg(long = "unsafe")]
    pub allow_unsafe: bool,
    /// Extra preprocessor symbol (repeatable, or ';'-separated)
    #[arg(long = "define", short = 'd', value_name = "SYMBOL")]
    pub defines: Vec<String>,
    /// Prebuilt binary used instead of compiling for the running backend
    #[arg(long, value_name = "PATH")]
    pub debug_binary: Option<PathBuf>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("MODSMITH_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Build { dir, launch } => commands::build::run(config, &dir, launch),
        Commands::BuildAll { launch } => commands::build_all::run(config, launch),
        Commands::Refs => commands::refs::run(config),
    }
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
