mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;
use std::process::ExitCode;
use strata_core::{BuildOptions, LoadRestrictor, ReorderMode};

#[derive(Debug, Parser)]
#[command(
    name = "strata",
    version,
    about = "Deterministic renderer for layered Kubernetes resource customizations"
)]
struct Cli {
    /// Output a structured JSON summary instead of plain text.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Render a descriptor directory into a single YAML stream.
    Build {
        /// Directory holding the kustomization file.
        #[arg(default_value = ".")]
        dir: PathBuf,
        /// Write the stream to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Which files a descriptor may read.
        #[arg(long, value_enum, default_value_t = Restrictor::RootOnly)]
        load_restrictor: Restrictor,
        /// Document order of the emitted stream.
        #[arg(long, value_enum, default_value_t = Reorder::Legacy)]
        reorder: Reorder,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Restrictor {
    /// Plain files must live under the descriptor's directory.
    RootOnly,
    /// Any readable file.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Reorder {
    /// Namespaces and other prerequisites first, webhooks last.
    Legacy,
    /// Keep the order documents were loaded in.
    None,
}

impl From<Restrictor> for LoadRestrictor {
    fn from(value: Restrictor) -> Self {
        match value {
            Restrictor::RootOnly => Self::RootOnly,
            Restrictor::None => Self::None,
        }
    }
}

impl From<Reorder> for ReorderMode {
    fn from(value: Reorder) -> Self {
        match value {
            Reorder::Legacy => Self::Legacy,
            Reorder::None => Self::None,
        }
    }
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("STRATA_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let result = match cli.command {
        Commands::Build {
            dir,
            output,
            load_restrictor,
            reorder,
        } => commands::build::run(
            &dir,
            output.as_deref(),
            BuildOptions {
                load_restrictor: load_restrictor.into(),
                reorder: reorder.into(),
            },
            cli.json,
        ),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(failure) => {
            eprintln!("error: {}", failure.message);
            ExitCode::from(failure.code)
        }
    }
}
