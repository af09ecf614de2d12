//! heka CLI: run the built-in scenarios and inspect configuration.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};

use heka::config::AgentConfig;
use heka::demo::{self, Scenario};

#[derive(Parser)]
#[command(name = "heka", version, about = "Production-rule matcher and decision engine")]
struct Cli {
    /// Agent configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a demonstration scenario and print the resulting working memory.
    Demo {
        scenario: DemoArg,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML.
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum DemoArg {
    /// A rule elaborates `(S1 ^done yes)` and is retracted again.
    Done,
    /// Two operators with a better preference between them.
    Prefer,
    /// Two operators and nothing to tell them apart.
    Tie,
}

impl From<DemoArg> for Scenario {
    fn from(arg: DemoArg) -> Self {
        match arg {
            DemoArg::Done => Scenario::Done,
            DemoArg::Prefer => Scenario::Prefer,
            DemoArg::Tie => Scenario::Tie,
        }
    }
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AgentConfig::load(path)?,
        None => AgentConfig::default(),
    };

    match cli.command {
        Commands::Demo { scenario, json } => {
            let report = demo::run(scenario.into(), config)?;
            if json {
                let json = serde_json::to_string_pretty(&report).into_diagnostic()?;
                println!("{json}");
            } else {
                print!("{report}");
            }
        }

        Commands::Config => {
            config.validate()?;
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}
