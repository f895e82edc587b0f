//! akh-decide CLI: run and check decision-cycle scenarios.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use akh_decide::config::DecideConfig;
use akh_decide::scenario::Scenario;

#[derive(Parser)]
#[command(name = "akh-decide", version, about = "Decision core of a production-rule agent")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario and print its step trace.
    Run {
        /// Scenario TOML file.
        scenario: PathBuf,

        /// Decider config (TOML). Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print the trace as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Build a scenario's goal stack and re-validate every decision in it.
    Check {
        /// Scenario TOML file.
        scenario: PathBuf,

        /// Decider config (TOML).
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Write the default config as TOML.
    Config {
        /// Output file; prints to stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<DecideConfig> {
    match path {
        Some(path) => Ok(DecideConfig::load(path)?),
        None => Ok(DecideConfig::default()),
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
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            scenario,
            config,
            json,
        } => {
            let config = load_config(config.as_ref())?;
            let scenario = Scenario::load(&scenario)?;
            let run = scenario.run(&config)?;

            if json {
                let out = serde_json::to_string_pretty(run.trace()).into_diagnostic()?;
                println!("{out}");
            } else {
                if !scenario.name.is_empty() {
                    println!("Scenario: {}", scenario.name);
                }
                for entry in run.trace() {
                    println!("{}", run.describe(entry));
                }
                let stack = run.decider().stack();
                println!(
                    "Final: depth={} active_level={} firing_type={}",
                    stack.depth(),
                    run.state().active_level(),
                    run.state().firing_type()
                );
            }
        }

        Commands::Check { scenario, config } => {
            let config = load_config(config.as_ref())?;
            let scenario = Scenario::load(&scenario)?;
            let mut run = scenario.build(&config)?;
            let depth = run.decider().stack().depth();

            if run.check_all()? {
                println!("consistent: all {depth} goal(s) hold");
            } else {
                let remaining = run.decider().stack().depth();
                println!(
                    "inconsistent: decision at level {remaining} removed ({} goal(s) dropped)",
                    depth - remaining
                );
                for change in run.decider().working_memory().applied() {
                    println!("  {}", serde_json::to_string(change).into_diagnostic()?);
                }
            }
        }

        Commands::Config { output } => {
            let config = DecideConfig::default();
            match output {
                Some(path) => {
                    config.save(&path)?;
                    println!("Wrote default config to {}", path.display());
                }
                None => print!("{}", config.to_toml()?),
            }
        }
    }

    Ok(())
}
