use clap::{CommandFactory, Parser};
use miette::{IntoDiagnostic, Result};

use fastboot_flash::cli::{self, config::Config, Commands};

#[derive(Debug, Parser)]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Flash(args) => cli::flash(args, &config),
        Commands::Inspect(args) => cli::inspect(args),
        Commands::Completions(args) => {
            cli::completions(&args, &mut Cli::command(), env!("CARGO_PKG_NAME")).into_diagnostic()?;
            Ok(())
        }
    }
}
