use clap::Parser;

use labelscript::cli::{run, Cli};
use labelscript::logging::{init_logging, LogConfig};

fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::from_cli(cli.verbose, cli.quiet, cli.color.clone());
    if let Err(error) = init_logging(log_config) {
        eprintln!("Failed to initialize logging: {error}");
    }

    std::process::exit(run(cli));
}
