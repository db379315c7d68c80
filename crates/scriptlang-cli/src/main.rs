mod cli;
mod driver;

use clap::Parser;
use cli::{Cli, Command};

fn main() {
    let cli = Cli::parse();
    install_logging(cli.verbose);

    match cli.command {
        Command::Build { file, out, color } => driver::run_build(file, out, color),
        Command::Check { file, color } => driver::run_check(file, color),
        Command::Disasm { file, natives } => driver::run_disasm(file, natives),
    }
}

/// `-v` sets `debug`, `-vv` sets `trace`; with no flag, `RUST_LOG` decides
/// (falling back to `warn`). The compiler crate never installs a subscriber
/// itself, so this is the only place in the whole workspace that does.
fn install_logging(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose > 0 {
        EnvFilter::new(if verbose >= 2 { "trace" } else { "debug" })
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).without_time().init();
}
