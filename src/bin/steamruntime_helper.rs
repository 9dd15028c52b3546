//! steamruntime-helper - supervisor run inside the Steam Runtime container
//!
//! Starts the game command and any third-party executables, and stops the
//! latter once the game command ends.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser};

use truckersmp_cli::logging::{init_logger, log_info};
use truckersmp_cli::runtime_helper::{self, HelperArgs};

#[derive(Parser, Debug)]
#[command(
    name = "steamruntime-helper",
    about = "Helper for starting the game and third-party programs in the Steam Runtime container"
)]
struct Cli {
    /// Verbose output (once: info, twice or more: debug)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Start the executable FILE through the same launcher as the game (can be repeated)
    #[arg(long = "executable", value_name = "FILE")]
    executables: Vec<PathBuf>,

    /// XDG_RUNTIME_DIR for Discord IPC sockets
    #[arg(long, value_name = "DIR")]
    xdg_runtime_dir: Option<PathBuf>,

    /// Command line of the game
    #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
    game_arguments: Vec<OsString>,
}

fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose, None);

    // the game gets the interrupt too; keep running so its helpers are reaped
    if let Err(e) = ctrlc::set_handler(|| log_info("Interrupted, waiting for the game to exit")) {
        log_info(&format!("Failed to set interrupt handler: {}", e));
    }

    let args = HelperArgs {
        verbose: cli.verbose,
        executables: cli.executables,
        xdg_runtime_dir: cli.xdg_runtime_dir,
        game_arguments: cli.game_arguments,
    };
    process::exit(runtime_helper::run(&args));
}
