//! truckersmp-cli - TruckersMP launcher for Linux
//!
//! Updates ETS2/ATS and Proton through SteamCMD, keeps the TruckersMP mod
//! files current and starts the game through Proton or Wine.

use std::process;

use truckersmp_cli::cli::{self, Args};
use truckersmp_cli::config::{AppIdTable, CompatLayer, LaunchConfig};
use truckersmp_cli::dlls::D3dCompiler47;
use truckersmp_cli::launch::{
    build_launch_command, run_and_capture, wine_base_env, wine_command, EnvMap, ProtonLauncher,
    WineLauncher,
};
use truckersmp_cli::logging::{init_logger, log_error, log_info};
use truckersmp_cli::steam::{wait_for_steam, SteamClient};
use truckersmp_cli::{paths, steamcmd, truckersmp, updater, utils, LauncherError, Result};

fn main() {
    let table = match AppIdTable::load(&paths::proton_json()) {
        Ok(table) => table,
        Err(e) => fatal(&e),
    };
    let args = cli::parse_args(&table);

    if args.version {
        println!("{}", updater::version_string());
        return;
    }

    init_logger(args.verbose, args.logfile.as_deref());

    if args.self_update {
        if let Err(e) = updater::perform_self_update() {
            fatal(&e);
        }
        return;
    }

    if let Err(e) = run(args, &table) {
        fatal(&e);
    }
}

fn fatal(err: &LauncherError) -> ! {
    log_error(&err.to_string());
    process::exit(1);
}

fn run(args: Args, table: &AppIdTable) -> Result<()> {
    let config = args.into_config(table)?;

    if config.update {
        steamcmd::update_game(&config)?;
    }
    if !config.singleplayer() {
        truckersmp::update_mod(&config.moddir)?;
    }
    if config.start {
        start_game(&config)?;
    }
    Ok(())
}

fn start_game(config: &LaunchConfig) -> Result<()> {
    if !utils::check_libsdl2() {
        return Err(LauncherError::Config(
            "SDL2 was not found on your system.".to_string(),
        ));
    }

    let dlls = D3dCompiler47::new();
    let spec = match config.compat {
        CompatLayer::Proton => {
            let steamdir = wait_for_steam(
                &SteamClient::Native,
                &paths::loginusers_paths(),
                &config.wine_steam_dir,
            )
            .ok_or_else(|| LauncherError::Config("Steam installation not found".to_string()))?;
            log_info(&format!("Steam installation directory: {}", steamdir.display()));
            let launcher = ProtonLauncher::new(steamdir);
            build_launch_command(&launcher, config, EnvMap::inherit(), &dlls)?
        }
        CompatLayer::Wine => {
            let inherited = EnvMap::inherit();
            let wine = wine_command(&inherited);
            let env = wine_base_env(config, inherited.clone());
            let client = SteamClient::Wine {
                wine: wine.as_os_str(),
                env: &env,
            };
            wait_for_steam(
                &client,
                &[config.wine_steam_dir.join(paths::LOGINVDF_INNER)],
                &config.wine_steam_dir,
            );
            let launcher = WineLauncher::new(wine.clone());
            build_launch_command(&launcher, config, inherited, &dlls)?
        }
    };

    // a failed game run is logged, the launcher itself succeeded
    run_and_capture(&spec, config.compat.name());
    Ok(())
}
