use std::{path::PathBuf, sync::LazyLock};

/// `$XDG_DATA_HOME` (`~/.local/share` when unset)
pub static XDG_DATA_HOME: LazyLock<PathBuf> = LazyLock::new(|| {
    dirs::data_dir().unwrap_or_else(|| {
        let mut path = std::env::home_dir().unwrap_or_default();
        path.push(".local/share");
        path
    })
});

pub static DEFAULT_DATA_PATH: LazyLock<PathBuf> =
    LazyLock::new(|| XDG_DATA_HOME.join("truckersmp-cli"));

/// Directory holding the running executable and its bundled files
/// (`proton.json`, `truckersmp-cli.exe`, `RELEASE`).
pub static SCRIPT_DIR: LazyLock<PathBuf> = LazyLock::new(|| {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
});

/// Computes the path from the truckersmp-cli data directory based on the arguments.
///
/// Returns a `&Path` referencing the data directory itself if no arguments are passed in, or a
/// `PathBuf` created by joining all of the arguments to the data directory if at least
/// one argument is passed in.
///
/// # Examples
///
/// ```
/// use truckersmp_cli::data_path;
///
/// let steamcmd = data_path!("steamcmd", "steamcmd.sh");
/// assert!(steamcmd.ends_with("truckersmp-cli/steamcmd/steamcmd.sh"));
/// ```
#[macro_export]
macro_rules! data_path {
    () => {
        $crate::paths::DEFAULT_DATA_PATH.as_path()
    };

    ( $( $path:expr ),+ $(,)? ) => {
        [
            $crate::paths::DEFAULT_DATA_PATH.as_path(),
            $( std::path::Path::new(&$path) ),+
        ].into_iter().collect::<std::path::PathBuf>()
    };
}

/// Where SteamCMD and its private Wine prefix live.
pub fn steamcmd_dir() -> PathBuf {
    data_path!("steamcmd")
}

pub fn default_protondir() -> PathBuf {
    data_path!("Proton")
}

pub fn default_moddir() -> PathBuf {
    data_path!("TruckersMP")
}

/// Cache for downloaded DLLs.
pub fn dlls_dir() -> PathBuf {
    data_path!("dlls")
}

pub fn proton_json() -> PathBuf {
    SCRIPT_DIR.join("proton.json")
}

/// The multiplayer injector shipped next to the executable.
pub fn inject_exe() -> PathBuf {
    SCRIPT_DIR.join("truckersmp-cli.exe")
}

/// `loginusers.vdf` of the native Steam client, in lookup order.
pub fn loginusers_paths() -> Vec<PathBuf> {
    let home = std::env::home_dir().unwrap_or_default();
    vec![
        home.join(".steam/root").join(LOGINVDF_INNER),
        XDG_DATA_HOME.join("Steam").join(LOGINVDF_INNER),
    ]
}

pub const LOGINVDF_INNER: &str = "config/loginusers.vdf";

/// Steam overlay library, relative to the Steam installation directory.
pub const OVERLAYRENDERER_INNER: &str = "ubuntu12_64/gameoverlayrenderer.so";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_path_joins_components() {
        assert_eq!(data_path!(), DEFAULT_DATA_PATH.as_path());
        assert_eq!(
            data_path!("Euro Truck Simulator 2", "prefix"),
            DEFAULT_DATA_PATH.join("Euro Truck Simulator 2").join("prefix")
        );
        assert!(steamcmd_dir().ends_with("truckersmp-cli/steamcmd"));
    }

    #[test]
    fn loginusers_paths_end_with_vdf() {
        for path in loginusers_paths() {
            assert!(path.ends_with("config/loginusers.vdf"));
        }
    }
}
