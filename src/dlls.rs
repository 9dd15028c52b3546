//! Native 64-bit d3dcompiler_47 for the game prefix

use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Game;
use crate::downloads::{check_hash, download_files, FileDownload};
use crate::error::{LauncherError, Result};
use crate::launch::{CommandSpec, EnvMap, NativeDllInstaller};
use crate::logging::{log_debug, log_warning};
use crate::paths;

const DLL_NAME: &str = "d3dcompiler_47.dll";

// 64-bit build from ImagingSIMS' repository
const RAW_GITHUB_URL: &str = "https://raw.githubusercontent.com";
const D3DCOMPILER_47_PATH: &str = "/ImagingSIMS/ImagingSIMS/162f87f0fb1bd1b8cd1c4bbb4d3aa09e9b3b1d0c/Redist/x64/d3dcompiler_47.dll";
const D3DCOMPILER_47_MD5: &str = "b2cc65e1930e75f563078c6a20221b37";

/// Downloads (once) and activates the native d3dcompiler_47.
pub struct D3dCompiler47 {
    cache_dir: PathBuf,
    base_url: String,
    md5: String,
}

impl Default for D3dCompiler47 {
    fn default() -> Self {
        Self::with_source(paths::dlls_dir(), RAW_GITHUB_URL, D3DCOMPILER_47_MD5)
    }
}

impl D3dCompiler47 {
    pub fn new() -> Self {
        Self::default()
    }

    /// Custom cache directory, server and expected digest.
    pub fn with_source(cache_dir: impl Into<PathBuf>, base_url: &str, md5: &str) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            base_url: base_url.to_string(),
            md5: md5.to_string(),
        }
    }

    pub fn cached_dll(&self) -> PathBuf {
        self.cache_dir.join(DLL_NAME)
    }

    /// The cached DLL, downloaded when missing or corrupt.
    fn ensure_cached(&self) -> Result<PathBuf> {
        let dll = self.cached_dll();
        if check_hash(&dll, &self.md5).unwrap_or(false) {
            log_debug("d3dcompiler_47.dll is present, MD5 is OK.");
            return Ok(dll);
        }

        log_debug("Downloading d3dcompiler_47.dll");
        let mut files = vec![FileDownload {
            path: D3DCOMPILER_47_PATH.to_string(),
            dest: dll.clone(),
            md5: self.md5.clone(),
        }];
        download_files(&self.base_url, &mut files)
            .map_err(|e| LauncherError::provision("download d3dcompiler_47.dll", e))?;
        Ok(dll)
    }
}

/// `wine reg add` making the DLL `native` for the game executable only.
pub fn dll_override_command(wine: &OsStr, wineprefix: &Path, game: Game) -> CommandSpec {
    let mut env = EnvMap::inherit();
    env.set("WINEDEBUG", "-all");
    env.set("WINEPREFIX", wineprefix.to_string_lossy());

    let key = format!(
        "HKCU\\Software\\Wine\\AppDefaults\\{}\\DllOverrides",
        game.exe_name()
    );
    let mut argv = vec![wine.to_os_string()];
    argv.extend(
        ["reg", "add", key.as_str(), "/v", "d3dcompiler_47", "/t", "REG_SZ", "/d", "native", "/f"]
            .into_iter()
            .map(OsString::from),
    );
    CommandSpec::new(argv, env)
}

impl NativeDllInstaller for D3dCompiler47 {
    fn install(&self, wineprefix: &Path, wine: &OsStr, game: Game) -> Result<()> {
        let dll = self.ensure_cached()?;

        let system32 = wineprefix.join("drive_c/windows/system32");
        log_debug(&format!("Copying d3dcompiler_47.dll into {}", system32.display()));
        fs::create_dir_all(&system32)
            .map_err(|e| LauncherError::io(format!("Failed to create {}", system32.display()), e))?;
        fs::copy(&dll, system32.join(DLL_NAME))
            .map_err(|e| LauncherError::io("Failed to copy d3dcompiler_47.dll", e))?;

        log_debug(&format!("Adding DLL override setting for {}", game.exe_name()));
        let spec = dll_override_command(wine, wineprefix, game);
        match spec.to_command().status() {
            Ok(status) if status.success() => {}
            Ok(status) => log_warning(&format!("wine reg add exited with {}", status)),
            Err(e) => log_warning(&LauncherError::spawn(wine, e).to_string()),
        }
        Ok(())
    }
}
