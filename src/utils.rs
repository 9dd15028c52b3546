//! Shared utility functions used across the application

use std::path::Path;
use std::process::{Command, Stdio};

pub const SDL2_SONAME: &str = "libSDL2-2.0.so.0";

/// Directories searched when `ldconfig` is unavailable.
const LIBRARY_DIRS: &[&str] = &[
    "/usr/lib/x86_64-linux-gnu",
    "/usr/lib64",
    "/usr/lib",
    "/lib/x86_64-linux-gnu",
    "/lib64",
    "/lib",
    "/usr/local/lib",
];

/// Login name of the user running us.
pub fn current_user() -> String {
    for var in ["USER", "LOGNAME"] {
        if let Ok(name) = std::env::var(var) {
            if !name.is_empty() {
                return name;
            }
        }
    }
    Command::new("id")
        .arg("-un")
        .stderr(Stdio::null())
        .output()
        .ok()
        .filter(|out| out.status.success())
        .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_string())
        .unwrap_or_default()
}

/// Whether the SDL2 shared library can be found. Always true off Linux.
pub fn check_libsdl2() -> bool {
    if std::env::consts::OS != "linux" {
        return true;
    }

    if let Ok(output) = Command::new("ldconfig").arg("-p").stderr(Stdio::null()).output() {
        if output.status.success()
            && ldconfig_lists(&String::from_utf8_lossy(&output.stdout), SDL2_SONAME)
        {
            return true;
        }
    }

    let extra = std::env::var("LD_LIBRARY_PATH").unwrap_or_default();
    extra
        .split(':')
        .filter(|dir| !dir.is_empty())
        .chain(LIBRARY_DIRS.iter().copied())
        .any(|dir| Path::new(dir).join(SDL2_SONAME).exists())
}

/// Scans `ldconfig -p` output (`\tlibfoo.so.1 (libc6,x86-64) => /usr/lib/libfoo.so.1`).
fn ldconfig_lists(output: &str, soname: &str) -> bool {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .any(|name| name == soname)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ldconfig_parsing() {
        let output = "\
1234 libs found in cache `/etc/ld.so.cache'
\tlibSDL2-2.0.so.0 (libc6,x86-64) => /usr/lib/libSDL2-2.0.so.0
\tlibSDL2.so (libc6,x86-64) => /usr/lib/libSDL2.so
";
        assert!(ldconfig_lists(output, SDL2_SONAME));
        assert!(!ldconfig_lists("\tlibSDL2.so (libc6,x86-64) => /usr/lib/libSDL2.so", SDL2_SONAME));
    }

    #[test]
    fn test_current_user_is_known() {
        assert!(!current_user().is_empty());
    }
}
