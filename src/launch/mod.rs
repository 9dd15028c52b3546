//! Game launch: command construction per compatibility layer, and execution
//!
//! Building a [`CommandSpec`] never runs the game; [`run_and_capture`] does.

mod proton;
mod wine;

pub use proton::ProtonLauncher;
pub use wine::{wine_base_env, WineLauncher};

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io::Read;
use std::path::Path;
use std::process::{Command, ExitStatus};

use crate::config::{CompatLayer, Game, LaunchConfig};
use crate::error::{LauncherError, Result};
use crate::logging::{log_debug, log_error, log_info};

// ============================================================================
// Environment Map
// ============================================================================

/// Environment for one child process: the inherited environment plus overrides.
///
/// Every command gets its own copy; variables are kept sorted by name.
/// Inherited names and values are kept as raw OS strings; the accessors
/// taking `&str` are for the variables the launcher itself composes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvMap {
    vars: BTreeMap<OsString, OsString>,
}

impl EnvMap {
    /// Snapshot of the current process environment.
    pub fn inherit() -> Self {
        std::env::vars_os().collect()
    }

    /// Value of `key`, if set and valid UTF-8.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_os(key)?.to_str()
    }

    pub fn get_os(&self, key: &str) -> Option<&OsStr> {
        self.vars.get(OsStr::new(key)).map(OsString::as_os_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(OsStr::new(key))
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into().into());
    }

    pub fn set_os(&mut self, key: &str, value: impl Into<OsString>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<OsString> {
        self.vars.remove(OsStr::new(key))
    }

    /// Appends `value` to an existing non-empty variable, joined with `sep`.
    pub fn append(&mut self, key: &str, sep: &str, value: &str) {
        let mut joined = match self.get_os(key) {
            Some(existing) if !existing.is_empty() => {
                let mut joined = existing.to_os_string();
                joined.push(sep);
                joined
            }
            _ => OsString::new(),
        };
        joined.push(value);
        self.vars.insert(key.into(), joined);
    }

    /// Drops every `sep`-separated entry equal to `value`; removes the
    /// variable when nothing is left. Non-UTF-8 values are left alone.
    pub fn remove_entry(&mut self, key: &str, sep: char, value: &str) {
        let Some(existing) = self.get(key) else {
            return;
        };
        let kept: Vec<&str> = existing
            .split(sep)
            .filter(|entry| !entry.is_empty() && *entry != value)
            .collect();
        if kept.is_empty() {
            self.remove(key);
        } else {
            let joined = kept.join(&sep.to_string());
            self.set(key, joined);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.vars.iter().map(|(k, v)| (k.as_os_str(), v.as_os_str()))
    }

    /// Replaces the environment of `cmd` with this map.
    pub fn apply(&self, cmd: &mut Command) {
        cmd.env_clear();
        cmd.envs(&self.vars);
    }
}

impl<K: Into<OsString>, V: Into<OsString>> FromIterator<(K, V)> for EnvMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// `$WINE` if set, else `wine` from `PATH`.
pub fn wine_command(env: &EnvMap) -> OsString {
    env.get_os("WINE").unwrap_or(OsStr::new("wine")).to_os_string()
}

// ============================================================================
// Command Spec
// ============================================================================

/// One process invocation: argument vector plus its complete environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub argv: Vec<OsString>,
    pub env: EnvMap,
}

impl CommandSpec {
    pub fn new(argv: Vec<OsString>, env: EnvMap) -> Self {
        Self { argv, env }
    }

    pub fn program(&self) -> &OsStr {
        self.argv.first().map(OsString::as_os_str).unwrap_or_default()
    }

    pub fn args(&self) -> &[OsString] {
        self.argv.get(1..).unwrap_or_default()
    }

    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(self.program());
        cmd.args(self.args());
        self.env.apply(&mut cmd);
        cmd
    }

    /// Human-readable form: the listed variables (when set), then the argv.
    pub fn render(&self, shown_vars: &[&str]) -> String {
        let mut output = String::from("Startup command:");
        for key in shown_vars {
            if let Some(value) = self.env.get(key) {
                output.push_str(&format!("\n  {}={}", key, value));
            }
        }
        output.push_str("\n  ");
        let argv: Vec<String> = self
            .argv
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        output.push_str(&argv.join(" "));
        output
    }
}

// ============================================================================
// Compatibility Layer Launchers
// ============================================================================

/// Places a native DLL into a prefix before the game starts.
pub trait NativeDllInstaller {
    fn install(&self, wineprefix: &Path, wine: &OsStr, game: Game) -> Result<()>;
}

/// How one compatibility layer starts the game.
pub trait CompatTool {
    fn layer(&self) -> CompatLayer;

    /// Wine binary usable for `wine reg`-style calls inside the prefix.
    fn wine_binary(&self, config: &LaunchConfig) -> OsString;

    /// Leading argv tokens that invoke the layer; the game arguments follow.
    fn launcher_prefix(&self, config: &LaunchConfig) -> Vec<OsString>;

    fn build_environment(&self, config: &LaunchConfig, base: EnvMap) -> EnvMap;

    /// Variables worth showing in the startup command log.
    fn shown_vars(&self) -> &'static [&'static str];

    fn build_argv(&self, config: &LaunchConfig) -> Vec<OsString> {
        let mut argv = self.launcher_prefix(config);
        argv.extend(game_arguments(config));
        argv
    }
}

/// Singleplayer: game exe and startup flags. Multiplayer: injector, game dir, mod dir.
pub fn game_arguments(config: &LaunchConfig) -> Vec<OsString> {
    if config.singleplayer() {
        vec![
            config.game.exe_path(&config.gamedir).into_os_string(),
            OsString::from("-nointro"),
            OsString::from("-64bit"),
        ]
    } else {
        vec![
            config.injector.clone().into_os_string(),
            config.gamedir.clone().into_os_string(),
            config.moddir.clone().into_os_string(),
        ]
    }
}

/// Prepares the prefix and assembles the startup command for `tool`.
pub fn build_launch_command(
    tool: &dyn CompatTool,
    config: &LaunchConfig,
    base_env: EnvMap,
    dll_installer: &dyn NativeDllInstaller,
) -> Result<CommandSpec> {
    if !config.prefixdir.is_dir() {
        log_debug(&format!("Creating directory {}", config.prefixdir.display()));
    }
    fs::create_dir_all(&config.prefixdir).map_err(|e| {
        LauncherError::io(format!("Failed to create {}", config.prefixdir.display()), e)
    })?;

    if config.activate_native_d3dcompiler_47 {
        dll_installer.install(&config.wineprefix(), &tool.wine_binary(config), config.game)?;
    }

    let env = tool.build_environment(config, base_env);
    let argv = tool.build_argv(config);
    let spec = CommandSpec::new(argv, env);

    log_info(&spec.render(tool.shown_vars()));
    Ok(spec)
}

// ============================================================================
// Game Process Launcher
// ============================================================================

#[derive(Debug)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    /// stdout and stderr, interleaved as the child wrote them
    pub output: String,
}

/// Runs `spec` to completion with stderr merged into stdout.
pub fn capture(spec: &CommandSpec) -> Result<CapturedOutput> {
    let (mut reader, writer) =
        std::io::pipe().map_err(|e| LauncherError::io("Failed to create output pipe", e))?;
    let writer_err = writer
        .try_clone()
        .map_err(|e| LauncherError::io("Failed to create output pipe", e))?;

    let mut cmd = spec.to_command();
    cmd.stdout(writer).stderr(writer_err);
    let mut child = cmd
        .spawn()
        .map_err(|e| LauncherError::spawn(spec.program(), e))?;
    // our copies of the write end must be closed to see EOF
    drop(cmd);

    let mut buf = Vec::new();
    let read_result = reader.read_to_end(&mut buf);
    let status = child
        .wait()
        .map_err(|e| LauncherError::io("Failed to wait for child process", e))?;
    read_result.map_err(|e| LauncherError::io("Failed to read child output", e))?;

    Ok(CapturedOutput {
        status,
        output: String::from_utf8_lossy(&buf).into_owned(),
    })
}

/// Runs the game command and logs its output.
///
/// Failures are logged, never returned: starting the game is the last step.
/// Returns whether the command exited successfully.
pub fn run_and_capture(spec: &CommandSpec, label: &str) -> bool {
    match capture(spec) {
        Ok(captured) if captured.status.success() => {
            log_info(&format!("{} output:\n{}", label, captured.output));
            true
        }
        Ok(captured) => {
            log_error(&format!("{} output:\n{}", label, captured.output));
            false
        }
        Err(e) => {
            log_error(&e.to_string());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CompatLayer, Mode};
    use std::cell::RefCell;
    use std::path::PathBuf;

    struct RecordingInstaller {
        calls: RefCell<Vec<(PathBuf, OsString, Game)>>,
    }

    impl RecordingInstaller {
        fn new() -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl NativeDllInstaller for RecordingInstaller {
        fn install(&self, wineprefix: &Path, wine: &OsStr, game: Game) -> Result<()> {
            self.calls
                .borrow_mut()
                .push((wineprefix.to_path_buf(), wine.to_os_string(), game));
            Ok(())
        }
    }

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new(
            vec!["/bin/sh".into(), "-c".into(), script.into()],
            EnvMap::inherit(),
        )
    }

    #[test]
    fn append_joins_existing_values() {
        let mut env = EnvMap::default();
        env.append("LD_PRELOAD", ":", "/a.so");
        assert_eq!(env.get("LD_PRELOAD"), Some("/a.so"));
        env.append("LD_PRELOAD", ":", "/b.so");
        assert_eq!(env.get("LD_PRELOAD"), Some("/a.so:/b.so"));

        env.set("EMPTY", "");
        env.append("EMPTY", ";", "x");
        assert_eq!(env.get("EMPTY"), Some("x"));
    }

    #[test]
    fn remove_entry_keeps_other_entries() {
        let mut env = EnvMap::default();
        env.set("LD_PRELOAD", "/a.so:/overlay.so:/b.so");
        env.remove_entry("LD_PRELOAD", ':', "/overlay.so");
        assert_eq!(env.get("LD_PRELOAD"), Some("/a.so:/b.so"));

        env.set("LD_PRELOAD", "/overlay.so");
        env.remove_entry("LD_PRELOAD", ':', "/overlay.so");
        assert!(!env.contains("LD_PRELOAD"));
    }

    #[test]
    fn non_utf8_values_reach_the_child() {
        use std::os::unix::ffi::OsStrExt;

        let latin1 = OsStr::from_bytes(b"caf\xe9");
        let mut env: EnvMap = [("TRUCK_CITY", latin1)].into_iter().collect();
        env.set("PATH", "/usr/bin:/bin");
        assert!(env.contains("TRUCK_CITY"));
        assert_eq!(env.get("TRUCK_CITY"), None);
        assert_eq!(env.get_os("TRUCK_CITY"), Some(latin1));

        let mut spec = sh("[ \"$TRUCK_CITY\" = \"$(printf 'caf\\351')\" ] && echo same");
        spec.env = env;
        let captured = capture(&spec).unwrap();
        assert_eq!(captured.output.trim(), "same");

        std::env::set_var("TRUCKERSMP_CLI_TEST_CITY", latin1);
        let inherited = EnvMap::inherit();
        std::env::remove_var("TRUCKERSMP_CLI_TEST_CITY");
        assert_eq!(inherited.get_os("TRUCKERSMP_CLI_TEST_CITY"), Some(latin1));
    }

    #[test]
    fn appending_keeps_non_utf8_prefix() {
        use std::os::unix::ffi::OsStrExt;

        let mut env: EnvMap = [("LD_PRELOAD", OsStr::from_bytes(b"/lib\xff.so"))]
            .into_iter()
            .collect();
        env.append("LD_PRELOAD", ":", "/overlay.so");
        assert_eq!(
            env.get_os("LD_PRELOAD").map(OsStr::as_bytes),
            Some(&b"/lib\xff.so:/overlay.so"[..])
        );
        // left untouched rather than rewritten lossily
        env.remove_entry("LD_PRELOAD", ':', "/overlay.so");
        assert!(env.contains("LD_PRELOAD"));
    }

    #[test]
    fn render_lists_shown_vars_and_argv() {
        let mut env = EnvMap::default();
        env.set("WINEPREFIX", "/pfx");
        env.set("HOME", "/home/user");
        let spec = CommandSpec::new(vec!["wine".into(), "game.exe".into()], env);
        let rendered = spec.render(&["WINEPREFIX", "WINEDEBUG"]);
        assert_eq!(rendered, "Startup command:\n  WINEPREFIX=/pfx\n  wine game.exe");
    }

    #[test]
    fn build_creates_prefix_and_installs_dll_only_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = LaunchConfig::new(Game::Ets2, Mode::Singleplayer, CompatLayer::Wine);
        config.prefixdir = dir.path().join("prefix");
        let tool = WineLauncher::new("wine");
        let installer = RecordingInstaller::new();

        build_launch_command(&tool, &config, EnvMap::default(), &installer).unwrap();
        assert!(config.prefixdir.is_dir());
        assert!(installer.calls.borrow().is_empty());

        config.activate_native_d3dcompiler_47 = true;
        build_launch_command(&tool, &config, EnvMap::default(), &installer).unwrap();
        let calls = installer.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, config.prefixdir);
        assert_eq!(calls[0].1, OsString::from("wine"));
        assert_eq!(calls[0].2, Game::Ets2);
    }

    #[test]
    fn singleplayer_exe_follows_prefix_for_both_layers() {
        let steam = tempfile::tempdir().unwrap();
        let tools: Vec<Box<dyn CompatTool>> = vec![
            Box::new(ProtonLauncher::new(steam.path())),
            Box::new(WineLauncher::new("wine")),
        ];
        for game in [Game::Ets2, Game::Ats] {
            for tool in &tools {
                let mut config = LaunchConfig::new(game, Mode::Singleplayer, tool.layer());
                config.gamedir = PathBuf::from("/games/truck");
                let prefix_len = tool.launcher_prefix(&config).len();
                let argv = tool.build_argv(&config);
                assert_eq!(
                    &argv[prefix_len..],
                    &[
                        game.exe_path(Path::new("/games/truck")).into_os_string(),
                        OsString::from("-nointro"),
                        OsString::from("-64bit"),
                    ]
                );
            }
        }
    }

    #[test]
    fn capture_merges_stderr_into_stdout() {
        let captured = capture(&sh("echo out; echo err 1>&2")).unwrap();
        assert!(captured.status.success());
        assert_eq!(captured.output, "out\nerr\n");
    }

    #[test]
    fn capture_uses_only_the_given_environment() {
        let mut env = EnvMap::default();
        env.set("PATH", "/usr/bin:/bin");
        env.set("TRUCK_TEST", "ets2");
        let spec = CommandSpec::new(
            vec!["/bin/sh".into(), "-c".into(), "echo $TRUCK_TEST".into()],
            env,
        );
        assert_eq!(capture(&spec).unwrap().output.trim(), "ets2");
    }

    #[test]
    fn failing_game_does_not_abort() {
        assert!(!run_and_capture(&sh("echo crashed; exit 3"), "Wine"));
        assert!(run_and_capture(&sh("true"), "Wine"));

        let missing = CommandSpec::new(
            vec!["/nonexistent/truckersmp-wine".into()],
            EnvMap::default(),
        );
        assert!(!run_and_capture(&missing, "Wine"));
        assert!(capture(&missing).is_err());
    }
}
