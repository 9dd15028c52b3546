//! Supervisor run inside the Steam Runtime container
//!
//! Starts the game command (injector or game executable behind the Proton
//! prefix) and, next to it, any number of third-party executables through
//! the same prefix. When the game command ends, every third-party process
//! still alive is killed and reaped.

use std::ffi::OsString;
use std::os::fd::AsFd;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{Child, Stdio};

use crate::error::{LauncherError, Result};
use crate::launch::{capture, CommandSpec, EnvMap};
use crate::logging::{log_debug, log_error, log_info};

/// Number of leading game arguments that invoke the compatibility layer
/// (`python3 <proton> run`).
const LAUNCHER_PREFIX_LEN: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct HelperArgs {
    pub verbose: u8,
    /// Third-party programs started in the container alongside the game
    pub executables: Vec<PathBuf>,
    /// `XDG_RUNTIME_DIR` for Discord IPC sockets
    pub xdg_runtime_dir: Option<PathBuf>,
    /// Full argv of the game command
    pub game_arguments: Vec<OsString>,
}

/// argv of a third-party program: the launcher prefix of the game command, then the program.
pub fn auxiliary_argv(game_arguments: &[OsString], executable: &std::path::Path) -> Vec<OsString> {
    let prefix_len = LAUNCHER_PREFIX_LEN.min(game_arguments.len());
    let mut argv = game_arguments[..prefix_len].to_vec();
    argv.push(executable.as_os_str().to_os_string());
    argv
}

/// Third-party programs must not get the Steam overlay.
pub fn auxiliary_env(env: &EnvMap) -> EnvMap {
    let mut env = env.clone();
    env.remove("LD_PRELOAD");
    env
}

// ============================================================================
// Process Record
// ============================================================================

/// Third-party processes owned by the supervisor.
///
/// Dropping the record kills and reaps whatever is still running, so no
/// auxiliary process outlives the supervisor on any exit path.
#[derive(Default)]
pub struct ProcessRecord {
    children: Vec<(PathBuf, Child)>,
}

impl ProcessRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn pids(&self) -> Vec<u32> {
        self.children.iter().map(|(_, child)| child.id()).collect()
    }

    /// Start `executable` through the game command's launcher prefix.
    /// stdout is shared with the supervisor, stderr is sent to it too.
    pub fn spawn(&mut self, spec: &CommandSpec, executable: PathBuf) -> Result<()> {
        let stderr = std::io::stdout()
            .as_fd()
            .try_clone_to_owned()
            .map(Stdio::from)
            .unwrap_or_else(|_| Stdio::inherit());

        let mut cmd = spec.to_command();
        cmd.stdin(Stdio::null()).stderr(stderr);
        let child = cmd
            .spawn()
            .map_err(|e| LauncherError::spawn(spec.program(), e))?;
        log_debug(&format!(
            "Started {} (pid {})",
            executable.display(),
            child.id()
        ));
        self.children.push((executable, child));
        Ok(())
    }

    /// Kill every process still running, then wait for all of them.
    pub fn drain(&mut self) {
        for (executable, mut child) in self.children.drain(..) {
            match child.try_wait() {
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => {
                    log_debug(&format!("Terminating {}", executable.display()));
                    if let Err(e) = child.kill() {
                        log_error(&format!("Failed to kill {}: {}", executable.display(), e));
                    }
                }
            }
            if let Err(e) = child.wait() {
                log_error(&format!("Failed to wait for {}: {}", executable.display(), e));
            }
        }
    }
}

impl Drop for ProcessRecord {
    fn drop(&mut self) {
        self.drain();
    }
}

// ============================================================================
// Supervisor
// ============================================================================

/// Run the game command with its third-party programs.
///
/// Returns the game command's exit code: 1 when it could not be started,
/// `128 + signal` when it was killed by a signal.
pub fn run(args: &HelperArgs) -> i32 {
    run_with_record(args, &mut ProcessRecord::new())
}

fn run_with_record(args: &HelperArgs, record: &mut ProcessRecord) -> i32 {
    if args.verbose > 1 {
        println!("Executables: {:?}", args.executables);
        println!("XDG Runtime Dir: {:?}", args.xdg_runtime_dir);
        println!("Game Arguments: {:?}", args.game_arguments);
    }

    let mut env = EnvMap::inherit();
    if let Some(dir) = &args.xdg_runtime_dir {
        env.set_os("XDG_RUNTIME_DIR", dir);
    }

    let env_aux = auxiliary_env(&env);
    for executable in &args.executables {
        let spec = CommandSpec::new(
            auxiliary_argv(&args.game_arguments, executable),
            env_aux.clone(),
        );
        if let Err(e) = record.spawn(&spec, executable.clone()) {
            log_error(&e.to_string());
        }
    }

    let primary = CommandSpec::new(args.game_arguments.clone(), env);
    let code = match capture(&primary) {
        Ok(captured) if captured.status.success() => {
            if args.verbose > 0 {
                println!("Proton output:\n{}", captured.output);
            }
            0
        }
        Ok(captured) => {
            eprintln!("Proton output:\n{}", captured.output);
            captured
                .status
                .code()
                .or_else(|| captured.status.signal().map(|sig| 128 + sig))
                .unwrap_or(1)
        }
        Err(e) => {
            eprintln!("{}", e);
            1
        }
    };

    if !record.is_empty() {
        log_info(&format!("Stopping {} third-party program(s)", record.len()));
    }
    record.drain();
    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::{Duration, Instant};

    fn args(game: &[&str], executables: &[&str]) -> HelperArgs {
        HelperArgs {
            verbose: 0,
            executables: executables.iter().map(PathBuf::from).collect(),
            xdg_runtime_dir: None,
            game_arguments: game.iter().map(OsString::from).collect(),
        }
    }

    fn alive(pid: u32) -> bool {
        // reaped processes disappear from /proc
        Path::new(&format!("/proc/{}", pid)).exists()
    }

    #[test]
    fn auxiliary_argv_reuses_launcher_prefix() {
        let game: Vec<OsString> = ["python3", "/proton/proton", "run", "truckersmp-cli.exe", "/g", "/m"]
            .iter()
            .map(OsString::from)
            .collect();
        let argv = auxiliary_argv(&game, Path::new("/opt/discord-ipc.exe"));
        let expected: Vec<OsString> = ["python3", "/proton/proton", "run", "/opt/discord-ipc.exe"]
            .iter()
            .map(OsString::from)
            .collect();
        assert_eq!(argv, expected);

        let short = vec![OsString::from("wine")];
        assert_eq!(
            auxiliary_argv(&short, Path::new("x.exe")),
            vec![OsString::from("wine"), OsString::from("x.exe")]
        );
    }

    #[test]
    fn auxiliary_env_drops_preload_only() {
        let mut env = EnvMap::default();
        env.set("LD_PRELOAD", "/steam/ubuntu12_64/gameoverlayrenderer.so");
        env.set("XDG_RUNTIME_DIR", "/run/user/1000");
        let aux = auxiliary_env(&env);
        assert!(!aux.contains("LD_PRELOAD"));
        assert_eq!(aux.get("XDG_RUNTIME_DIR"), Some("/run/user/1000"));
        assert!(env.contains("LD_PRELOAD"));
    }

    #[test]
    fn auxiliary_is_terminated_before_exit() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("aux.pid");
        // the auxiliary gets "aux" as $0: it records its pid and sleeps;
        // the primary waits for that pid and exits right away
        let script = format!(
            "if [ \"$0\" = aux ]; then echo $$ > '{0}'; exec sleep 30; fi; \
             while [ ! -s '{0}' ]; do sleep 0.1; done",
            pidfile.display()
        );
        let helper = HelperArgs {
            verbose: 0,
            executables: vec![PathBuf::from("aux")],
            xdg_runtime_dir: None,
            game_arguments: vec!["/bin/sh".into(), "-c".into(), script.into()],
        };

        let mut record = ProcessRecord::new();
        let started = Instant::now();
        let code = run_with_record(&helper, &mut record);
        assert_eq!(code, 0);
        assert!(record.is_empty());

        let pid: u32 = std::fs::read_to_string(&pidfile)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert!(!alive(pid));
        assert!(started.elapsed() < Duration::from_secs(20));
    }

    #[test]
    fn record_drains_spawned_children() {
        let prefix: Vec<OsString> = ["/bin/sh", "-c", "exec sleep 30"]
            .iter()
            .map(OsString::from)
            .collect();
        let mut record = ProcessRecord::new();
        let aux = CommandSpec::new(
            auxiliary_argv(&prefix, Path::new("sleeper")),
            EnvMap::inherit(),
        );
        record.spawn(&aux, PathBuf::from("sleeper")).unwrap();
        let pids = record.pids();
        assert!(alive(pids[0]));

        record.drain();
        assert!(record.is_empty());
        assert!(!alive(pids[0]));
    }

    #[test]
    fn executables_are_started_through_the_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("started");
        // game args "/bin/sh -c 'touch $0'": auxiliary argv becomes
        // ["/bin/sh", "-c", "touch \"$0\"", <marker>]
        let helper = HelperArgs {
            verbose: 0,
            executables: vec![marker.clone()],
            xdg_runtime_dir: None,
            game_arguments: ["/bin/sh", "-c", "touch \"$0\"; sleep 1", "/dev/null"]
                .iter()
                .map(OsString::from)
                .collect(),
        };
        // primary touches /dev/null and sleeps, giving the auxiliary time to run
        let code = run(&helper);
        assert_eq!(code, 0);
        assert!(marker.exists());
    }

    #[test]
    fn primary_exit_code_is_propagated() {
        assert_eq!(run(&args(&["/bin/sh", "-c", "echo broken; exit 3"], &[])), 3);
        assert_eq!(run(&args(&["/nonexistent/proton"], &[])), 1);
    }

    #[test]
    fn missing_auxiliary_does_not_stop_the_game() {
        let helper = args(&["/bin/sh", "-c", "exit 0"], &["/nonexistent/tool.exe"]);
        // the auxiliary becomes "/bin/sh -c 'exit 0' /nonexistent/tool.exe"
        assert_eq!(run(&helper), 0);

        let mut record = ProcessRecord::new();
        let bad = CommandSpec::new(vec!["/nonexistent/launcher".into()], EnvMap::inherit());
        assert!(record.spawn(&bad, PathBuf::from("tool")).is_err());
        assert!(record.is_empty());
    }
}
