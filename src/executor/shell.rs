//! Platform shell invocation and process-group teardown

use std::path::Path;
use std::process::Stdio;

use tokio::process::{Child, Command};

/// Build a platform shell command for `command_line`
///
/// On unix the shell leads its own process group, so a kill of the group
/// also reaches every process the command line started.
pub(super) fn shell_command(command_line: &str, cwd: Option<&Path>) -> Command {
    #[cfg(unix)]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command_line);
        cmd.process_group(0);
        cmd
    };
    #[cfg(not(unix))]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command_line);
        cmd
    };

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    cmd
}

/// Forcefully kill the shell and everything in its process group
///
/// `leader` is the pid recorded at spawn time; it stays valid as the group
/// id after the shell itself has been reaped.
pub(super) fn kill_tree(leader: Option<u32>, child: &mut Child) {
    #[cfg(unix)]
    if let Some(pgid) = leader.and_then(|pid| i32::try_from(pid).ok()) {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        // A stale group id only yields ESRCH
        if let Err(errno) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            log::debug!("killpg({pgid}): {errno}");
        }
    }
    #[cfg(not(unix))]
    let _ = leader;
    if let Err(e) = child.start_kill() {
        log::debug!("start_kill after group kill: {e}");
    }
}
