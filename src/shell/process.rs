use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};

/// Build the command line a non-PTY child runs. Unix prefers `/bin/sh -c
/// <cmd>`, or a login shell when `cmd` is empty; other platforms fall back
/// to the platform's default shell.
fn build_command(cmd: Option<&str>) -> Command {
    #[cfg(unix)]
    {
        let mut command = Command::new("/bin/sh");
        match cmd {
            Some(cmd) => {
                command.arg("-c").arg(cmd);
            }
            None => {
                command.arg("-l");
            }
        }
        command
    }
    #[cfg(not(unix))]
    {
        let mut command = Command::new("cmd");
        match cmd {
            Some(cmd) => {
                command.arg("/C").arg(cmd);
            }
            None => {}
        }
        command
    }
}

/// Spawn a child whose stdin is immediately closed — the non-interactive
/// modes never forward client bytes to it.
pub fn spawn_piped_no_stdin(cmd: Option<&str>) -> std::io::Result<Child> {
    build_command(cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
}

/// Map a process exit status to the single byte the shell-v2 EXIT packet
/// carries: the exit code clamped to `[0, 255]`, or `128 + signum` for a
/// signal-terminated child.
pub fn exit_code_byte(status: ExitStatus) -> u8 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return (128u32 + signal as u32).min(255) as u8;
        }
    }
    status.code().unwrap_or(0).clamp(0, 255) as u8
}

/// Terminate a child: SIGTERM, wait up to 2 seconds, then SIGKILL. On
/// non-Unix platforms there is only one kind of kill, so it's sent directly.
pub async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            let pid = nix::unistd::Pid::from_raw(pid as i32);
            let _ = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM);
            if tokio::time::timeout(Duration::from_secs(2), child.wait())
                .await
                .is_ok()
            {
                return;
            }
        }
    }
    let _ = child.kill().await;
    let _ = child.wait().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_byte_normal_exit() {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            let status = ExitStatus::from_raw(42 << 8);
            assert_eq!(exit_code_byte(status), 42);
        }
    }

    #[test]
    fn test_exit_code_byte_signal() {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            // SIGKILL = 9, status encodes signal in low byte.
            let status = ExitStatus::from_raw(9);
            assert_eq!(exit_code_byte(status), 128 + 9);
        }
    }

    #[tokio::test]
    async fn test_spawn_piped_no_stdin_runs_echo() {
        #[cfg(unix)]
        {
            let mut child = spawn_piped_no_stdin(Some("echo hi")).unwrap();
            let status = child.wait().await.unwrap();
            assert!(status.success());
        }
    }
}
