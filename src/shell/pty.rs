use portable_pty::{native_pty_system, Child as PtyChild, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use tokio::sync::mpsc;

const READ_CHUNK: usize = 4096;

/// An interactive child running under a PTY, bridged onto async channels.
///
/// `portable-pty`'s reader/writer are blocking `std::io` objects, so each
/// direction gets its own `spawn_blocking` pump feeding (or draining) an
/// mpsc channel — the same shape as the piped non-PTY pumps, just with a
/// blocking thread standing in for the async read/write call.
pub struct PtySession {
    pub output_rx: mpsc::Receiver<Vec<u8>>,
    pub input_tx: Option<mpsc::Sender<Vec<u8>>>,
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn PtyChild + Send>,
}

fn build_command(cmd: Option<&str>) -> CommandBuilder {
    #[cfg(unix)]
    {
        let mut builder = CommandBuilder::new("/bin/sh");
        match cmd {
            Some(cmd) => {
                builder.arg("-c");
                builder.arg(cmd);
            }
            None => {
                builder.arg("-l");
            }
        }
        builder
    }
    #[cfg(not(unix))]
    {
        let mut builder = CommandBuilder::new("cmd");
        if let Some(cmd) = cmd {
            builder.arg("/C");
            builder.arg(cmd);
        }
        builder
    }
}

/// Open a PTY and spawn `cmd` (or a login shell) attached to its slave.
pub fn spawn(cmd: Option<&str>) -> std::io::Result<PtySession> {
    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(PtySize {
            rows: 24,
            cols: 80,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    let child = pair
        .slave
        .spawn_command(build_command(cmd))
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    drop(pair.slave);

    let mut blocking_reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    let mut blocking_writer = pair
        .master
        .take_writer()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    let (output_tx, output_rx) = mpsc::channel::<Vec<u8>>(32);
    tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match blocking_reader.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if output_tx.blocking_send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });

    let (input_tx, mut input_rx) = mpsc::channel::<Vec<u8>>(32);
    tokio::task::spawn_blocking(move || {
        while let Some(chunk) = input_rx.blocking_recv() {
            if blocking_writer.write_all(&chunk).is_err() {
                break;
            }
            let _ = blocking_writer.flush();
        }
    });

    Ok(PtySession {
        output_rx,
        input_tx: Some(input_tx),
        master: pair.master,
        child,
    })
}

impl PtySession {
    pub fn resize(&self, rows: u16, cols: u16) {
        let _ = self.master.resize(PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        });
    }

    /// Drop the input side, ending the writer thread and signaling EOF on
    /// the child's stdin — the PTY-mode equivalent of `CLOSE_STDIN`.
    pub fn close_input(&mut self) {
        self.input_tx = None;
    }

    /// Block the calling blocking-pool thread until the child exits,
    /// returning its exit code if the platform reports one.
    pub async fn wait(&mut self) -> std::io::Result<Option<u32>> {
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Ok(Some(status.exit_code()));
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    }

    pub async fn terminate(&mut self) {
        #[cfg(unix)]
        {
            if let Some(pid) = self.child.process_id() {
                let pid = nix::unistd::Pid::from_raw(pid as i32);
                let _ = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM);
                let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
                while tokio::time::Instant::now() < deadline {
                    if matches!(self.child.try_wait(), Ok(Some(_))) {
                        return;
                    }
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                }
            }
        }
        let _ = self.child.kill();
    }
}

/// Last-resort cleanup for any exit path that doesn't go through
/// [`PtySession::terminate`] (e.g. a `?`-propagated I/O error on a reset
/// client connection) — force-kill the child rather than leak it.
impl Drop for PtySession {
    fn drop(&mut self) {
        if matches!(self.child.try_wait(), Ok(None)) {
            let _ = self.child.kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[cfg(unix)]
    async fn test_pty_echo_round_trip() {
        let mut session = spawn(Some("cat")).unwrap();
        session
            .input_tx
            .as_ref()
            .unwrap()
            .send(b"hello\n".to_vec())
            .await
            .unwrap();

        let mut collected = Vec::new();
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
        while tokio::time::Instant::now() < deadline && !collected.ends_with(b"hello\r\n") {
            if let Some(chunk) = session.output_rx.recv().await {
                collected.extend_from_slice(&chunk);
            } else {
                break;
            }
        }
        assert!(String::from_utf8_lossy(&collected).contains("hello"));

        session.terminate().await;
    }
}
