mod process;
mod pty;

use crate::codec::shell_packet;
use crate::error::{AdbResult, AdbServerError};
use crate::router::{Captures, Router};
use crate::session::Disposition;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Register the six shell-family routes: raw and v2, each interactive and
/// non-interactive, plus `exec:`'s pair (which shares raw's framing but
/// always prefers a PTY in interactive mode, same as `shell:`).
pub fn register(router: &mut Router) {
    router.register("shell:<cmd>", |c: Captures| {
        run_non_interactive(c.get("cmd").cloned(), false)
    });
    router.register("shell:", |_: Captures| run_interactive(None, false));
    router.register("shell,v2:<cmd>", |c: Captures| {
        run_non_interactive(c.get("cmd").cloned(), true)
    });
    router.register("shell,v2:", |_: Captures| run_interactive(None, true));
    router.register("exec:<cmd>", |c: Captures| {
        run_non_interactive(c.get("cmd").cloned(), false)
    });
    router.register("exec:", |_: Captures| run_interactive(None, false));
}

async fn run_non_interactive(cmd: Option<String>, protocol: bool) -> AdbResult<Disposition> {
    let session = crate::router::current_session();
    let mut child = process::spawn_piped_no_stdin(cmd.as_deref())
        .map_err(|e| AdbServerError::Handler(e.to_string()))?;

    session.respond_okay().await?;

    let mut stdout = child.stdout.take().expect("piped stdout");
    let mut stderr = child.stderr.take().expect("piped stderr");

    if protocol {
        let mut out_buf = [0u8; 4096];
        let mut err_buf = [0u8; 4096];
        let mut out_open = true;
        let mut err_open = true;

        while out_open || err_open {
            tokio::select! {
                res = stdout.read(&mut out_buf), if out_open => {
                    match res {
                        Ok(0) | Err(_) => out_open = false,
                        Ok(n) => session.write_raw_framed(shell_packet::STDOUT, &out_buf[..n]).await?,
                    }
                }
                res = stderr.read(&mut err_buf), if err_open => {
                    match res {
                        Ok(0) | Err(_) => err_open = false,
                        Ok(n) => session.write_raw_framed(shell_packet::STDERR, &err_buf[..n]).await?,
                    }
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| AdbServerError::Handler(e.to_string()))?;
        let code = process::exit_code_byte(status);
        session
            .write_raw_framed(shell_packet::EXIT, &[code])
            .await?;
    } else {
        let mut out_buf = [0u8; 4096];
        let mut err_buf = [0u8; 4096];
        let mut out_open = true;
        let mut err_open = true;

        while out_open || err_open {
            tokio::select! {
                res = stdout.read(&mut out_buf), if out_open => {
                    match res {
                        Ok(0) | Err(_) => out_open = false,
                        Ok(n) => session.write_raw(&out_buf[..n]).await?,
                    }
                }
                res = stderr.read(&mut err_buf), if err_open => {
                    match res {
                        Ok(0) | Err(_) => err_open = false,
                        Ok(n) => session.write_raw(&err_buf[..n]).await?,
                    }
                }
            }
        }
        let _ = child.wait().await;
    }

    Ok(Disposition::Close)
}

async fn run_interactive(_cmd: Option<String>, protocol: bool) -> AdbResult<Disposition> {
    let session = crate::router::current_session();
    let mut pty = pty::spawn(None).map_err(|e| AdbServerError::Handler(e.to_string()))?;

    session.respond_okay().await?;
    let (mut reader, mut writer) = session.take_streams().await?;
    let shutdown = session.shutdown_token();

    if protocol {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    pty.terminate().await;
                    break;
                }
                chunk = pty.output_rx.recv() => {
                    match chunk {
                        Some(bytes) => {
                            shell_packet::write_packet(&mut writer, shell_packet::STDOUT, &bytes).await?;
                        }
                        None => {
                            let code = pty.wait().await.unwrap_or(None).unwrap_or(0);
                            shell_packet::write_packet(&mut writer, shell_packet::EXIT, &[code as u8]).await?;
                            break;
                        }
                    }
                }
                packet = shell_packet::read_packet(&mut reader) => {
                    match packet {
                        Ok((shell_packet::STDIN, data)) => {
                            if let Some(tx) = pty.input_tx.as_ref() {
                                let _ = tx.send(data).await;
                            }
                        }
                        Ok((shell_packet::CLOSE_STDIN, _)) => {
                            pty.close_input();
                        }
                        Ok((shell_packet::WINDOW_SIZE_CHANGE, data)) => {
                            if let Some((rows, cols)) = shell_packet::parse_window_size(&data) {
                                pty.resize(rows, cols);
                            }
                        }
                        Ok(_) => {}
                        Err(_) => {
                            pty.terminate().await;
                            break;
                        }
                    }
                }
            }
        }
    } else {
        let mut buf = [0u8; 4096];
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    pty.terminate().await;
                    break;
                }
                chunk = pty.output_rx.recv() => {
                    match chunk {
                        Some(bytes) => writer.write_all(&bytes).await?,
                        None => break,
                    }
                }
                res = reader.read(&mut buf) => {
                    match res {
                        Ok(0) | Err(_) => {
                            // Client half-closed: close the child's stdin so
                            // it can see EOF, then drain remaining output.
                            pty.close_input();
                            drop(reader);
                            while let Some(bytes) = pty.output_rx.recv().await {
                                writer.write_all(&bytes).await?;
                            }
                            break;
                        }
                        Ok(n) => {
                            if let Some(tx) = pty.input_tx.as_ref() {
                                let _ = tx.send(buf[..n].to_vec()).await;
                            }
                        }
                    }
                }
            }
        }
    }

    Ok(Disposition::Bidirectional)
}
