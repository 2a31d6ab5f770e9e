use crate::codec::sync_frame::{self, SyncId};
use crate::error::{AdbResult, AdbServerError};
use crate::fs::AbstractFileSystem;
use crate::router::Router;
use crate::session::Disposition;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

const MAX_PATH_LEN: usize = 1024;

/// Register the `sync:` route. The engine has already sent `OKAY` by the
/// time this handler runs (it reports `Bidirectional` before writing one
/// itself), so it takes exclusive ownership of the streams and hands them
/// to [`run`].
pub fn register(router: &mut Router, fs: Arc<dyn AbstractFileSystem>) {
    router.register("sync:", move |_| {
        let fs = fs.clone();
        async move {
            let session = crate::router::current_session();
            session.respond_okay().await?;
            let (mut reader, mut writer) = session.take_streams().await?;
            run(&mut reader, &mut writer, fs).await?;
            Ok(Disposition::Bidirectional)
        }
    });
}

/// Drive the binary sync sub-protocol loop over `reader`/`writer` until the
/// client sends `QUIT` or a framing error ends the session. Filesystem
/// errors answer `FAIL` on the current operation and continue the loop;
/// only framing-level errors from [`sync_frame::read_sync_frame`] are
/// fatal.
pub async fn run(
    reader: &mut OwnedReadHalf,
    writer: &mut OwnedWriteHalf,
    fs: Arc<dyn AbstractFileSystem>,
) -> AdbResult<()> {
    loop {
        let (id, _len, payload) = sync_frame::read_sync_frame(reader).await?;

        match id {
            SyncId::List => handle_list(writer, &payload, fs.as_ref()).await?,
            SyncId::Stat => handle_stat(writer, &payload, fs.as_ref()).await?,
            SyncId::Recv => handle_recv(writer, &payload, fs.as_ref()).await?,
            SyncId::Send => handle_send(reader, writer, &payload, fs.as_ref()).await?,
            SyncId::Quit => return Ok(()),
            other => {
                let msg = format!("unknown sync id for request: {other:?}");
                sync_frame::write_sync_frame(writer, SyncId::Fail, msg.as_bytes()).await?;
                return Ok(());
            }
        }
    }
}

fn decode_path(payload: &[u8]) -> AdbResult<String> {
    if payload.len() > MAX_PATH_LEN {
        return Err(AdbServerError::Filesystem("path too long".into()));
    }
    std::str::from_utf8(payload)
        .map(|s| s.to_string())
        .map_err(|_| AdbServerError::Filesystem("path is not valid UTF-8".into()))
}

async fn write_fail(writer: &mut OwnedWriteHalf, message: &str) -> AdbResult<()> {
    sync_frame::write_sync_frame(writer, SyncId::Fail, message.as_bytes()).await
}

async fn handle_list(
    writer: &mut OwnedWriteHalf,
    payload: &[u8],
    fs: &dyn AbstractFileSystem,
) -> AdbResult<()> {
    let path = match decode_path(payload) {
        Ok(p) => p,
        Err(e) => return write_fail(writer, &e.to_string()).await,
    };

    let entries = match fs.iterdir(&path).await {
        Ok(entries) => entries,
        Err(e) => return write_fail(writer, &e.to_string()).await,
    };

    for entry in &entries {
        sync_frame::write_sync_frame(writer, SyncId::Dent, &entry.to_bytes()).await?;
    }
    sync_frame::write_sync_frame(writer, SyncId::Done, &0u32.to_le_bytes()).await
}

async fn handle_stat(
    writer: &mut OwnedWriteHalf,
    payload: &[u8],
    fs: &dyn AbstractFileSystem,
) -> AdbResult<()> {
    let path = match decode_path(payload) {
        Ok(p) => p,
        Err(e) => return write_fail(writer, &e.to_string()).await,
    };

    let stat = match fs.stat(&path).await {
        Ok(stat) => stat.unwrap_or_default(),
        Err(e) => return write_fail(writer, &e.to_string()).await,
    };

    sync_frame::write_sync_frame(writer, SyncId::Stat, &stat.to_bytes()).await
}

async fn handle_recv(
    writer: &mut OwnedWriteHalf,
    payload: &[u8],
    fs: &dyn AbstractFileSystem,
) -> AdbResult<()> {
    let path = match decode_path(payload) {
        Ok(p) => p,
        Err(e) => return write_fail(writer, &e.to_string()).await,
    };

    let mut reader = match fs.open_for_read(&path).await {
        Ok(r) => r,
        Err(e) => return write_fail(writer, &e.to_string()).await,
    };

    let mut buf = vec![0u8; sync_frame::SYNC_DATA_MAX as usize];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => return write_fail(writer, &e.to_string()).await,
        };
        if n == 0 {
            break;
        }
        sync_frame::write_sync_frame(writer, SyncId::Data, &buf[..n]).await?;
    }
    sync_frame::write_sync_frame(writer, SyncId::Done, &0u32.to_le_bytes()).await
}

async fn handle_send(
    reader: &mut OwnedReadHalf,
    writer: &mut OwnedWriteHalf,
    payload: &[u8],
    fs: &dyn AbstractFileSystem,
) -> AdbResult<()> {
    let text = match decode_path(payload) {
        Ok(t) => t,
        Err(e) => return write_fail(writer, &e.to_string()).await,
    };

    let (path, mode) = match text.rsplit_once(',') {
        Some((path, mode_str)) => match mode_str.parse::<u32>() {
            Ok(mode) => (path.to_string(), mode),
            Err(_) => return write_fail(writer, "malformed SEND mode").await,
        },
        None => return write_fail(writer, "malformed SEND request").await,
    };

    let mut file = match fs.open_for_write(&path, mode).await {
        Ok(f) => f,
        Err(e) => return write_fail(writer, &e.to_string()).await,
    };

    loop {
        let (id, length, data) = sync_frame::read_sync_frame(reader).await?;
        match id {
            SyncId::Data => {
                if let Err(e) = file.write_all(&data).await {
                    return write_fail(writer, &e.to_string()).await;
                }
            }
            SyncId::Done => {
                // DONE's length field carries the mtime, not a byte count.
                let mtime = length;
                if let Err(e) = file.flush().await {
                    return write_fail(writer, &e.to_string()).await;
                }
                drop(file);
                if let Err(e) = fs.set_mtime(&path, mtime).await {
                    return write_fail(writer, &e.to_string()).await;
                }
                return sync_frame::write_sync_frame(writer, SyncId::Okay, &[]).await;
            }
            _ => return write_fail(writer, "protocol error").await,
        }
    }
}
