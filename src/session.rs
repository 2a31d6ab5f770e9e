use crate::codec::smart_socket;
use crate::device::{DeviceHandle, DeviceManager};
use crate::error::{AdbResult, AdbServerError};
use crate::router::Router;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// The post-response fate of a connection, declared by the handler that
/// served the current request (not by the route itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Write the response atom (if the handler hasn't already) and close.
    Close,
    /// Write the response atom (if needed) and read another request on the
    /// same connection.
    KeepAlive,
    /// The handler already wrote `OKAY` and took ownership of the raw
    /// stream; the engine must not write anything further.
    Bidirectional,
}

/// Per-connection state: the split TCP halves, a shutdown signal, whether
/// the current request has been answered yet, and a lazily-resolved device
/// handle. Exists for the lifetime of one connection and is handed to
/// handlers via the router's ambient session slot.
pub struct Session {
    reader: Mutex<Option<OwnedReadHalf>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    responded: AtomicBool,
    shutdown: CancellationToken,
    device_manager: Arc<dyn DeviceManager>,
    selected_device: Mutex<Option<DeviceHandle>>,
}

impl Session {
    pub fn new(
        stream: TcpStream,
        shutdown: CancellationToken,
        device_manager: Arc<dyn DeviceManager>,
    ) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
            responded: AtomicBool::new(false),
            shutdown,
            device_manager,
            selected_device: Mutex::new(None),
        }
    }

    /// Read one smart-socket request from the shared reader half.
    pub async fn read_request(&self) -> AdbResult<Vec<u8>> {
        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or(AdbServerError::ConnectionClosed)?;
        smart_socket::read_request(reader).await
    }

    /// Write the bare `OKAY` atom and mark the request answered.
    pub async fn respond_okay(&self) -> AdbResult<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(AdbServerError::ConnectionClosed)?;
        smart_socket::write_okay(writer).await?;
        self.responded.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Write `OKAY` followed by an unframed body (e.g. `host:version`'s
    /// 4-hex-digit version string).
    pub async fn respond_okay_with_body(&self, body: &[u8]) -> AdbResult<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(AdbServerError::ConnectionClosed)?;
        smart_socket::write_okay(writer).await?;
        writer.write_all(body).await?;
        writer.flush().await?;
        self.responded.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Write a `FAIL` atom with the given message and mark the request
    /// answered.
    pub async fn respond_fail(&self, message: &str) -> AdbResult<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(AdbServerError::ConnectionClosed)?;
        smart_socket::write_fail(writer, message).await?;
        self.responded.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Write raw, unframed bytes through the writer half without touching
    /// the `responded` flag's atom semantics — used once a CLOSE-disposition
    /// handler already wrote `OKAY` and is now streaming service-owned
    /// bytes (e.g. non-interactive shell output).
    pub async fn write_raw(&self, bytes: &[u8]) -> AdbResult<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(AdbServerError::ConnectionClosed)?;
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Write one shell-v2 packet (`[id:1][length:4 LE][data]`) through the
    /// shared writer half, for non-interactive v2 shell output.
    pub async fn write_raw_framed(&self, id: u8, payload: &[u8]) -> AdbResult<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(AdbServerError::ConnectionClosed)?;
        crate::codec::shell_packet::write_packet(writer, id, payload).await
    }

    pub fn has_responded(&self) -> bool {
        self.responded.load(Ordering::SeqCst)
    }

    fn reset_responded(&self) {
        self.responded.store(false, Ordering::SeqCst);
    }

    /// Take exclusive ownership of both stream halves for a BIDIRECTIONAL
    /// handler's independent read/write pumps. Only valid once per session.
    pub async fn take_streams(&self) -> AdbResult<(OwnedReadHalf, OwnedWriteHalf)> {
        let reader = self
            .reader
            .lock()
            .await
            .take()
            .ok_or_else(|| AdbServerError::Internal("stream already taken".into()))?;
        let writer = self
            .writer
            .lock()
            .await
            .take()
            .ok_or_else(|| AdbServerError::Internal("stream already taken".into()))?;
        Ok((reader, writer))
    }

    /// Resolve (and cache) "the selected device" for this session.
    pub async fn selected_device(&self, serial: Option<&str>) -> AdbResult<DeviceHandle> {
        let mut guard = self.selected_device.lock().await;
        if let Some(existing) = guard.as_ref() {
            return Ok(existing.clone());
        }
        let handle = self.device_manager.resolve(serial).await?;
        *guard = Some(handle.clone());
        Ok(handle)
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Raise the process-wide shutdown signal. Used by `host:kill` after it
    /// has already written and flushed `OKAY`.
    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn close(&self) {
        let _ = self.reader.lock().await.take();
        let _ = self.writer.lock().await.take();
    }
}

/// Drive one connection's state machine: read a request, dispatch it, honor
/// the handler's disposition, and loop on KEEP-ALIVE.
pub async fn run_session(
    stream: TcpStream,
    router: Arc<Router>,
    shutdown: CancellationToken,
    device_manager: Arc<dyn DeviceManager>,
) {
    let session = Arc::new(Session::new(stream, shutdown.clone(), device_manager));

    loop {
        session.reset_responded();

        let request = tokio::select! {
            _ = shutdown.cancelled() => break,
            res = session.read_request() => res,
        };

        let payload = match request {
            Ok(payload) => payload,
            Err(AdbServerError::ConnectionClosed) => break,
            Err(AdbServerError::Protocol(msg)) => {
                let _ = session.respond_fail(&msg).await;
                break;
            }
            Err(e) => {
                tracing::debug!(error = %e, "session read failed");
                break;
            }
        };

        let request_str = match std::str::from_utf8(&payload) {
            Ok(s) => s,
            Err(_) => {
                let _ = session.respond_fail("malformed request").await;
                break;
            }
        };

        tracing::debug!(request = request_str, "dispatching request");

        match router.dispatch(session.clone(), request_str).await {
            Ok(Disposition::Close) => {
                if !session.has_responded() {
                    let _ = session.respond_okay().await;
                }
                break;
            }
            Ok(Disposition::KeepAlive) => {
                if !session.has_responded() {
                    let _ = session.respond_okay().await;
                }
                continue;
            }
            Ok(Disposition::Bidirectional) => break,
            Err(AdbServerError::NoRoute) => {
                let _ = session.respond_fail("unsupported operation").await;
                break;
            }
            Err(e) => {
                if !session.has_responded() {
                    let _ = session.respond_fail(&e.to_string()).await;
                } else {
                    tracing::warn!(error = %e, "handler failed after responding");
                }
                break;
            }
        }
    }

    session.close().await;
}
