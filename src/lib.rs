pub mod codec;
pub mod config;
pub mod device;
pub mod device_routes;
pub mod error;
pub mod fs;
pub mod host_services;
pub mod router;
pub mod session;
pub mod shell;
pub mod sync_service;

pub use config::Config;
pub use device::{DeviceHandle, DeviceManager, SingleDeviceManager};
pub use device_routes::register_device_routes;
pub use error::{AdbResult, AdbServerError};
pub use router::Router;
pub use session::{run_session, Session};

use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Build the router every server binary wires up: host services, the shell
/// family, and the sync service, in that order so later user registrations
/// (none, in this binary) could still override any of them.
pub fn build_router(filesystem: Arc<dyn fs::AbstractFileSystem>) -> Router {
    let mut router = Router::new();
    host_services::register(&mut router);
    shell::register(&mut router);
    sync_service::register(&mut router, filesystem);
    router
}

/// Accept connections on `listener` until `shutdown` is cancelled, spawning
/// one [`run_session`] task per connection.
pub async fn serve(
    listener: TcpListener,
    router: Arc<Router>,
    shutdown: CancellationToken,
    device_manager: Arc<dyn DeviceManager>,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            res = listener.accept() => res,
        };

        let (stream, addr) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                continue;
            }
        };

        tracing::debug!(%addr, "accepted connection");
        tokio::spawn(run_session(
            stream,
            router.clone(),
            shutdown.clone(),
            device_manager.clone(),
        ));
    }
}
