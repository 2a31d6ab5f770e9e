use adb_server::{build_router, register_device_routes, serve, Config, SingleDeviceManager};
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::parse();
    let addr = config.socket_addr();

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");

    let shutdown = CancellationToken::new();
    let device_manager = Arc::new(SingleDeviceManager::new(config.serial.clone()));
    let filesystem = Arc::new(adb_server::fs::LocalFileSystem::new());
    let mut router = build_router(filesystem);
    register_device_routes(&mut router, device_manager.clone());
    let router = Arc::new(router);

    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received interrupt, shutting down");
        ctrl_c_shutdown.cancel();
    });

    serve(listener, router, shutdown, device_manager).await;

    Ok(())
}
