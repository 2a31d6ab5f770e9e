use crate::device::DeviceManager;
use crate::router::{Captures, Router};
use crate::session::Disposition;
use std::sync::Arc;

/// Register the device-scoped `host-serial:<serial>:<sub>` and
/// `host:tport:<serial>` routes. Kept separate from
/// [`crate::host_services::register`] as the small embedder-supplied
/// registration point these routes need: an embedder with its own
/// `DeviceManager` and its own set of `<sub>` commands calls this (or its
/// own equivalent) from `main` rather than having it baked into
/// `build_router`.
///
/// `host-serial:<serial>:transport` is the one `<sub>` this crate answers
/// itself (selecting a device is meaningful even with no further device
/// commands registered); any other `<sub>` resolves the serial and then
/// fails with `unsupported operation`, matching how `host:<unknown>` fails
/// today. `host:tport:<serial>` answers with the resolved handle as its
/// body in lieu of a real binary transport id, since this crate has no
/// transport-id concept of its own.
pub fn register_device_routes(router: &mut Router, device_manager: Arc<dyn DeviceManager>) {
    let transport_mgr = device_manager.clone();
    router.register("host-serial:<serial>:transport", move |c: Captures| {
        let device_manager = transport_mgr.clone();
        async move {
            let session = crate::router::current_session();
            let serial = c.get("serial").expect("router guarantees <serial> capture");
            device_manager.resolve(Some(serial)).await?;
            session.respond_okay().await?;
            Ok(Disposition::Close)
        }
    });

    let fallback_mgr = device_manager.clone();
    router.register("host-serial:<serial>:<sub>", move |c: Captures| {
        let device_manager = fallback_mgr.clone();
        async move {
            let session = crate::router::current_session();
            let serial = c.get("serial").expect("router guarantees <serial> capture");
            device_manager.resolve(Some(serial)).await?;
            session.respond_fail("unsupported operation").await?;
            Ok(Disposition::Close)
        }
    });

    router.register("host:tport:<serial>", move |c: Captures| {
        let device_manager = device_manager.clone();
        async move {
            let session = crate::router::current_session();
            let serial = c.get("serial").expect("router guarantees <serial> capture");
            let handle = device_manager.resolve(Some(serial)).await?;
            session.respond_okay_with_body(handle.as_bytes()).await?;
            Ok(Disposition::Close)
        }
    });
}
