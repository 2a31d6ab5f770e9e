use crate::router::{Captures, Router};
use crate::session::Disposition;
use crate::session::Session;

/// Server protocol version advertised by `host:version`, matching the
/// example in the end-to-end scenario: `OKAY0004` then `0029` (41).
pub const SERVER_VERSION: u32 = 0x29;

/// Register the built-in `host:*` routes. Called before any device-bound or
/// user routes so that later registrations can still override these by
/// registering a more specific (or identically literal, earlier-losing)
/// pattern — the router's tie-break is "more literal segments, then
/// earliest registration", so anything registered after these with equal
/// specificity loses to them; callers that truly want to override `host:
/// kill` must register it with a strictly more specific pattern.
pub fn register(router: &mut Router) {
    router.register("host:version", |_: Captures| async move {
        let session = crate::router::current_session();
        session
            .respond_okay_with_body(format!("{:04x}", SERVER_VERSION).as_bytes())
            .await?;
        Ok(Disposition::Close)
    });

    router.register("host:kill", |_: Captures| async move {
        let session: std::sync::Arc<Session> = crate::router::current_session();
        session.respond_okay().await?;
        session.request_shutdown();
        Ok(Disposition::Close)
    });
}
