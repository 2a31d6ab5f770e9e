use crate::error::{AdbResult, AdbServerError};
use crate::session::{Disposition, Session};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Placeholder captures from a matched route, keyed by `<name>`.
pub type Captures = HashMap<String, String>;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A registered route handler. Handlers are ambient-session aware: they call
/// [`crate::router::current_session`] rather than receiving the session as
/// an argument, mirroring the task-local session binding described in the
/// design notes.
pub type HandlerFn = Arc<dyn Fn(Captures) -> BoxFuture<AdbResult<Disposition>> + Send + Sync>;

tokio::task_local! {
    static CURRENT_SESSION: Arc<Session>;
}

/// Returns the session that dispatched the handler currently executing.
///
/// Panics if called outside of a handler invocation — there is always
/// exactly one current session while a handler runs.
pub fn current_session() -> Arc<Session> {
    CURRENT_SESSION.with(|s| s.clone())
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Segment {
    Literal,
    Placeholder,
}

struct Route {
    pattern: String,
    segments: Vec<(Segment, String)>,
    handler: HandlerFn,
    order: usize,
}

/// Build-once, read-many pattern table mapping colon-separated request
/// strings to handlers.
///
/// A pattern like `host-serial:<serial>:kill` compiles into three segments;
/// `<name>` segments bind positionally and must capture a non-empty slice of
/// the request. Resolution favors the match with the most literal segments,
/// then earliest registration.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Register a pattern with a handler closure.
    pub fn register<F, Fut>(&mut self, pattern: &str, handler: F)
    where
        F: Fn(Captures) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AdbResult<Disposition>> + Send + 'static,
    {
        let segments = pattern
            .split(':')
            .map(|s| {
                if s.starts_with('<') && s.ends_with('>') && s.len() > 2 {
                    (Segment::Placeholder, s[1..s.len() - 1].to_string())
                } else {
                    (Segment::Literal, s.to_string())
                }
            })
            .collect();
        let order = self.routes.len();
        self.routes.push(Route {
            pattern: pattern.to_string(),
            segments,
            handler: Arc::new(move |c| Box::pin(handler(c))),
            order,
        });
    }

    /// Split `request` into exactly `n` segments, the last one swallowing
    /// any remaining colons. This lets a trailing placeholder like
    /// `shell:<cmd>` capture a command containing `:` while a fixed route
    /// like `host-serial:<serial>:kill` still matches positionally.
    fn split_request(request: &str, n: usize) -> Option<Vec<&str>> {
        if n == 0 {
            return if request.is_empty() { Some(vec![]) } else { None };
        }
        let parts: Vec<&str> = request.splitn(n, ':').collect();
        if parts.len() == n {
            Some(parts)
        } else {
            None
        }
    }

    fn resolve(&self, request: &str) -> Option<(&Route, Captures)> {
        let mut best: Option<(&Route, Captures, usize)> = None;

        for route in &self.routes {
            let Some(parts) = Self::split_request(request, route.segments.len()) else {
                continue;
            };

            let mut captures = Captures::new();
            let mut literal_count = 0;
            let mut matched = true;

            for ((kind, name), part) in route.segments.iter().zip(parts.iter()) {
                match kind {
                    Segment::Literal => {
                        if name != part {
                            matched = false;
                            break;
                        }
                        literal_count += 1;
                    }
                    Segment::Placeholder => {
                        if part.is_empty() {
                            matched = false;
                            break;
                        }
                        captures.insert(name.clone(), part.to_string());
                    }
                }
            }

            if !matched {
                continue;
            }

            let better = match &best {
                None => true,
                Some((best_route, _, best_literals)) => {
                    literal_count > *best_literals
                        || (literal_count == *best_literals && route.order < best_route.order)
                }
            };
            if better {
                best = Some((route, captures, literal_count));
            }
        }

        best.map(|(route, captures, _)| (route, captures))
    }

    /// Resolve `request` to a route and invoke its handler with the current
    /// session bound in the ambient task-local slot.
    pub async fn dispatch(&self, session: Arc<Session>, request: &str) -> AdbResult<Disposition> {
        let Some((route, captures)) = self.resolve(request) else {
            return Err(AdbServerError::NoRoute);
        };
        let handler = route.handler.clone();
        CURRENT_SESSION
            .scope(session, async move { handler(captures).await })
            .await
    }

    #[cfg(test)]
    fn pattern_for(&self, request: &str) -> Option<&str> {
        self.resolve(request).map(|(r, _)| r.pattern.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_router() -> Router {
        let mut router = Router::new();
        router.register("host:version", |_| async { Ok(Disposition::Close) });
        router.register("host:kill", |_| async { Ok(Disposition::Close) });
        router.register("host-serial:<serial>:kill", |_| async {
            Ok(Disposition::Close)
        });
        router.register("shell:<cmd>", |_| async { Ok(Disposition::Close) });
        router.register("shell:", |_| async { Ok(Disposition::Bidirectional) });
        router
    }

    #[test]
    fn test_exact_literal_match() {
        let router = noop_router();
        assert_eq!(router.pattern_for("host:version"), Some("host:version"));
    }

    #[test]
    fn test_placeholder_capture() {
        let router = noop_router();
        let (route, captures) = router.resolve("shell:echo hi").unwrap();
        assert_eq!(route.pattern, "shell:<cmd>");
        assert_eq!(captures.get("cmd"), Some(&"echo hi".to_string()));
    }

    #[test]
    fn test_placeholder_swallows_embedded_colons() {
        let router = noop_router();
        let (_, captures) = router.resolve("shell:echo a:b:c").unwrap();
        assert_eq!(captures.get("cmd"), Some(&"echo a:b:c".to_string()));
    }

    #[test]
    fn test_empty_segment_matches_literal_not_placeholder() {
        let router = noop_router();
        assert_eq!(router.pattern_for("shell:"), Some("shell:"));
    }

    #[test]
    fn test_longest_match_wins_over_generic_route() {
        let router = noop_router();
        // Both `host:kill` and `host-serial:<serial>:kill`-shaped routes
        // exist; a bare `host:kill` should prefer the fully-literal route.
        assert_eq!(router.pattern_for("host:kill"), Some("host:kill"));
    }

    #[test]
    fn test_host_serial_route_matches_distinct_segment_count() {
        let router = noop_router();
        assert_eq!(
            router.pattern_for("host-serial:emulator-5554:kill"),
            Some("host-serial:<serial>:kill")
        );
    }

    #[test]
    fn test_no_match_returns_none() {
        let router = noop_router();
        assert!(router.pattern_for("host:foo").is_none());
    }

    #[test]
    fn test_registration_order_tiebreak() {
        let mut router = Router::new();
        router.register("host:<x>:a", |_| async { Ok(Disposition::Close) });
        router.register("host:<y>:a", |_| async { Ok(Disposition::Close) });
        // Same literal count (1) and same shape; first registered wins.
        let (route, _) = router.resolve("host:foo:a").unwrap();
        assert_eq!(route.pattern, "host:<x>:a");
    }
}
