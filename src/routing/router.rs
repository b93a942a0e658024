//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Resolve a request path to a service and the path to forward
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) path prefix scan (acceptable for typical route counts)
//! - Longest prefix wins; explicit `None` rather than a silent default

use crate::config::RouteConfig;
use crate::routing::matcher::PathPrefixMatcher;

#[derive(Debug, Clone)]
struct Route {
    matcher: PathPrefixMatcher,
    service: String,
    strip_prefix: bool,
}

/// Result of a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub service: String,
    /// Path and query to send upstream.
    pub path_and_query: String,
}

#[derive(Debug, Clone, Default)]
pub struct ServiceRouter {
    /// Sorted by descending specificity.
    routes: Vec<Route>,
}

impl ServiceRouter {
    pub fn from_config(configs: &[RouteConfig]) -> Self {
        let mut routes: Vec<Route> = configs
            .iter()
            .map(|c| Route {
                matcher: PathPrefixMatcher::new(c.prefix.as_str()),
                service: c.service.clone(),
                strip_prefix: c.strip_prefix,
            })
            .collect();
        // Stable sort keeps config order among equal prefixes.
        routes.sort_by(|a, b| b.matcher.specificity().cmp(&a.matcher.specificity()));
        Self { routes }
    }

    /// Resolve `path` (with optional `query`) to a route.
    pub fn resolve(&self, path: &str, query: Option<&str>) -> Option<RouteMatch> {
        let route = self.routes.iter().find(|r| r.matcher.matches(path))?;
        let forwarded = if route.strip_prefix {
            route.matcher.strip(path).into_owned()
        } else {
            path.to_string()
        };
        let path_and_query = match query {
            Some(q) if !q.is_empty() => format!("{}?{}", forwarded, q),
            _ => forwarded,
        };
        Some(RouteMatch {
            service: route.service.clone(),
            path_and_query,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;

    fn route(prefix: &str, service: &str, strip_prefix: bool) -> RouteConfig {
        RouteConfig {
            prefix: prefix.into(),
            service: service.into(),
            strip_prefix,
        }
    }

    #[test]
    fn test_default_routes() {
        let router = ServiceRouter::from_config(&GatewayConfig::default_routes());

        let m = router.resolve("/ts/trains", Some("page=2")).unwrap();
        assert_eq!(m.service, "train_booking_service");
        assert_eq!(m.path_and_query, "/trains?page=2");

        let m = router.resolve("/ls/lobbies/abc", None).unwrap();
        assert_eq!(m.service, "lobby_service");
        assert_eq!(m.path_and_query, "/lobbies/abc");

        assert!(router.resolve("/other", None).is_none());
        assert!(router.resolve("/tsx", None).is_none());
    }

    #[test]
    fn test_longest_prefix_wins() {
        let router = ServiceRouter::from_config(&[
            route("/", "fallback", false),
            route("/api", "api", true),
            route("/api/admin", "admin", true),
        ]);

        assert_eq!(router.resolve("/api/admin/users", None).unwrap().service, "admin");
        assert_eq!(router.resolve("/api/users", None).unwrap().service, "api");
        let m = router.resolve("/home", None).unwrap();
        assert_eq!(m.service, "fallback");
        assert_eq!(m.path_and_query, "/home");
    }

    #[test]
    fn test_no_strip() {
        let router = ServiceRouter::from_config(&[route("/trains", "train_booking_service", false)]);
        let m = router.resolve("/trains/4", None).unwrap();
        assert_eq!(m.path_and_query, "/trains/4");
    }
}
