//! Route-to-strategy resolution
//!
//! Maps a request path to the caching strategy that governs it via an
//! ordered prefix table. Resolution is first match wins, so longer or
//! more specific prefixes must be declared before `/`.

use serde::{Deserialize, Serialize};
use tracing::trace;

/// The caching strategy governing a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    /// Serve from cache, fill from network on a miss. Static assets.
    CacheFirst,
    /// Try network, fall back to cache when offline. API calls.
    NetworkFirst,
    /// Serve stale immediately, refresh in the background. Navigations.
    StaleWhileRevalidate,
    /// Always fetch; never touch the cache.
    NetworkOnly,
    /// Only consult the cache; a miss is a hard failure.
    CacheOnly,
}

/// One (path prefix, strategy) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    /// Path prefix this rule matches
    pub prefix: String,
    /// Strategy applied to matching paths
    pub strategy: StrategyKind,
}

impl RouteRule {
    /// Create a rule
    pub fn new(prefix: impl Into<String>, strategy: StrategyKind) -> Self {
        Self {
            prefix: prefix.into(),
            strategy,
        }
    }
}

/// Ordered route table with a default strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
    default: StrategyKind,
}

impl Default for RouteTable {
    /// The stock Deskline route table.
    ///
    /// `/` is declared last so every more specific prefix wins first.
    fn default() -> Self {
        Self {
            rules: vec![
                RouteRule::new("/static/", StrategyKind::CacheFirst),
                RouteRule::new("/assets/", StrategyKind::CacheFirst),
                RouteRule::new("/images/", StrategyKind::CacheFirst),
                RouteRule::new("/api/v1/", StrategyKind::NetworkFirst),
                RouteRule::new("/dashboard", StrategyKind::StaleWhileRevalidate),
                RouteRule::new("/tickets", StrategyKind::StaleWhileRevalidate),
                RouteRule::new("/", StrategyKind::StaleWhileRevalidate),
            ],
            default: StrategyKind::NetworkFirst,
        }
    }
}

impl RouteTable {
    /// Create an empty table with the given default strategy
    pub fn new(default: StrategyKind) -> Self {
        Self {
            rules: Vec::new(),
            default,
        }
    }

    /// Append a rule; rules match in insertion order
    pub fn with_rule(mut self, prefix: impl Into<String>, strategy: StrategyKind) -> Self {
        self.rules.push(RouteRule::new(prefix, strategy));
        self
    }

    /// The configured rules in matching order
    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    /// Resolve a path to its strategy.
    ///
    /// First matching prefix wins; the default applies when nothing
    /// matches. Deterministic, no side effects, O(rules).
    pub fn resolve(&self, path: &str) -> StrategyKind {
        let strategy = self
            .rules
            .iter()
            .find(|rule| path.starts_with(&rule.prefix))
            .map_or(self.default, |rule| rule.strategy);
        trace!("Resolved {path} to {strategy:?}");
        strategy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_resolves_documented_routes() {
        let table = RouteTable::default();
        assert_eq!(table.resolve("/static/js/bundle.js"), StrategyKind::CacheFirst);
        assert_eq!(table.resolve("/assets/logo.svg"), StrategyKind::CacheFirst);
        assert_eq!(table.resolve("/images/avatar.png"), StrategyKind::CacheFirst);
        assert_eq!(table.resolve("/api/v1/tickets/42"), StrategyKind::NetworkFirst);
        assert_eq!(table.resolve("/dashboard"), StrategyKind::StaleWhileRevalidate);
        assert_eq!(table.resolve("/tickets/42"), StrategyKind::StaleWhileRevalidate);
        assert_eq!(table.resolve("/"), StrategyKind::StaleWhileRevalidate);
    }

    #[test]
    fn first_matching_prefix_wins_on_overlap() {
        // /api/v1/ and / both match; /api/v1/ is declared first
        let table = RouteTable::default();
        assert_eq!(table.resolve("/api/v1/kb/articles"), StrategyKind::NetworkFirst);

        let custom = RouteTable::new(StrategyKind::NetworkFirst)
            .with_rule("/", StrategyKind::StaleWhileRevalidate)
            .with_rule("/api/v1/", StrategyKind::NetworkOnly);
        // Declaration order decides, not specificity
        assert_eq!(
            custom.resolve("/api/v1/tickets"),
            StrategyKind::StaleWhileRevalidate
        );
    }

    #[test]
    fn unmatched_paths_use_the_default() {
        let table = RouteTable::new(StrategyKind::NetworkFirst)
            .with_rule("/static/", StrategyKind::CacheFirst);
        assert_eq!(table.resolve("/health"), StrategyKind::NetworkFirst);

        let cache_only = RouteTable::new(StrategyKind::CacheOnly);
        assert_eq!(cache_only.resolve("/anything"), StrategyKind::CacheOnly);
    }
}
