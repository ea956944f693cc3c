//! Per-flow configuration.
//!
//! Built programmatically, builder style; each authentication attempt owns
//! its own `FlowConfig` copy along with its descriptors and timers, so
//! concurrent attempts share no mutable state.

use std::time::Duration;
use url::Url;

use crate::transport::TransportStrategy;

/// Configuration for one authentication flow.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Ceiling for the whole data-collection exchange. Exceeding it raises a
    /// data-collection error that the flow swallows.
    pub collection_timeout: Duration,
    /// Grace delay after which collection is assumed delivered even without
    /// an acknowledgement.
    pub collection_grace: Duration,
    /// Per-candidate ceiling for challenge submissions.
    pub submit_timeout: Duration,
    /// How the challenge exchange reaches the ACS.
    pub strategy: TransportStrategy,
    /// Deep-link return URL for the browser-redirect strategy, e.g.
    /// `myapp://threeds/return`.
    pub deep_link_return: Option<Url>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            collection_timeout: Duration::from_secs(10),
            collection_grace: Duration::from_secs(2),
            submit_timeout: Duration::from_secs(30),
            strategy: TransportStrategy::DirectPost,
            deep_link_return: None,
        }
    }
}

impl FlowConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collection_timeout(mut self, timeout: Duration) -> Self {
        self.collection_timeout = timeout;
        self
    }

    pub fn collection_grace(mut self, grace: Duration) -> Self {
        self.collection_grace = grace;
        self
    }

    pub fn submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    pub fn strategy(mut self, strategy: TransportStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Selects the browser-redirect strategy with the given return URL.
    pub fn browser_redirect(mut self, deep_link_return: Url) -> Self {
        self.strategy = TransportStrategy::BrowserRedirect;
        self.deep_link_return = Some(deep_link_return);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_bounds() {
        let config = FlowConfig::default();
        assert_eq!(config.collection_timeout, Duration::from_secs(10));
        assert_eq!(config.strategy, TransportStrategy::DirectPost);
        assert!(config.deep_link_return.is_none());
    }

    #[test]
    fn browser_redirect_sets_strategy_and_return_url() {
        let config = FlowConfig::new()
            .browser_redirect(Url::parse("myapp://threeds/return").unwrap());
        assert_eq!(config.strategy, TransportStrategy::BrowserRedirect);
        assert!(config.deep_link_return.is_some());
    }
}
