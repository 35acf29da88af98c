//! Connector router that selects the `Connector` able to reach a runner's address.
//!
//! The router checks registered connectors in order and delegates session acquisition
//! to the first one that reports `supports(address) == true`.
use std::{fmt, sync::Arc};

use tracing::{debug, instrument, trace};

use crate::{error::CoreError, runner::RunnerConfig, substrate::Attachment, substrate::Connector};

/// Router that selects an appropriate [`Connector`] for a runner configuration.
///
/// Connectors are checked in the order they were registered.
#[derive(Default, Clone)]
pub struct ConnectorRouter {
    connectors: Vec<Arc<dyn Connector>>,
}

impl ConnectorRouter {
    /// Create an empty router.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connector.
    ///
    /// Connectors are queried in registration order; the first one whose `supports(address)` is `true` is used.
    #[inline]
    pub fn register(&mut self, connector: Arc<dyn Connector>) {
        self.connectors.push(connector);
    }

    /// Builder form of [`ConnectorRouter::register`].
    pub fn with(mut self, connector: Arc<dyn Connector>) -> Self {
        self.register(connector);
        self
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    /// Pick the first connector that claims the given address.
    pub fn pick(&self, address: Option<&str>) -> Option<&Arc<dyn Connector>> {
        self.connectors.iter().find(|c| c.supports(address))
    }

    /// Acquire a session for `config` through the selected connector.
    ///
    /// Returns the connector name together with the attachment.
    #[instrument(level = "debug", skip(self, config), fields(address = config.address().unwrap_or("<ephemeral>")))]
    pub async fn connect(&self, config: &RunnerConfig) -> Result<(&'static str, Attachment), CoreError> {
        let address = config.address();
        trace!(connectors = self.connectors.len(), "router received connect request");

        let connector = self
            .pick(address)
            .ok_or_else(|| CoreError::NoConnector(address.unwrap_or("<ephemeral>").to_string()))?;

        let attachment = connector.connect(config).await?;
        debug!(
            connector = connector.name(),
            owned = attachment.owned,
            "connector acquired session"
        );
        Ok((connector.name(), attachment))
    }
}

impl fmt::Debug for ConnectorRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.connectors.iter().map(|c| c.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::substrate::{RemoteCall, RemoteHandle, Session, SubstrateError};
    use async_trait::async_trait;

    struct NullSession;

    #[async_trait]
    impl Session for NullSession {
        fn address(&self) -> &str {
            "null"
        }

        async fn dispatch(&self, _call: RemoteCall) -> Result<RemoteHandle, SubstrateError> {
            Err(SubstrateError::SessionClosed)
        }

        async fn close(&self) {}
    }

    struct PrefixConnector {
        name: &'static str,
        prefix: Option<&'static str>,
    }

    #[async_trait]
    impl Connector for PrefixConnector {
        fn name(&self) -> &'static str {
            self.name
        }

        fn supports(&self, address: Option<&str>) -> bool {
            match (self.prefix, address) {
                (None, None) => true,
                (Some(p), Some(a)) => a.starts_with(p),
                _ => false,
            }
        }

        async fn connect(&self, _config: &RunnerConfig) -> Result<Attachment, SubstrateError> {
            Ok(Attachment {
                session: Arc::new(NullSession),
                owned: self.prefix.is_none(),
            })
        }
    }

    fn router() -> ConnectorRouter {
        ConnectorRouter::new()
            .with(Arc::new(PrefixConnector {
                name: "local",
                prefix: None,
            }))
            .with(Arc::new(PrefixConnector {
                name: "inproc",
                prefix: Some("inproc://"),
            }))
    }

    #[test]
    fn pick_follows_address() {
        let r = router();
        assert_eq!(r.pick(None).map(|c| c.name()), Some("local"));
        assert_eq!(r.pick(Some("inproc://x")).map(|c| c.name()), Some("inproc"));
        assert!(r.pick(Some("tcp://host:1")).is_none());
    }

    #[tokio::test]
    async fn connect_fails_without_connector() {
        let r = router();
        let config = RunnerConfig::default().with_address("tcp://host:1");
        match r.connect(&config).await {
            Err(CoreError::NoConnector(addr)) => assert_eq!(addr, "tcp://host:1"),
            other => panic!("expected NoConnector, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn connect_uses_first_supporting_connector() {
        let r = router();
        let (name, attachment) = r.connect(&RunnerConfig::default()).await.unwrap();
        assert_eq!(name, "local");
        assert!(attachment.owned);
    }
}
