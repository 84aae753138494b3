use std::collections::HashMap;
use std::sync::Arc;

use ingestlake_common::{IngestError, Result};

use crate::capabilities::Connector;

/// Builds a connector instance from a config map. One factory per
/// `templateId` (spec §4.1 "Registry contract" — factories accept a
/// config map and return an opaque endpoint).
pub type ConnectorFactory = Box<dyn Fn(&serde_json::Value) -> Result<Arc<dyn Connector>> + Send + Sync>;

/// Process-wide connector registry, keyed by `templateId` (e.g.
/// `http.jira`, `jdbc.postgres`).
#[derive(Default)]
pub struct ConnectorRegistry {
    factories: HashMap<String, ConnectorFactory>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, template_id: impl Into<String>, factory: ConnectorFactory) {
        self.factories.insert(template_id.into(), factory);
    }

    pub fn build(&self, template_id: &str, config: &serde_json::Value) -> Result<Arc<dyn Connector>> {
        let factory = self
            .factories
            .get(template_id)
            .ok_or_else(|| IngestError::CapabilityMissing(format!("no connector registered for '{template_id}'")))?;
        factory(config)
    }

    pub fn is_registered(&self, template_id: &str) -> bool {
        self.factories.contains_key(template_id)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::types::ValidateConfigResult;

    struct StubConnector;

    #[async_trait]
    impl Connector for StubConnector {
        fn template_id(&self) -> &str {
            "test.stub"
        }

        async fn validate_config(&self, _config: &serde_json::Value) -> ValidateConfigResult {
            ValidateConfigResult::ok()
        }
    }

    #[test]
    fn build_unknown_template_returns_capability_missing() {
        let registry = ConnectorRegistry::new();
        let result = registry.build("nope", &serde_json::json!({}));
        assert!(matches!(result, Err(IngestError::CapabilityMissing(_))));
    }

    #[test]
    fn build_registered_template_succeeds() {
        let mut registry = ConnectorRegistry::new();
        registry.register("test.stub", Box::new(|_cfg| Ok(Arc::new(StubConnector) as Arc<dyn Connector>)));
        let connector = registry.build("test.stub", &serde_json::json!({})).unwrap();
        assert_eq!(connector.template_id(), "test.stub");
    }

    #[test]
    fn capability_negotiation_returns_none_for_unadvertised_capability() {
        let connector: Arc<dyn Connector> = Arc::new(StubConnector);
        assert!(connector.as_source().is_none());
        assert!(connector.as_sink().is_none());
        assert!(connector.as_slice_capable().is_none());
    }
}
