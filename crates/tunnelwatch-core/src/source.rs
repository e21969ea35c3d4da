//! The capability the engine polls.
//!
//! Every telemetry backend implements [`MetricSource`]. The engine never sees
//! protocol text: a source hands back an already-typed [`MetricValue`] or a
//! [`SourceError`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SourceError;
use crate::metric::{EndpointId, MetricId, MetricValue};

/// Trait that every telemetry backend must implement.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Short backend name for logs (e.g. `"snmp"`).
    fn name(&self) -> &str;

    /// Fetch one metric from one endpoint.
    ///
    /// Implementations need not enforce a deadline; the collector wraps every
    /// call in its own timeout.
    async fn sample(&self, endpoint: &EndpointId, metric: MetricId)
    -> Result<MetricValue, SourceError>;
}

#[async_trait]
impl<S: MetricSource + ?Sized> MetricSource for Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn sample(
        &self,
        endpoint: &EndpointId,
        metric: MetricId,
    ) -> Result<MetricValue, SourceError> {
        (**self).sample(endpoint, metric).await
    }
}

#[async_trait]
impl<S: MetricSource + ?Sized> MetricSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn sample(
        &self,
        endpoint: &EndpointId,
        metric: MetricId,
    ) -> Result<MetricValue, SourceError> {
        (**self).sample(endpoint, metric).await
    }
}

/// Dispatches each endpoint to its own backend.
///
/// The server end might be polled over SNMP while the local end is sampled
/// from procfs.
#[derive(Default)]
pub struct EndpointRouter {
    routes: HashMap<EndpointId, Box<dyn MetricSource>>,
}

impl EndpointRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `source` for `endpoint`, replacing any earlier route.
    pub fn route(&mut self, endpoint: EndpointId, source: Box<dyn MetricSource>) {
        self.routes.insert(endpoint, source);
    }

    pub fn with_route(mut self, endpoint: EndpointId, source: Box<dyn MetricSource>) -> Self {
        self.route(endpoint, source);
        self
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[async_trait]
impl MetricSource for EndpointRouter {
    fn name(&self) -> &str {
        "router"
    }

    async fn sample(
        &self,
        endpoint: &EndpointId,
        metric: MetricId,
    ) -> Result<MetricValue, SourceError> {
        match self.routes.get(endpoint) {
            Some(source) => source.sample(endpoint, metric).await,
            None => Err(SourceError::Unreachable(format!(
                "no source configured for endpoint '{endpoint}'"
            ))),
        }
    }
}
