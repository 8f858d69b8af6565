//! Event processing pipeline: normalize, look up the component, create the feature.
//!
//! [`Dispatcher::process_body`] runs the whole chain and returns a typed
//! outcome; the synchronous endpoint answers from it directly. In the default
//! mode the endpoint has already answered 202, so [`Dispatcher::spawn`] runs
//! the chain on a detached task and only logs what happened.

use std::time::Instant;

use pbrelay::{FeatureRequest, NormalizedEvent, ProductboardClient, RelayError};
use tracing::Instrument;
use uuid::Uuid;

use crate::metrics;

/// What happened to one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Created {
        component_id: String,
        component_name: String,
        feature_id: Option<String>,
    },
    Ignored {
        reason: String,
    },
}

impl ProcessOutcome {
    /// Treat an ignored event as a validation failure, for callers that must
    /// report it to the sender.
    pub fn into_created(self) -> Result<Self, RelayError> {
        match self {
            ProcessOutcome::Ignored { reason } => Err(RelayError::Validation(reason)),
            created => Ok(created),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: ProductboardClient,
}

impl Dispatcher {
    pub fn new(client: ProductboardClient) -> Self {
        Self { client }
    }

    /// Classify and handle a raw webhook body.
    pub async fn process_body(&self, body: &[u8]) -> Result<ProcessOutcome, RelayError> {
        self.process(pbrelay::normalize_bytes(body)).await
    }

    /// Handle an already classified event. Creation is attempted only after
    /// the lookup succeeded.
    pub async fn process(&self, event: NormalizedEvent) -> Result<ProcessOutcome, RelayError> {
        let (kind, component_id) = match event {
            NormalizedEvent::Recognized { kind, component_id } => (kind, component_id),
            NormalizedEvent::Unrecognized { reason } => {
                return Ok(ProcessOutcome::Ignored { reason });
            }
        };

        tracing::debug!(%component_id, event_type = kind.as_str(), "Looking up component");
        let record = self.client.fetch_component(&component_id).await?;

        tracing::debug!(%component_id, component_name = %record.name, "Creating feature");
        let feature_id = self
            .client
            .submit_feature(&FeatureRequest::from(&record))
            .await?;

        Ok(ProcessOutcome::Created {
            component_id: record.id,
            component_name: record.name,
            feature_id,
        })
    }

    /// [`process_body`](Self::process_body) with metrics and a log line for
    /// every outcome. Failures are reported here and not returned further.
    pub async fn process_logged(&self, body: &[u8]) -> Result<ProcessOutcome, RelayError> {
        let start = Instant::now();
        let result = self.process_body(body).await;
        let elapsed = start.elapsed().as_secs_f64();

        match &result {
            Ok(ProcessOutcome::Created {
                component_id,
                component_name,
                feature_id,
            }) => {
                metrics::observe("created", elapsed);
                tracing::info!(
                    %component_id,
                    component_name = %component_name,
                    feature_id = feature_id.as_deref().unwrap_or("unknown"),
                    "Feature created"
                );
            }
            Ok(ProcessOutcome::Ignored { reason }) => {
                metrics::observe("ignored", elapsed);
                tracing::info!(reason = %reason, "Ignoring webhook event");
            }
            Err(e) => {
                let outcome = match e {
                    RelayError::Lookup { .. } => "lookup_failed",
                    RelayError::Creation { .. } => "creation_failed",
                    RelayError::Validation(_) | RelayError::Config(_) => "ignored",
                };
                metrics::observe(outcome, elapsed);
                let component_id = match e {
                    RelayError::Lookup { component_id, .. }
                    | RelayError::Creation { component_id, .. } => component_id.as_str(),
                    _ => "",
                };
                let api = e.api_error();
                tracing::error!(
                    component_id,
                    step = e.step(),
                    status = api.and_then(|a| a.status()),
                    upstream_body = api.and_then(|a| a.body()).unwrap_or(""),
                    error = %e,
                    "Webhook processing failed"
                );
            }
        }

        result
    }

    /// Process `body` on a detached task, under a span tagged with `delivery_id`.
    pub fn spawn(&self, body: Vec<u8>, delivery_id: Uuid) -> tokio::task::JoinHandle<()> {
        let dispatcher = self.clone();
        let span = tracing::info_span!("webhook", %delivery_id);
        tokio::spawn(
            async move {
                let _ = dispatcher.process_logged(&body).await;
            }
            .instrument(span),
        )
    }
}
