//! pbrelay server: receives Productboard webhooks and creates linked features.
//!
//! `GET /` answers the subscription probe by echoing `validationToken`.
//! `POST /` acknowledges with 202 and processes the event on a background
//! task, or, in synchronous mode, processes first and answers 200/400/500.
//!
//! # Modules
//!
//! - [`routes`]: HTTP endpoints (verification, webhook, health, metrics)
//! - [`dispatcher`]: normalize → lookup → create pipeline
//! - [`config`]: environment configuration
//! - [`state`]: shared [`AppState`](state::AppState)
//! - [`metrics`]: Prometheus metrics for processed events

pub mod config;
pub mod dispatcher;
pub mod metrics;
pub mod routes;
pub mod state;
