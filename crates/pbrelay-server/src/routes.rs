use actix_web::{get, web, HttpRequest, HttpResponse};
use pbrelay::RelayError;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{MetricsAccess, ResponseMode};
use crate::dispatcher::ProcessOutcome;
use crate::metrics;
use crate::state::AppState;

/// Header carrying the handshake token on POST-style verification.
pub const VERIFICATION_HEADER: &str = "X-Productboard-Webhook-Verification-Token";

/// Query parameter carrying the subscription handshake token.
pub const VALIDATION_PARAM: &str = "validationToken";

/// Paths answering the webhook handshake and receiving events.
pub const WEBHOOK_PATHS: [&str; 2] = ["/", "/webhook"];

/// Register every endpoint on an actix `App`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(metrics_endpoint)
        .service(
            web::resource(WEBHOOK_PATHS)
                .route(web::get().to(verify_subscription))
                .route(web::post().to(receive_event)),
        );
}

fn plain_text(mut builder: actix_web::HttpResponseBuilder, body: String) -> HttpResponse {
    builder.content_type("text/plain; charset=utf-8").body(body)
}

fn decode_query_part(raw: &str) -> Vec<u8> {
    urlencoding::decode_binary(raw.replace('+', " ").as_bytes()).into_owned()
}

/// Raw bytes of the first `validationToken` in `query`, without any UTF-8
/// conversion. Absent or empty is a validation error.
pub fn validation_token(query: &str) -> Result<Vec<u8>, RelayError> {
    query
        .split('&')
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .find(|(key, _)| decode_query_part(key) == VALIDATION_PARAM.as_bytes())
        .map(|(_, value)| decode_query_part(value))
        .filter(|token| !token.is_empty())
        .ok_or_else(|| RelayError::Validation(format!("Missing {VALIDATION_PARAM}")))
}

/// Subscription probe: echo `validationToken` byte for byte.
pub async fn verify_subscription(req: HttpRequest) -> HttpResponse {
    match validation_token(req.query_string()) {
        Ok(token) => {
            tracing::info!("Answered subscription validation probe");
            HttpResponse::Ok().content_type("text/plain").body(token)
        }
        Err(RelayError::Validation(message)) => {
            tracing::warn!(error = %message, "Rejected subscription probe");
            plain_text(HttpResponse::BadRequest(), message)
        }
        Err(e) => {
            tracing::error!(error = %e, "Subscription probe failed");
            plain_text(HttpResponse::InternalServerError(), e.to_string())
        }
    }
}

/// Inbound webhook delivery.
pub async fn receive_event(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Bytes,
) -> HttpResponse {
    if let Some(token) = req
        .headers()
        .get(VERIFICATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|t| !t.is_empty())
    {
        tracing::info!("Answered header verification request");
        return plain_text(HttpResponse::Ok(), token.to_string());
    }

    let delivery_id = Uuid::new_v4();
    tracing::info!(%delivery_id, bytes = body.len(), "Webhook received");

    match state.response_mode {
        ResponseMode::Async => {
            state.dispatcher.spawn(body.to_vec(), delivery_id);
            HttpResponse::Accepted().json(serde_json::json!({
                "status": "accepted",
                "deliveryId": delivery_id.to_string(),
            }))
        }
        ResponseMode::Sync => {
            let span = tracing::info_span!("webhook", %delivery_id);
            let result = state
                .dispatcher
                .process_logged(&body)
                .instrument(span)
                .await
                .and_then(ProcessOutcome::into_created);
            match result {
                Ok(_) => plain_text(HttpResponse::Ok(), "Feature created successfully!".into()),
                Err(RelayError::Validation(reason)) => plain_text(
                    HttpResponse::BadRequest(),
                    format!("Invalid event type or missing data: {reason}"),
                ),
                Err(_) => plain_text(
                    HttpResponse::InternalServerError(),
                    "Error processing webhook".into(),
                ),
            }
        }
    }
}

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "pbrelay",
    }))
}

/// Compares SHA-256 digests so timing leaks neither content nor length.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let ha = Sha256::digest(a);
    let hb = Sha256::digest(b);
    ha.ct_eq(&hb).into()
}

#[get("/metrics")]
pub async fn metrics_endpoint(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    match &state.metrics {
        MetricsAccess::Token(token) => {
            let authorized = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|t| constant_time_eq(t.as_bytes(), token))
                .unwrap_or(false);

            if !authorized {
                return HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "unauthorized",
                    "message": "Valid Bearer token required for /metrics"
                }));
            }
        }
        MetricsAccess::Disabled => {
            return HttpResponse::Forbidden().json(serde_json::json!({
                "error": "forbidden",
                "message": "Set METRICS_TOKEN or METRICS_PUBLIC=true to access /metrics"
            }));
        }
        MetricsAccess::Public => {}
    }
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics::metrics_output())
}
