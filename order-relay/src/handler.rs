//! Order relay handler
//!
//! Handles the storefront's order-created webhook in a fixed sequence:
//!
//! 1. Only `POST` is accepted.
//! 2. The payload must carry an order id and at least one line item, and
//!    every deployment credential must be configured. Nothing remote is
//!    called before both checks pass.
//! 3. The order is mapped onto the provider schema and submitted, with
//!    bounded retry.
//! 4. The status token from the provider's answer (or [`DEFAULT_STATUS`]) is
//!    written onto the storefront order as its note, again with bounded retry.
//!
//! The two remote calls never overlap. If the note update fails after the
//! order was created, the failure still carries the creation response; the
//! created order is not cancelled and has to be reconciled by hand.

use crate::config::{Config, FulfillmentConfig};
use crate::errors::{OrderRelayError, RelayError, RelayFailure, Stage};
use crate::mapper::map_order;
use crate::metrics_defs::{ORDERS, REQUEST_DURATION};
use crate::order::{InboundOrder, OrderId};
use crate::retry::{RetryPolicy, with_retry};
use crate::upstream::{FulfillmentApi, StorefrontApi};
use chrono::Utc;
use http::{Method, Request, Response, StatusCode};
use hyper::body::Bytes;
use serde::Serialize;
use serde_json::Value;
use shared::http::make_json_response;
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;

/// Note written to the storefront when the provider reports no status
pub const DEFAULT_STATUS: &str = "Order Sent";

/// Both remote responses of a fully relayed order
#[derive(Debug, PartialEq)]
pub struct RelaySuccess {
    pub order_id: OrderId,
    pub status: String,
    pub compliance_response: Value,
    pub storefront_response: Value,
}

#[derive(Serialize)]
struct SuccessBody<'a> {
    message: &'static str,
    data: SuccessData<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SuccessData<'a> {
    status: &'a str,
    compliance_response: &'a Value,
    storefront_response: &'a Value,
}

enum Upstreams {
    Ready {
        fulfillment: Arc<dyn FulfillmentApi>,
        storefront: Arc<dyn StorefrontApi>,
    },
    /// Credentials were incomplete at startup
    Unconfigured(Vec<&'static str>),
}

pub struct OrderRelayHandler {
    settings: FulfillmentConfig,
    retry: RetryPolicy,
    upstreams: Upstreams,
}

impl OrderRelayHandler {
    /// Builds the handler with HTTP clients for both upstreams.
    ///
    /// Incomplete credentials are not an error here; every request is then
    /// answered with the list of missing keys.
    pub fn from_config(config: &Config, http: reqwest::Client) -> Result<Self, OrderRelayError> {
        let upstreams = match crate::upstream_clients(config, http) {
            Ok((fulfillment, storefront)) => Upstreams::Ready {
                fulfillment: Arc::new(fulfillment),
                storefront: Arc::new(storefront),
            },
            Err(OrderRelayError::MissingCredentials(missing)) => {
                tracing::warn!(
                    missing = ?missing,
                    "Credentials incomplete, orders will be rejected until configured"
                );
                Upstreams::Unconfigured(missing)
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            settings: config.fulfillment.clone(),
            retry: config.retry.clone(),
            upstreams,
        })
    }

    pub fn new(
        settings: FulfillmentConfig,
        retry: RetryPolicy,
        fulfillment: Arc<dyn FulfillmentApi>,
        storefront: Arc<dyn StorefrontApi>,
    ) -> Self {
        Self {
            settings,
            retry,
            upstreams: Upstreams::Ready {
                fulfillment,
                storefront,
            },
        }
    }

    /// Handler whose every request fails the configuration check.
    pub fn unconfigured(
        settings: FulfillmentConfig,
        retry: RetryPolicy,
        missing: Vec<&'static str>,
    ) -> Self {
        Self {
            settings,
            retry,
            upstreams: Upstreams::Unconfigured(missing),
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self.upstreams, Upstreams::Ready { .. })
    }

    /// Handles one webhook delivery and renders the outcome as a JSON response.
    pub async fn handle(&self, request: Request<Bytes>) -> Response<Bytes> {
        let start = Instant::now();
        let (parts, body) = request.into_parts();

        let response = match self.relay(&parts.method, &body).await {
            Ok(success) => {
                counter!(ORDERS, "outcome" => "ok").increment(1);
                make_json_response(
                    StatusCode::OK,
                    &SuccessBody {
                        message: "Order processed successfully",
                        data: SuccessData {
                            status: &success.status,
                            compliance_response: &success.compliance_response,
                            storefront_response: &success.storefront_response,
                        },
                    },
                )
            }
            Err(failure) => {
                let outcome = if failure.is_partial() {
                    "partial"
                } else {
                    failure.error.kind()
                };
                counter!(ORDERS, "outcome" => outcome).increment(1);
                make_json_response(failure.status_code(), &failure.to_body())
            }
        };

        histogram!(REQUEST_DURATION, "status" => response.status().as_str().to_owned())
            .record(start.elapsed().as_secs_f64());

        response
    }

    /// Runs the relay sequence for one webhook delivery.
    pub async fn relay(&self, method: &Method, body: &[u8]) -> Result<RelaySuccess, RelayFailure> {
        if method != Method::POST {
            tracing::warn!(method = %method, "Rejecting webhook with unsupported method");
            return Err(RelayError::MethodNotAllowed(method.clone()).into());
        }

        let order = InboundOrder::parse(body).map_err(|e| {
            tracing::warn!(error = %e, "Rejecting invalid order payload");
            RelayError::from(e)
        })?;

        tracing::info!(
            order_id = %order.id,
            line_items = order.line_items.len(),
            "Received order"
        );

        let (fulfillment, storefront) = match &self.upstreams {
            Upstreams::Ready {
                fulfillment,
                storefront,
            } => (fulfillment.as_ref(), storefront.as_ref()),
            Upstreams::Unconfigured(missing) => {
                tracing::error!(
                    order_id = %order.id,
                    missing = ?missing,
                    "Cannot relay order, configuration is incomplete"
                );
                return Err(RelayError::MissingConfiguration(missing.clone()).into());
            }
        };

        let outbound = map_order(&order, &self.settings, Utc::now());

        let compliance_response = {
            let outbound = &outbound;
            with_retry(&self.retry, "create_order", move || {
                fulfillment.create_order(outbound)
            })
            .await
            .map_err(|e| {
                tracing::error!(order_id = %order.id, error = %e, "Failed to submit order");
                RelayError::from_upstream(Stage::CreateOrder, e)
            })?
        };

        let status = extract_status(&compliance_response);
        tracing::info!(order_id = %order.id, status = %status, "Order accepted by provider");

        let storefront_response = {
            let id = &order.id;
            let note = status.as_str();
            with_retry(&self.retry, "update_order_note", move || {
                storefront.update_order_note(id, note)
            })
            .await
        };

        let storefront_response = match storefront_response {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(
                    order_id = %order.id,
                    error = %e,
                    "Order created but storefront note update failed, needs manual reconciliation"
                );
                return Err(RelayFailure {
                    error: RelayError::from_upstream(Stage::UpdateNote, e),
                    compliance_response: Some(compliance_response),
                });
            }
        };

        tracing::info!(order_id = %order.id, "Order relayed");

        Ok(RelaySuccess {
            order_id: order.id,
            status,
            compliance_response,
            storefront_response,
        })
    }
}

/// Status token of the provider's creation response, or [`DEFAULT_STATUS`].
pub fn extract_status(response: &Value) -> String {
    response
        .get("status")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|status| !status.is_empty())
        .unwrap_or(DEFAULT_STATUS)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{FakeFulfillment, FakeStorefront, valid_order_body};
    use crate::upstream::UpstreamError;
    use serde_json::json;

    fn retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            delay_ms: 1000,
            attempt_timeout_ms: 5000,
        }
    }

    fn handler(
        fulfillment: &Arc<FakeFulfillment>,
        storefront: &Arc<FakeStorefront>,
    ) -> OrderRelayHandler {
        OrderRelayHandler::new(
            FulfillmentConfig::default(),
            retry(),
            fulfillment.clone(),
            storefront.clone(),
        )
    }

    fn request(method: Method, body: &'static [u8]) -> Request<Bytes> {
        Request::builder()
            .method(method)
            .uri("/webhooks/order/fulfillment")
            .body(Bytes::from_static(body))
            .unwrap()
    }

    fn body_json(response: &Response<Bytes>) -> Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    #[test]
    fn test_extract_status() {
        assert_eq!(extract_status(&json!({"status": "APPROVED"})), "APPROVED");
        assert_eq!(extract_status(&json!({"status": ""})), DEFAULT_STATUS);
        assert_eq!(extract_status(&json!({"status": 3})), DEFAULT_STATUS);
        assert_eq!(extract_status(&json!({"ordernr": "1"})), DEFAULT_STATUS);
        assert_eq!(extract_status(&Value::Null), DEFAULT_STATUS);
    }

    #[test]
    fn test_from_config_without_credentials() {
        let mut config: Config = serde_yaml::from_str(
            r#"
listener: {host: "0.0.0.0", port: 3000}
admin_listener: {host: "127.0.0.1", port: 3001}
fulfillment: {}
storefront: {}
credentials:
    fulfillment_email: ops@example.com
"#,
        )
        .unwrap();

        let handler = OrderRelayHandler::from_config(&config, reqwest::Client::new()).unwrap();
        assert!(!handler.is_configured());

        config.credentials.fulfillment_token = Some("secret".to_string());
        config.credentials.storefront_api_key = Some("key".to_string());
        config.credentials.storefront_shop = Some("my-shop".to_string());
        config.credentials.storefront_access_token = Some("token".to_string());
        let handler = OrderRelayHandler::from_config(&config, reqwest::Client::new()).unwrap();
        assert!(handler.is_configured());
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_success() {
        let fulfillment =
            FakeFulfillment::answering(vec![Ok(json!({"ordernr": "9", "status": "APPROVED"}))]);
        let storefront =
            FakeStorefront::answering(vec![Ok(json!({"order": {"note": "APPROVED"}}))]);

        let response = handler(&fulfillment, &storefront)
            .handle(request(Method::POST, valid_order_body()))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(&response);
        assert_eq!(body["message"], "Order processed successfully");
        assert_eq!(body["data"]["complianceResponse"]["ordernr"], "9");
        assert_eq!(body["data"]["storefrontResponse"]["order"]["note"], "APPROVED");

        let created = fulfillment.created_orders();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].orderref, "1001");
        assert_eq!(created[0].items.len(), 2);
        assert_eq!(
            storefront.note_updates(),
            vec![("1001".to_string(), "APPROVED".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_status_uses_placeholder_note() {
        let fulfillment = FakeFulfillment::answering(vec![Ok(json!({"ordernr": "9"}))]);
        let storefront = FakeStorefront::answering(vec![Ok(json!({}))]);

        let success = handler(&fulfillment, &storefront)
            .relay(&Method::POST, valid_order_body())
            .await
            .unwrap();

        assert_eq!(success.status, DEFAULT_STATUS);
        assert_eq!(storefront.note_updates()[0].1, DEFAULT_STATUS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_method_makes_no_calls() {
        let fulfillment = FakeFulfillment::answering(vec![]);
        let storefront = FakeStorefront::answering(vec![]);

        for method in [Method::GET, Method::PUT, Method::DELETE] {
            let response = handler(&fulfillment, &storefront)
                .handle(request(method, valid_order_body()))
                .await;
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
            assert_eq!(body_json(&response)["error"], "Method Not Allowed");
        }

        assert_eq!(fulfillment.calls(), 0);
        assert_eq!(storefront.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_payload_makes_no_calls() {
        let fulfillment = FakeFulfillment::answering(vec![]);
        let storefront = FakeStorefront::answering(vec![]);
        let handler = handler(&fulfillment, &storefront);

        let bodies: [&[u8]; 5] = [
            b"",
            b"[]",
            br#"{"id": 1}"#,
            br#"{"id": 1, "line_items": []}"#,
            br#"{"line_items": [{"sku": "A", "quantity": 1}]}"#,
        ];
        for body in bodies {
            let failure = handler.relay(&Method::POST, body).await.unwrap_err();
            assert!(matches!(failure.error, RelayError::InvalidPayload(_)));
            assert_eq!(failure.status_code(), StatusCode::BAD_REQUEST);
        }

        assert_eq!(fulfillment.calls(), 0);
        assert_eq!(storefront.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_configuration_enumerates_keys() {
        let handler = OrderRelayHandler::unconfigured(
            FulfillmentConfig::default(),
            retry(),
            vec!["API_TOKEN", "SHOPIFY_SHOP_NAME"],
        );
        assert!(!handler.is_configured());

        let response = handler
            .handle(request(Method::POST, valid_order_body()))
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(&response);
        assert_eq!(body["error"], "Server configuration error");
        assert_eq!(body["missing"], json!(["API_TOKEN", "SHOPIFY_SHOP_NAME"]));

        // Payload problems are reported before configuration problems
        let failure = handler.relay(&Method::POST, b"{}").await.unwrap_err();
        assert_eq!(failure.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_retried_then_succeeds() {
        let fulfillment = FakeFulfillment::answering(vec![
            Err(UpstreamError::Unreachable("reset".into())),
            Ok(json!({"status": "APPROVED"})),
        ]);
        let storefront = FakeStorefront::answering(vec![Ok(json!({}))]);

        let success = handler(&fulfillment, &storefront)
            .relay(&Method::POST, valid_order_body())
            .await
            .unwrap();

        assert_eq!(success.status, "APPROVED");
        assert_eq!(fulfillment.calls(), 2);
        assert_eq!(storefront.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_rejected_skips_storefront() {
        let rejection = || {
            Err(UpstreamError::Rejected {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                body: json!({"error": "unknown itemcode"}),
            })
        };
        let fulfillment = FakeFulfillment::answering(vec![rejection(), rejection(), rejection()]);
        let storefront = FakeStorefront::answering(vec![]);

        let response = handler(&fulfillment, &storefront)
            .handle(request(Method::POST, valid_order_body()))
            .await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(&response);
        assert_eq!(body["details"], json!({"error": "unknown itemcode"}));
        assert_eq!(body["stage"], "create_order");
        assert!(body.get("complianceResponse").is_none());
        assert_eq!(fulfillment.calls(), 3);
        assert_eq!(storefront.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_unreachable_is_gateway_timeout() {
        let unreachable = || Err(UpstreamError::Unreachable("connection refused".into()));
        let fulfillment =
            FakeFulfillment::answering(vec![unreachable(), unreachable(), unreachable()]);
        let storefront = FakeStorefront::answering(vec![]);

        let failure = handler(&fulfillment, &storefront)
            .relay(&Method::POST, valid_order_body())
            .await
            .unwrap_err();

        assert_eq!(failure.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert!(!failure.is_partial());
        assert_eq!(fulfillment.calls(), 3);
        assert_eq!(storefront.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_internal_error() {
        let broken = || Err(UpstreamError::Internal("bad json".into()));
        let fulfillment = FakeFulfillment::answering(vec![broken(), broken(), broken()]);
        let storefront = FakeStorefront::answering(vec![]);

        let failure = handler(&fulfillment, &storefront)
            .relay(&Method::POST, valid_order_body())
            .await
            .unwrap_err();

        assert_eq!(failure.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(storefront.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_note_failure_keeps_creation_response() {
        let fulfillment =
            FakeFulfillment::answering(vec![Ok(json!({"ordernr": "77", "status": "APPROVED"}))]);
        let not_found = || {
            Err(UpstreamError::Rejected {
                status: StatusCode::NOT_FOUND,
                body: json!({"errors": "Not Found"}),
            })
        };
        let storefront = FakeStorefront::answering(vec![not_found(), not_found(), not_found()]);

        let response = handler(&fulfillment, &storefront)
            .handle(request(Method::POST, valid_order_body()))
            .await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(&response);
        assert_eq!(body["stage"], "update_note");
        assert_eq!(body["complianceResponse"]["ordernr"], "77");
        assert_eq!(body["details"], json!({"errors": "Not Found"}));

        // Created once, never rolled back or resubmitted
        assert_eq!(fulfillment.calls(), 1);
        assert_eq!(storefront.calls(), 3);
    }
}
