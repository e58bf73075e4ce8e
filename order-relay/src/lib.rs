pub mod batch;
pub mod config;
pub mod errors;
pub mod handler;
pub mod mapper;
pub mod metrics_defs;
pub mod order;
pub mod retry;
pub mod upstream;

#[cfg(test)]
mod testutils;

use crate::errors::{OrderRelayError, RelayError, RelayFailure, Result};
use crate::handler::OrderRelayHandler;
use crate::order::PayloadError;
use crate::upstream::{FulfillmentClient, StorefrontClient};
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use shared::admin_service::AdminService;
use shared::http::{into_boxed, make_error_response, make_json_response, run_http_service};
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;

/// Paths the order-created webhook is accepted on
pub const WEBHOOK_PATHS: &[&str] = &["/webhooks/order/fulfillment", "/api/order-fulfillment"];

const USER_AGENT: &str = concat!("order-relay/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client for all outbound calls. Per-attempt timeouts are
/// enforced by the retry policy, not here.
pub fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().user_agent(USER_AGENT).build()?)
}

/// Clients for both upstreams; fails if any credential is missing.
pub fn upstream_clients(
    config: &config::Config,
    http: reqwest::Client,
) -> Result<(FulfillmentClient, StorefrontClient)> {
    let credentials = config
        .credentials
        .resolve()
        .map_err(OrderRelayError::MissingCredentials)?;
    let admin_url = config.storefront.admin_url(&credentials.storefront_shop)?;

    Ok((
        FulfillmentClient::new(
            http.clone(),
            config.fulfillment.base_url.clone(),
            credentials.fulfillment_email,
            credentials.fulfillment_token,
        ),
        StorefrontClient::new(
            http,
            admin_url,
            credentials.storefront_api_key,
            credentials.storefront_access_token,
        ),
    ))
}

/// Serves the webhook listener and the admin listener until either fails.
pub async fn run(config: config::Config) -> Result<()> {
    config.validate()?;

    let handler = Arc::new(OrderRelayHandler::from_config(&config, http_client()?)?);
    let relay_service = OrderRelayService::new(handler.clone());
    let admin_service: AdminService<_, OrderRelayError> =
        AdminService::new("order-relay", move || handler.is_configured());

    let relay_task = run_http_service(&config.listener.host, config.listener.port, relay_service);
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin_service,
    );

    tokio::try_join!(relay_task, admin_task)?;
    Ok(())
}

/// Routes webhook deliveries to the relay handler.
pub struct OrderRelayService {
    handler: Arc<OrderRelayHandler>,
}

impl OrderRelayService {
    pub fn new(handler: Arc<OrderRelayHandler>) -> Self {
        Self { handler }
    }
}

impl Service<Request<Incoming>> for OrderRelayService {
    type Response = Response<BoxBody<Bytes, Infallible>>;
    type Error = OrderRelayError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let handler = self.handler.clone();

        Box::pin(async move {
            if !WEBHOOK_PATHS.contains(&req.uri().path()) {
                tracing::warn!(
                    method = %req.method(),
                    path = %req.uri().path(),
                    "No route matched"
                );
                return Ok(into_boxed(make_error_response(StatusCode::NOT_FOUND)));
            }

            let (parts, body) = req.into_parts();
            let body = match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read webhook body");
                    let failure = RelayFailure::from(RelayError::InvalidPayload(
                        PayloadError::Unreadable(e.to_string()),
                    ));
                    return Ok(into_boxed(make_json_response(
                        failure.status_code(),
                        &failure.to_body(),
                    )));
                }
            };

            let response = handler.handle(Request::from_parts(parts, body)).await;
            Ok(into_boxed(response))
        })
    }
}
