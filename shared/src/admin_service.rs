//! Liveness and readiness endpoints served on the admin listener.

use crate::http::{into_boxed, make_boxed_error_response, make_json_response};
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

#[derive(Serialize)]
struct StatusBody {
    status: &'static str,
    service: &'static str,
}

pub struct AdminService<F, E> {
    service_name: &'static str,
    is_ready: F,
    _error: PhantomData<E>,
}

impl<F, E> AdminService<F, E>
where
    F: Fn() -> bool,
{
    pub fn new(service_name: &'static str, is_ready: F) -> Self {
        Self {
            service_name,
            is_ready,
            _error: PhantomData,
        }
    }
}

impl<F, E> Service<Request<Incoming>> for AdminService<F, E>
where
    F: Fn() -> bool + Send + Sync + 'static,
    E: Send + 'static,
{
    type Response = Response<BoxBody<Bytes, Infallible>>;
    type Error = E;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let is_ready = (self.is_ready)();
        let service = self.service_name;

        Box::pin(async move {
            if req.method() != Method::GET {
                return Ok(make_boxed_error_response(StatusCode::METHOD_NOT_ALLOWED));
            }

            let ok = |status| {
                into_boxed(make_json_response(
                    StatusCode::OK,
                    &StatusBody { status, service },
                ))
            };

            let res = match req.uri().path() {
                "/health" => ok("ok"),
                "/ready" => match is_ready {
                    true => ok("ready"),
                    false => make_boxed_error_response(StatusCode::SERVICE_UNAVAILABLE),
                },
                _ => make_boxed_error_response(StatusCode::NOT_FOUND),
            };
            Ok(res)
        })
    }
}
