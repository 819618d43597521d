//! Request logging middleware.
//!
//! Webhook deliveries are logged with their GitHub delivery id and event
//! type so a delivery shown on the VCS host can be traced to its scan.

use actix_web::Error;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready};
use futures_util::future::LocalBoxFuture;
use std::future::{Ready, ready};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ADMIN_KEY_HEADER;

const DELIVERY_HEADER: &str = "x-github-delivery";
const EVENT_HEADER: &str = "x-github-event";

/// Request logger middleware factory.
pub struct RequestLogger;

impl<S, B> Transform<S, ServiceRequest> for RequestLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestLoggerMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggerMiddleware { service }))
    }
}

pub struct RequestLoggerMiddleware<S> {
    service: S,
}

/// What gets logged about a request once it has an answer.
struct RequestLine {
    method: String,
    path: String,
    delivery: Option<String>,
    event: Option<String>,
    admin: bool,
    started: Instant,
}

impl RequestLine {
    fn capture(req: &ServiceRequest) -> Self {
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            method: req.method().to_string(),
            path: req.path().to_string(),
            delivery: header(DELIVERY_HEADER),
            event: header(EVENT_HEADER),
            // Presence only; the key itself never reaches the log.
            admin: req.headers().contains_key(ADMIN_KEY_HEADER),
            started: Instant::now(),
        }
    }

    fn finish(self, status: u16) {
        let duration_ms = self.started.elapsed().as_millis() as u64;
        let delivery = self.delivery.as_deref().unwrap_or("-");
        let event = self.event.as_deref().unwrap_or("-");

        match status {
            // Probes are polled constantly.
            _ if self.path.ends_with("/health") || self.path.ends_with("/ready") => debug!(
                target: "api",
                method = %self.method,
                path = %self.path,
                status,
                duration_ms,
                "Probe answered"
            ),
            500.. => warn!(
                target: "api",
                method = %self.method,
                path = %self.path,
                delivery,
                event,
                admin = self.admin,
                status,
                duration_ms,
                "Request failed"
            ),
            400..=499 => warn!(
                target: "api",
                method = %self.method,
                path = %self.path,
                delivery,
                event,
                admin = self.admin,
                status,
                duration_ms,
                "Request rejected"
            ),
            _ => info!(
                target: "api",
                method = %self.method,
                path = %self.path,
                delivery,
                event,
                admin = self.admin,
                status,
                duration_ms,
                "Request handled"
            ),
        }
    }
}

impl<S, B> Service<ServiceRequest> for RequestLoggerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let line = RequestLine::capture(&req);
        let fut = self.service.call(req);

        Box::pin(async move {
            let res = fut.await?;
            line.finish(res.status().as_u16());
            Ok(res)
        })
    }
}
