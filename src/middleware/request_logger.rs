//! Request logging middleware for detailed API request/response logging.

use actix_web::Error;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::future::LocalBoxFuture;
use std::future::{Ready, ready};
use std::time::Instant;
use tracing::{info, warn};

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

/// Request logger middleware service.
pub struct RequestLoggerMiddleware<S> {
    service: S,
}

/// The caller's username for the log line; never the credential itself.
fn caller_info(req: &ServiceRequest) -> String {
    let Some(header) = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
    else {
        return "anonymous".to_string();
    };
    if header.starts_with("Bearer ") {
        return "token".to_string();
    }
    header
        .strip_prefix("Basic ")
        .and_then(|encoded| BASE64.decode(encoded.trim()).ok())
        .and_then(|decoded| String::from_utf8(decoded).ok())
        .and_then(|creds| creds.split_once(':').map(|(user, _)| user.to_string()))
        .unwrap_or_else(|| "invalid".to_string())
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
        let start = Instant::now();
        let method = req.method().to_string();
        let path = req.path().to_string();
        let query = req.query_string().to_string();
        let remote_addr = req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("unknown")
            .to_string();
        let user = caller_info(&req);

        info!(
            target: "api",
            method = %method,
            path = %path,
            query = %query,
            remote_addr = %remote_addr,
            user = %user,
            "→ Request started"
        );

        let fut = self.service.call(req);

        Box::pin(async move {
            let res = fut.await?;
            let elapsed = start.elapsed();
            let status = res.status();
            let status_code = status.as_u16();

            if status.is_success() {
                info!(
                    target: "api",
                    method = %method,
                    path = %path,
                    status = %status_code,
                    user = %user,
                    duration_ms = %elapsed.as_millis(),
                    "← Request completed"
                );
            } else if status.is_client_error() {
                warn!(
                    target: "api",
                    method = %method,
                    path = %path,
                    status = %status_code,
                    user = %user,
                    duration_ms = %elapsed.as_millis(),
                    "← Client error"
                );
            } else {
                warn!(
                    target: "api",
                    method = %method,
                    path = %path,
                    status = %status_code,
                    user = %user,
                    duration_ms = %elapsed.as_millis(),
                    "← Server error"
                );
            }

            Ok(res)
        })
    }
}
