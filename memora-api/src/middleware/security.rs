/// Security response headers
///
/// Every response leaving the router gets the headers below. HSTS is only
/// sent in production, where the API sits behind TLS.
///
/// | Header                       | Value                                   |
/// |------------------------------|-----------------------------------------|
/// | `X-Content-Type-Options`     | `nosniff`                               |
/// | `X-Frame-Options`            | `DENY`                                  |
/// | `Referrer-Policy`            | `strict-origin-when-cross-origin`       |
/// | `Permissions-Policy`         | camera, microphone, geolocation off     |
/// | `Content-Security-Policy`    | self only, `data:` images for QR codes  |
/// | `Cache-Control`              | `no-store`                              |
/// | `Strict-Transport-Security`  | one year (production)                   |
///
/// # Example
///
/// ```no_run
/// use axum::Router;
/// use memora_api::middleware::security::SecurityHeadersLayer;
///
/// let app: Router = Router::new().layer(SecurityHeadersLayer::new(true));
/// ```

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::{
    extract::Request,
    http::{header, HeaderName, HeaderValue},
    response::Response,
};
use tower::{Layer, Service};

fn base_headers() -> [(HeaderName, &'static str); 6] {
    [
        (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        (header::X_FRAME_OPTIONS, "DENY"),
        (header::REFERRER_POLICY, "strict-origin-when-cross-origin"),
        (
            HeaderName::from_static("permissions-policy"),
            "camera=(), microphone=(), geolocation=()",
        ),
        (
            header::CONTENT_SECURITY_POLICY,
            "default-src 'self'; img-src 'self' data:; frame-ancestors 'none'",
        ),
        // responses carry session and account data
        (header::CACHE_CONTROL, "no-store"),
    ]
}

const HSTS: &str = "max-age=31536000; includeSubDomains";

/// Adds security headers to every response
#[derive(Debug, Clone, Copy)]
pub struct SecurityHeadersLayer {
    hsts: bool,
}

impl SecurityHeadersLayer {
    /// `hsts` should be true only when served over HTTPS
    pub fn new(hsts: bool) -> Self {
        Self { hsts }
    }
}

impl<S> Layer<S> for SecurityHeadersLayer {
    type Service = SecurityHeaders<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SecurityHeaders {
            inner,
            hsts: self.hsts,
        }
    }
}

/// Service produced by [`SecurityHeadersLayer`]
#[derive(Debug, Clone)]
pub struct SecurityHeaders<S> {
    inner: S,
    hsts: bool,
}

impl<S> Service<Request> for SecurityHeaders<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let future = self.inner.call(request);
        let hsts = self.hsts;

        Box::pin(async move {
            let mut response = future.await?;
            let headers = response.headers_mut();

            for (name, value) in base_headers() {
                // handlers may set a stricter value themselves
                if !headers.contains_key(&name) {
                    headers.insert(name, HeaderValue::from_static(value));
                }
            }

            if hsts {
                headers.insert(header::STRICT_TRANSPORT_SECURITY, HeaderValue::from_static(HSTS));
            }

            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, routing::get, Router};
    use tower::ServiceExt;

    fn app(hsts: bool) -> Router {
        Router::new()
            .route("/ping", get(|| async { "pong" }))
            .layer(SecurityHeadersLayer::new(hsts))
    }

    fn ping() -> Request {
        Request::builder().uri("/ping").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_headers_applied() {
        let response = app(false).oneshot(ping()).await.unwrap();
        let headers = response.headers();

        assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
        assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
        assert_eq!(headers.get("cache-control").unwrap(), "no-store");
        assert!(headers.get("content-security-policy").is_some());
        assert!(headers.get("permissions-policy").is_some());
        assert!(headers.get("strict-transport-security").is_none());
    }

    #[tokio::test]
    async fn test_hsts_in_production() {
        let response = app(true).oneshot(ping()).await.unwrap();

        assert_eq!(
            response.headers().get("strict-transport-security").unwrap(),
            HSTS
        );
    }
}
