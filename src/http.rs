//! HTTP API for profile upload and retrieval
//!
//! Thin glue over [`ProfileStore`]:
//!
//! - `POST /` - store the raw request body, redirect to `/{name}/`
//! - `GET /{name}` - fetch the stored bytes
//! - `GET /` - JSON listing of recent profiles (`?n=` caps the count)
//! - `GET /health` - liveness probe
//!
//! TLS termination, HTML rendering, and the profile viewer all live outside
//! this process; both acquired listeners are served with the same handler.
//!
//! ## Example Usage
//!
//! ```bash
//! # Upload a profile
//! curl --data-binary @cpu.pprof http://localhost:8080/
//!
//! # Fetch it back
//! curl http://localhost:8080/4g/ > cpu.pprof
//!
//! # List the ten most recent uploads
//! curl 'http://localhost:8080/?n=10'
//! ```

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{header, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::store::ProfileStore;

/// Hard ceiling on `?n=`, independent of configuration.
const MAX_RECENT: u32 = 100;

/// HTTP server state shared across connections.
pub struct HttpServer {
    store: ProfileStore,
    /// Public domain used when echoing the profile URL back to uploaders.
    domain: String,
    max_upload_bytes: usize,
    default_recent: u32,
}

impl HttpServer {
    pub fn new(
        store: ProfileStore,
        domain: String,
        max_upload_bytes: usize,
        default_recent: u32,
    ) -> Self {
        Self {
            store,
            domain,
            max_upload_bytes,
            default_recent,
        }
    }

    /// Serve connections from `listener` until an accept error.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<(), Error> {
        info!(addr = %listener.local_addr()?, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(addr = %remote_addr, error = %err, "connection error");
                }
            });
        }
    }

    /// Route requests to handlers.
    async fn handle_request(
        &self,
        req: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, hyper::Error> {
        let path = req.uri().path().to_string();
        let method = req.method().clone();

        debug!(method = %method, path = %path, "incoming request");

        let result = match (method, path.as_str()) {
            (Method::GET, "/health") => self.handle_health(),
            (Method::GET, "/") | (Method::HEAD, "/") => self.handle_recent(&req),
            (Method::POST, "/") => self.handle_upload(req).await,
            (Method::GET, p) => match profile_name(p) {
                Some(name) => self.handle_fetch(name),
                None => Ok(not_found()),
            },
            _ => Ok(not_found()),
        };

        match result {
            Ok(response) => Ok(response),
            Err(err) => {
                let status = status_for(&err);
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    warn!(error = %err, "request failed");
                }
                Ok(Response::builder()
                    .status(status)
                    .body(Full::new(Bytes::from(format!("{}\n", err))))
                    .unwrap())
            }
        }
    }

    fn handle_health(&self) -> Result<Response<Full<Bytes>>, Error> {
        Ok(Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(r#"{"status":"ok"}"#)))
            .unwrap())
    }

    /// POST / - store the request body and redirect to the new profile.
    async fn handle_upload(&self, req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Error> {
        let body = Limited::new(req.into_body(), self.max_upload_bytes);
        let data = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) if err.is::<http_body_util::LengthLimitError>() => {
                return Ok(Response::builder()
                    .status(StatusCode::PAYLOAD_TOO_LARGE)
                    .body(Full::new(Bytes::from(format!(
                        "profile exceeds {} bytes\n",
                        self.max_upload_bytes
                    ))))
                    .unwrap());
            }
            Err(err) => {
                return Ok(Response::builder()
                    .status(StatusCode::BAD_REQUEST)
                    .body(Full::new(Bytes::from(format!("bad upload: {}\n", err))))
                    .unwrap());
            }
        };

        if data.is_empty() {
            return Ok(Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .body(Full::new(Bytes::from("empty profile upload\n")))
                .unwrap());
        }

        let name = self.store.save(&data)?;
        info!(name = %name, size = data.len(), "stored profile");

        Ok(Response::builder()
            .status(StatusCode::FOUND)
            .header(header::LOCATION, format!("/{}/", name))
            .body(Full::new(Bytes::from(format!(
                "https://{}/{}/\n",
                self.domain, name
            ))))
            .unwrap())
    }

    /// GET /{name} - the raw stored bytes.
    fn handle_fetch(&self, name: &str) -> Result<Response<Full<Bytes>>, Error> {
        let data = self.store.load(name)?;
        Ok(Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(Full::new(Bytes::from(data)))
            .unwrap())
    }

    /// GET / - JSON listing of recent profiles.
    fn handle_recent(&self, req: &Request<Incoming>) -> Result<Response<Full<Bytes>>, Error> {
        let n = recent_limit(req.uri().query(), self.default_recent);
        let entries = self.store.recent(n)?;
        let body = serde_json::to_string(&entries)
            .map_err(|e| Error::Config(format!("listing serialization: {}", e)))?;
        Ok(Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body)))
            .unwrap())
    }
}

fn not_found() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(Full::new(Bytes::from("not found\n")))
        .unwrap()
}

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Encoding(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Extract the profile name from a request path: a single non-empty segment,
/// with or without a trailing slash.
fn profile_name(path: &str) -> Option<&str> {
    let name = path.strip_prefix('/')?;
    let name = name.strip_suffix('/').unwrap_or(name);
    if name.is_empty() || name.contains('/') {
        return None;
    }
    Some(name)
}

/// Parse `?n=` off the query string, falling back to `default` and clamping
/// to [`MAX_RECENT`].
fn recent_limit(query: Option<&str>, default: u32) -> u32 {
    let requested = query
        .into_iter()
        .flat_map(|q| url::form_urlencoded::parse(q.as_bytes()))
        .find(|(key, _)| key == "n")
        .and_then(|(_, value)| value.parse::<u32>().ok())
        .unwrap_or(default);
    requested.min(MAX_RECENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_name_extraction() {
        assert_eq!(profile_name("/4g"), Some("4g"));
        assert_eq!(profile_name("/4g/"), Some("4g"));
        assert_eq!(profile_name("/"), None);
        assert_eq!(profile_name("/a/b"), None);
        assert_eq!(profile_name("/a/b/"), None);
    }

    #[test]
    fn test_recent_limit_parsing() {
        assert_eq!(recent_limit(None, 30), 30);
        assert_eq!(recent_limit(Some("n=5"), 30), 5);
        assert_eq!(recent_limit(Some("other=1&n=7"), 30), 7);
        assert_eq!(recent_limit(Some("n=bogus"), 30), 30);
        assert_eq!(recent_limit(Some("n=100000"), 30), MAX_RECENT);
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            status_for(&Error::Encoding("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&Error::NotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&Error::Listener("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_recent_entry_json_shape() {
        use crate::store::RecentEntry;
        let entry = RecentEntry {
            name: "4g".to_string(),
            size: 1234,
            created: chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        };
        let json = serde_json::to_value(vec![entry]).unwrap();
        assert_eq!(json[0]["name"], "4g");
        assert_eq!(json[0]["size"], 1234);
        assert!(json[0]["created"].is_string());
    }
}
