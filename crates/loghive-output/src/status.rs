//! HTTP status server
//!
//! Serves a dashboard of the ingestion model at `/` and a listing of a
//! token's log files at `/logs?token=<t>[&type=<ty>]`.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use loghive_core::config::StatusConfig;
use loghive_core::record::path_segment;
use loghive_core::{format_uptime, ConnectionGauge, IngestionModel, LogHiveError};
use serde::Deserialize;
use std::convert::Infallible;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};
use walkdir::WalkDir;

use crate::registry::SinkRegistry;

const HTML: &str = "text/html; charset=utf-8";
const TEXT: &str = "text/plain; charset=utf-8";

/// Everything the status pages read
pub struct StatusState {
    pub instance_name: String,
    pub model: Arc<IngestionModel>,
    pub registry: Arc<SinkRegistry>,
    pub gauge: ConnectionGauge,
}

/// HTTP server for the status pages
pub struct StatusServer {
    config: StatusConfig,
    state: Arc<StatusState>,
}

impl StatusServer {
    /// Create a new status server
    pub fn new(config: StatusConfig, state: Arc<StatusState>) -> Self {
        Self { config, state }
    }

    /// Bind the configured address and serve until the task is dropped
    pub async fn run(&self) -> Result<(), LogHiveError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| LogHiveError::Status(format!("Failed to bind {}: {}", addr, e)))?;

        info!(address = %addr, "Status server started");
        self.serve(listener).await
    }

    /// Serve requests on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<(), LogHiveError> {
        loop {
            let stream = match listener.accept().await {
                Ok((stream, _)) => stream,
                Err(e) => {
                    error!(error = %e, "Failed to accept status connection");
                    continue;
                }
            };

            let io = TokioIo::new(stream);
            let state = Arc::clone(&self.state);

            tokio::spawn(async move {
                let service = service_fn(|req: Request<hyper::body::Incoming>| {
                    let state = Arc::clone(&state);
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    async move {
                        // Pages sample the host and walk the logs tree
                        let page = tokio::task::spawn_blocking(move || route(&method, &uri, &state))
                            .await
                            .unwrap_or_else(|e| {
                                error!(error = %e, "Status page panicked");
                                response(
                                    StatusCode::INTERNAL_SERVER_ERROR,
                                    TEXT,
                                    "Internal Server Error".to_string(),
                                )
                            });
                        Ok::<_, Infallible>(page)
                    }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!(error = %err, "Error serving connection");
                }
            });
        }
    }
}

/// Dispatch a request to its page
fn route(method: &Method, uri: &Uri, state: &StatusState) -> Response<Full<Bytes>> {
    debug!(method = %method, path = %uri.path(), "Status request");

    if method != Method::GET && method != Method::HEAD {
        return response(StatusCode::METHOD_NOT_ALLOWED, TEXT, "Method Not Allowed".to_string());
    }

    match uri.path() {
        "/" => response(StatusCode::OK, HTML, render_dashboard(state)),
        "/logs" | "/logs/" => render_logs(uri.query(), state.registry.root()),
        "/health" | "/healthz" => response(StatusCode::OK, TEXT, "OK".to_string()),
        _ => response(StatusCode::NOT_FOUND, TEXT, "Not Found".to_string()),
    }
}

fn response(status: StatusCode, content_type: &'static str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn render_dashboard(state: &StatusState) -> String {
    let snapshot = state.model.snapshot();
    let resources = state.model.resources();

    let or_na = |value: Option<String>| value.unwrap_or_else(|| "n/a".to_string());
    let cpu = or_na(resources.cpu_percent.map(|cpu| format!("{:.1}%", cpu)));
    let memory = or_na(resources.memory_bytes.map(|bytes| bytes.to_string()));
    let disk_read = or_na(resources.disk_io.map(|io| format!("{} ms", io.read_ms)));
    let disk_write = or_na(resources.disk_io.map(|io| format!("{} ms", io.write_ms)));

    let mut rows = String::new();
    for payload in &snapshot.window {
        let _ = writeln!(rows, "<tr><td><pre>{}</pre></td></tr>", escape_html(payload));
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{name} status</title></head>
<body>
<h2>{name}</h2>
<table border="1">
<tr><th>Start time</th><td>{started}</td></tr>
<tr><th>Uptime</th><td>{uptime}</td></tr>
<tr><th>Records ingested</th><td>{total}</td></tr>
<tr><th>Incoming rate</th><td>{rate:.2} records/s</td></tr>
<tr><th>Active connections</th><td>{active}</td></tr>
<tr><th>Connections accepted</th><td>{accepted}</td></tr>
<tr><th>Open sinks</th><td>{sinks}</td></tr>
<tr><th>CPU usage</th><td>{cpu}</td></tr>
<tr><th>Memory usage (bytes)</th><td>{memory}</td></tr>
<tr><th>Disk read time</th><td>{disk_read}</td></tr>
<tr><th>Disk write time</th><td>{disk_write}</td></tr>
</table>
<h3>Last {capacity} records</h3>
<table border="1">
{rows}</table>
</body>
</html>
"#,
        name = escape_html(&state.instance_name),
        started = snapshot.started_at.format("%Y-%m-%d %H:%M:%S"),
        uptime = format_uptime(snapshot.uptime),
        total = snapshot.total,
        rate = snapshot.rate,
        active = state.gauge.active(),
        accepted = state.gauge.total(),
        sinks = state.registry.len(),
        capacity = state.model.capacity(),
    )
}

#[derive(Debug, Default, Deserialize)]
struct LogsQuery {
    token: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

fn render_logs(query: Option<&str>, root: &Path) -> Response<Full<Bytes>> {
    let page = |status, message: &str| response(status, HTML, logs_page(message));

    let query: LogsQuery = match serde_urlencoded::from_str(query.unwrap_or("")) {
        Ok(query) => query,
        Err(e) => {
            debug!(error = %e, "Invalid logs query");
            return page(StatusCode::BAD_REQUEST, "<h3>invalid query</h3>");
        }
    };

    let Some(token) = query.token.filter(|t| !t.is_empty()) else {
        return page(StatusCode::UNAUTHORIZED, "<h3>token not included</h3>");
    };
    let kind = query.kind.filter(|k| !k.is_empty());

    let token_dir = match path_segment("token", &token) {
        Ok(segment) => root.join(segment),
        Err(_) => return page(StatusCode::NOT_FOUND, "<h3>token not found</h3>"),
    };
    if !token_dir.is_dir() {
        return page(StatusCode::NOT_FOUND, "<h3>token not found</h3>");
    }

    let search_dir = match kind.as_deref() {
        Some(kind) => match path_segment("type", kind) {
            Ok(segment) if token_dir.join(segment).is_dir() => token_dir.join(segment),
            _ => return page(StatusCode::NOT_FOUND, "<h3>type not found</h3>"),
        },
        None => token_dir,
    };

    let mut rows = String::new();
    for path in list_log_files(root, &search_dir) {
        let _ = writeln!(rows, "<tr><td>{}</td></tr>", escape_html(&path));
    }

    page(
        StatusCode::OK,
        &format!("<h3>Your logs:</h3><table border=\"1\">{}</table>", rows),
    )
}

fn logs_page(body: &str) -> String {
    format!("<html><body>{}</body></html>", body)
}

/// Files under `dir`, as sorted paths relative to `root`
fn list_log_files(root: &Path, dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/")
        })
        .collect();
    files.sort();
    files
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
