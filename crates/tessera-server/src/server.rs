//! Development server: the publish directory over HTTP plus the live reload socket.

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Request, State,
    },
    handler::HandlerWithoutStateExt,
    http::{header, Method, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use tessera_build::reload::{CLIENT_SCRIPT_PATH, SOCKET_PATH};
use tessera_build::VisitedUrls;
use tokio::sync::broadcast;
use tower_http::services::ServeDir;

use crate::error::ServerError;
use crate::livereload::{client_script, ReloadHub, ReloadMessage};

/// Configuration for the development server.
#[derive(Debug, Clone)]
pub struct DevServerConfig {
    /// Directory the site is built into
    pub publish_dir: PathBuf,

    /// Port to listen on
    pub port: u16,

    /// Host to bind to
    pub host: String,

    /// Path the site is mounted under, from the base URL
    pub base_path: String,

    /// Open browser on start
    pub open: bool,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            publish_dir: PathBuf::from("public"),
            port: 1313,
            host: "127.0.0.1".to_string(),
            base_path: "/".to_string(),
            open: false,
        }
    }
}

#[derive(Clone)]
struct ServerState {
    hub: ReloadHub,
    visited: VisitedUrls,
}

/// Development server.
pub struct DevServer {
    config: DevServerConfig,
    state: ServerState,
}

impl DevServer {
    pub fn new(config: DevServerConfig, hub: ReloadHub, visited: VisitedUrls) -> Self {
        Self {
            config,
            state: ServerState { hub, visited },
        }
    }

    pub fn router(&self) -> Router {
        let not_found_page = self.config.publish_dir.join("404.html");
        let not_found = move || async move {
            match tokio::fs::read_to_string(&not_found_page).await {
                Ok(body) => (StatusCode::NOT_FOUND, Html(body)).into_response(),
                Err(_) => (StatusCode::NOT_FOUND, "404 page not found").into_response(),
            }
        };
        let files = ServeDir::new(&self.config.publish_dir).not_found_service(not_found.into_service());

        let base_path = self.config.base_path.trim_end_matches('/');
        let router = Router::new()
            .route(SOCKET_PATH, get(ws_handler))
            .route(CLIENT_SCRIPT_PATH, get(script_handler));
        let router = if base_path.is_empty() {
            router.fallback_service(files)
        } else {
            router.nest_service(base_path, files)
        };

        router
            .layer(middleware::from_fn_with_state(self.state.clone(), record_visit))
            .with_state(self.state.clone())
    }

    /// Serve until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|_| ServerError::Address(format!("{}:{}", self.config.host, self.config.port)))?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(addr, e))?;

        let url = format!("http://{}{}", addr, self.config.base_path);
        tracing::info!("Web Server is available at {} (bind address {})", url, self.config.host);
        tracing::info!("Press Ctrl+C to stop");

        if self.config.open {
            if let Err(e) = open::that(&url) {
                tracing::warn!("Failed to open browser: {}", e);
            }
        }

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(ServerError::Serve)
    }
}

/// URL to remember for fast render, if `path` is a page.
fn page_url(path: &str) -> Option<String> {
    if path.starts_with("/__livereload") {
        return None;
    }
    if let Some(dir) = path.strip_suffix("index.html") {
        return Some(dir.to_string());
    }
    if path.ends_with('/') || path.ends_with(".html") {
        return Some(path.to_string());
    }

    let last = path.rsplit('/').next().unwrap_or_default();
    if last.contains('.') {
        None
    } else {
        Some(format!("{path}/"))
    }
}

async fn record_visit(State(state): State<ServerState>, request: Request, next: Next) -> Response {
    if request.method() == Method::GET {
        if let Some(url) = page_url(request.uri().path()) {
            state.visited.insert(url);
        }
    }
    next.run(request).await
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state.hub))
}

async fn handle_ws(mut socket: WebSocket, hub: ReloadHub) {
    let mut rx = hub.subscribe();

    if send(&mut socket, &ReloadMessage::Hello).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => match result {
                Ok(msg) => {
                    if send(&mut socket, &msg).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Live reload client lagged by {} message(s)", skipped);
                }
            },
            result = socket.recv() => match result {
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }
}

async fn send(socket: &mut WebSocket, msg: &ReloadMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    socket.send(Message::Text(json.into())).await
}

async fn script_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        client_script(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    fn site() -> TempDir {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("posts/hello")).unwrap();
        fs::write(temp.path().join("posts/hello/index.html"), "<p>hello</p>").unwrap();
        fs::write(temp.path().join("404.html"), "<p>missing</p>").unwrap();
        fs::write(temp.path().join("site.css"), "body{}").unwrap();
        temp
    }

    fn server(publish_dir: &std::path::Path, base_path: &str) -> DevServer {
        DevServer::new(
            DevServerConfig {
                publish_dir: publish_dir.to_path_buf(),
                base_path: base_path.to_string(),
                ..Default::default()
            },
            ReloadHub::new(),
            VisitedUrls::new(),
        )
    }

    async fn get_path(router: Router, path: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(axum::http::Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn page_urls() {
        assert_eq!(page_url("/posts/hello/"), Some("/posts/hello/".into()));
        assert_eq!(page_url("/posts/hello/index.html"), Some("/posts/hello/".into()));
        assert_eq!(page_url("/posts/hello"), Some("/posts/hello/".into()));
        assert_eq!(page_url("/about.html"), Some("/about.html".into()));
        assert_eq!(page_url("/css/site.css"), None);
        assert_eq!(page_url("/__livereload.js"), None);
    }

    #[tokio::test]
    async fn serves_pages_and_records_visits() {
        let temp = site();
        let server = server(temp.path(), "/");
        let visited = server.state.visited.clone();

        let (status, body) = get_path(server.router(), "/posts/hello/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<p>hello</p>");
        assert!(visited.contains("/posts/hello/"));

        let (status, _) = get_path(server.router(), "/site.css").await;
        assert_eq!(status, StatusCode::OK);
        assert!(!visited.contains("/site.css"));
    }

    #[tokio::test]
    async fn missing_pages_use_the_404_page() {
        let temp = site();

        let (status, body) = get_path(server(temp.path(), "/").router(), "/nope/").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "<p>missing</p>");
    }

    #[tokio::test]
    async fn serves_the_client_script() {
        let temp = site();

        let (status, body) = get_path(server(temp.path(), "/").router(), CLIENT_SCRIPT_PATH).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("WebSocket"));
    }

    #[tokio::test]
    async fn site_is_mounted_under_the_base_path() {
        let temp = site();
        let server = server(temp.path(), "/docs/");

        let (status, body) = get_path(server.router(), "/docs/posts/hello/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<p>hello</p>");
        assert!(server.state.visited.contains("/docs/posts/hello/"));
    }
}
