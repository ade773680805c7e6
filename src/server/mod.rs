use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::{Path as UrlPath, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use notify::{Event, RecursiveMode, Watcher};
use tower_livereload::LiveReloadLayer;

use crate::config::ShimConfig;
use crate::runtime::{wrap_host_page, PageOptions};

pub(crate) mod util;

/// What the dev server hosts.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// External module build output (`client.js`, `client.wasm`, ...), served at `/game/`.
    pub assets_dir: PathBuf,
    /// wasm-pack output for this crate, served at `/pkg/`.
    pub pkg_dir: PathBuf,
    pub config: ShimConfig,
    pub page: PageOptions,
}

struct DevState {
    options: ServeOptions,
}

/// Routes without live reload.
pub fn router(options: ServeOptions) -> Router {
    let state = Arc::new(DevState { options });
    Router::new()
        .route("/", get(serve_page))
        .route("/shim.json", get(serve_config))
        .route("/pkg/{*path}", get(serve_pkg))
        .route("/game/{*path}", get(serve_game))
        .with_state(state)
}

/// Start the dev server; pages reload whenever the module's assets change.
pub async fn run_dev_server(
    options: ServeOptions,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let livereload = LiveReloadLayer::new();
    let reloader = livereload.reloader();

    let watch_dir = options.assets_dir.clone();
    let mut watcher = notify::recommended_watcher(move |res: Result<Event, _>| {
        if let Ok(event) = res {
            if event.kind.is_modify() || event.kind.is_create() {
                tracing::debug!(paths = ?event.paths, "module assets changed, reloading");
                reloader.reload();
            }
        }
    })?;
    watcher.watch(&watch_dir, RecursiveMode::Recursive)?;

    let module_src = options.config.module_src.clone();
    let pkg_dir = options.pkg_dir.clone();
    let app = router(options).layer(livereload);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    eprintln!("game-shim dev server");
    eprintln!("  page:    http://localhost:{port}/");
    eprintln!("  module:  http://localhost:{port}{module_src}");
    eprintln!("  assets:  {}", watch_dir.display());
    eprintln!("  pkg:     {}", pkg_dir.display());
    eprintln!("  watching for changes...");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;

    // Keep watcher alive
    drop(watcher);
    Ok(())
}

// ── Route handlers ────────────────────────────────────────────────────

async fn serve_page(State(state): State<Arc<DevState>>) -> Response {
    match wrap_host_page(&state.options.config, &state.options.page) {
        Ok(page) => Html(page).into_response(),
        Err(e) => {
            tracing::error!("failed to build host page: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("page error: {e}")).into_response()
        }
    }
}

async fn serve_config(State(state): State<Arc<DevState>>) -> axum::Json<ShimConfig> {
    axum::Json(state.options.config.clone())
}

async fn serve_pkg(State(state): State<Arc<DevState>>, UrlPath(path): UrlPath<String>) -> Response {
    serve_file(&state.options.pkg_dir, &path).await
}

async fn serve_game(
    State(state): State<Arc<DevState>>,
    UrlPath(path): UrlPath<String>,
) -> Response {
    serve_file(&state.options.assets_dir, &path).await
}

async fn serve_file(root: &Path, rel: &str) -> Response {
    let Some(path) = util::resolve_asset(root, rel) else {
        return (StatusCode::BAD_REQUEST, "invalid asset path").into_response();
    };

    let is_file = tokio::fs::metadata(&path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);
    if !is_file {
        tracing::debug!(path = %path.display(), "asset not found");
        return (StatusCode::NOT_FOUND, format!("not found: {rel}")).into_response();
    }

    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, util::content_type(&path)),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(path = %path.display(), "cannot read asset: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("read error: {e}")).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;

    fn options(root: &Path) -> ServeOptions {
        ServeOptions {
            assets_dir: root.join("game"),
            pkg_dir: root.join("pkg"),
            config: ShimConfig::default(),
            page: PageOptions::default(),
        }
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, content_type, body.to_vec())
    }

    #[tokio::test]
    async fn serves_page_and_config() {
        let tmp = tempfile::tempdir().unwrap();
        let app = router(options(tmp.path()));

        let (status, content_type, body) = get(app.clone(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(content_type.unwrap().starts_with("text/html"));
        assert!(String::from_utf8(body).unwrap().contains(r#"<canvas id="canvas""#));

        let (status, _, body) = get(app, "/shim.json").await;
        assert_eq!(status, StatusCode::OK);
        let config: ShimConfig = serde_json::from_slice(&body).unwrap();
        assert_eq!(config, ShimConfig::default());
    }

    #[tokio::test]
    async fn serves_module_assets_with_content_types() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("game")).unwrap();
        std::fs::create_dir_all(tmp.path().join("pkg")).unwrap();
        std::fs::write(tmp.path().join("game/client.js"), b"var Module;").unwrap();
        std::fs::write(tmp.path().join("game/client.wasm"), b"\0asm").unwrap();
        std::fs::write(tmp.path().join("pkg/game_shim.js"), b"export default 1;").unwrap();
        let app = router(options(tmp.path()));

        let (status, content_type, body) = get(app.clone(), "/game/client.js").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("text/javascript; charset=utf-8"));
        assert_eq!(body, b"var Module;");

        let (status, content_type, _) = get(app.clone(), "/game/client.wasm").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("application/wasm"));

        let (status, _, _) = get(app, "/pkg/game_shim.js").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_and_escaping_paths() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("game/sub")).unwrap();
        std::fs::write(tmp.path().join("secret.txt"), b"nope").unwrap();
        let app = router(options(tmp.path()));

        let (status, _, _) = get(app.clone(), "/game/client.js").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, _) = get(app.clone(), "/game/sub").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, _) = get(app, "/game/%2E%2E/secret.txt").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
