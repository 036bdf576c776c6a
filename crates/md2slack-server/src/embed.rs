use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use rust_embed::Embed;

#[derive(Embed)]
#[folder = "$MD2SLACK_FRONTEND_DIST"]
struct FrontendAssets;

/// Serve embedded frontend assets. Paths without an extension fall back to
/// index.html for client-side routing; missing assets are a 404.
pub async fn static_handler(uri: axum::http::Uri) -> Response {
    let path = match uri.path().trim_start_matches('/') {
        "" => "index.html",
        p => p,
    };

    if let Some(content) = <FrontendAssets as Embed>::get(path) {
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        return (
            StatusCode::OK,
            [(header::CONTENT_TYPE, mime.as_ref())],
            content.data.to_vec(),
        )
            .into_response();
    }

    if !path.contains('.') {
        if let Some(content) = <FrontendAssets as Embed>::get("index.html") {
            return (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                content.data.to_vec(),
            )
                .into_response();
        }
    }

    (StatusCode::NOT_FOUND, "404 page not found").into_response()
}
