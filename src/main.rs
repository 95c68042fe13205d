//! Inkbook image REST server.
//!
//! Exposes the image storage subsystem over HTTP:
//! - serves stored image files at the same route their reference paths use,
//! - runs the extract (save) and inline (load) document transforms,
//! - publishes its OpenAPI description with a Swagger UI.
//!
//! Documents themselves are owned by the caller; this server only rewrites
//! them and owns the image files under `IMAGE_DATA_DIR`.

use axum::{
    extract::{Path as AxumPath, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use inkbook_images::{
    extract_images, inline_images, subtype_for_extension, ImageError, ImageStore, InlineWarning,
    Inlined, Scope,
};

/// Application state shared across handlers.
///
/// Holds the single `ImageStore` rooted at `IMAGE_DATA_DIR`.
#[derive(Clone)]
struct AppState {
    store: Arc<ImageStore>,
}

#[derive(serde::Serialize, utoipa::ToSchema)]
struct HealthRes {
    ok: bool,
    message: String,
}

/// Request body for both document transforms.
#[derive(serde::Deserialize, utoipa::ToSchema)]
struct DocumentReq {
    /// The document tree to transform. Any JSON shape is accepted.
    #[schema(value_type = Object)]
    document: serde_json::Value,
}

#[derive(serde::Serialize, utoipa::ToSchema)]
struct ExtractRes {
    /// The document with inline images replaced by reference paths.
    #[schema(value_type = Object)]
    document: serde_json::Value,
}

#[derive(serde::Serialize, utoipa::ToSchema)]
struct InlineRes {
    /// The document with this scope's reference paths replaced by inline images.
    #[schema(value_type = Object)]
    document: serde_json::Value,
    /// One entry per reference that could not be resolved and was left in
    /// place, as `{ "reference": ..., "reason": ... }` objects.
    #[schema(value_type = Vec<Object>)]
    warnings: Vec<InlineWarning>,
}

#[derive(OpenApi)]
#[openapi(
    paths(health, serve_image, extract, inline),
    components(schemas(HealthRes, DocumentReq, ExtractRes, InlineRes))
)]
struct ApiDoc;

/// Main entry point for the inkbook image server.
///
/// # Environment Variables
/// - `INKBOOK_REST_ADDR`: server address (default: "0.0.0.0:3000")
/// - `IMAGE_DATA_DIR`: root directory for stored images (default: "./image_data")
///
/// # Errors
/// Returns an error if the tracing configuration cannot be initialised, the
/// address cannot be bound, or the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("inkbook=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("INKBOOK_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let image_data_dir = std::env::var("IMAGE_DATA_DIR").unwrap_or_else(|_| "./image_data".into());

    tracing::info!("-- Starting inkbook image server on {}", addr);
    tracing::info!("-- Storing images under {}", image_data_dir);

    let state = AppState {
        store: Arc::new(ImageStore::new(image_data_dir)),
    };

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/images/:user_id/:book_id/:filename", get(serve_image))
        .route("/api/images/:user_id/:book_id/extract", post(extract))
        .route("/api/images/:user_id/:book_id/inline", post(inline))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Health check response", body = HealthRes))
)]
async fn health() -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "inkbook is alive".into(),
    })
}

#[utoipa::path(
    get,
    path = "/api/images/{user_id}/{book_id}/{filename}",
    params(
        ("user_id" = String, Path, description = "Owner of the book"),
        ("book_id" = String, Path, description = "Book the image belongs to"),
        ("filename" = String, Path, description = "Content-addressed filename"),
    ),
    responses(
        (status = 200, description = "Raw image bytes"),
        (status = 400, description = "Unsafe identifier or filename"),
        (status = 404, description = "No such image in this scope"),
        (status = 500, description = "Internal server error"),
    )
)]
/// Serves a stored image file.
///
/// This is the route that reference paths written into documents point at, so
/// a document holding `/api/images/u1/b1/<hash>.png` renders directly against
/// this server.
async fn serve_image(
    State(state): State<AppState>,
    AxumPath((user_id, book_id, filename)): AxumPath<(String, String, String)>,
) -> Result<impl IntoResponse, (StatusCode, &'static str)> {
    let scope =
        Scope::new(user_id, book_id).map_err(|_| (StatusCode::BAD_REQUEST, "invalid scope"))?;

    match state.store.read(&scope, &filename) {
        Ok(bytes) => Ok(([(header::CONTENT_TYPE, content_type_for(&filename))], bytes)),
        Err(ImageError::InvalidIdentifier(_)) => Err((StatusCode::BAD_REQUEST, "invalid filename")),
        Err(ImageError::FileRead { ref source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            Err((StatusCode::NOT_FOUND, "image not found"))
        }
        Err(err) => {
            tracing::error!("failed to serve image: {err}");
            Err((StatusCode::INTERNAL_SERVER_ERROR, "internal error"))
        }
    }
}

/// Content type for a stored filename, derived from its extension the same
/// way the inline transform derives the data-URL subtype.
fn content_type_for(filename: &str) -> String {
    match Path::new(filename).extension().and_then(|ext| ext.to_str()) {
        Some(extension) => format!("image/{}", subtype_for_extension(extension)),
        None => "application/octet-stream".into(),
    }
}

#[utoipa::path(
    post,
    path = "/api/images/{user_id}/{book_id}/extract",
    params(
        ("user_id" = String, Path, description = "Owner of the book"),
        ("book_id" = String, Path, description = "Book the images belong to"),
    ),
    request_body = DocumentReq,
    responses(
        (status = 200, description = "Document with inline images extracted", body = ExtractRes),
        (status = 400, description = "Unsafe scope identifiers"),
        (status = 422, description = "Malformed inline image data"),
        (status = 500, description = "Storage failure"),
    )
)]
/// Runs the save transform: stores every inline image in the document and
/// rewrites its `src` to a reference path.
async fn extract(
    State(state): State<AppState>,
    AxumPath((user_id, book_id)): AxumPath<(String, String)>,
    Json(req): Json<DocumentReq>,
) -> Result<Json<ExtractRes>, (StatusCode, &'static str)> {
    let scope =
        Scope::new(user_id, book_id).map_err(|_| (StatusCode::BAD_REQUEST, "invalid scope"))?;

    match extract_images(&state.store, &scope, &req.document) {
        Ok(document) => Ok(Json(ExtractRes { document })),
        Err(err @ (ImageError::MalformedDataUrl(_) | ImageError::PayloadDecode(_))) => {
            tracing::warn!("rejected document with malformed inline image: {err}");
            Err((StatusCode::UNPROCESSABLE_ENTITY, "malformed inline image"))
        }
        Err(err) => {
            tracing::error!("image extraction failed: {err}");
            Err((StatusCode::INTERNAL_SERVER_ERROR, "internal error"))
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/images/{user_id}/{book_id}/inline",
    params(
        ("user_id" = String, Path, description = "Owner of the book"),
        ("book_id" = String, Path, description = "Book the images belong to"),
    ),
    request_body = DocumentReq,
    responses(
        (status = 200, description = "Document with stored images inlined", body = InlineRes),
        (status = 400, description = "Unsafe scope identifiers"),
    )
)]
/// Runs the load transform: replaces this scope's reference paths with
/// inline images. Unresolvable references are left in place and reported in
/// `warnings` rather than failing the request.
async fn inline(
    State(state): State<AppState>,
    AxumPath((user_id, book_id)): AxumPath<(String, String)>,
    Json(req): Json<DocumentReq>,
) -> Result<Json<InlineRes>, (StatusCode, &'static str)> {
    let scope =
        Scope::new(user_id, book_id).map_err(|_| (StatusCode::BAD_REQUEST, "invalid scope"))?;

    let Inlined { document, warnings } = inline_images(&state.store, &scope, &req.document);

    Ok(Json(InlineRes { document, warnings }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    // Router construction panics on conflicting or duplicate routes, so
    // building it covers the Swagger UI merge alongside the image routes.
    #[test]
    fn router_mounts_all_routes() {
        let temp = TempDir::new().unwrap();
        let state = AppState {
            store: Arc::new(ImageStore::new(temp.path())),
        };

        let _app = router(state);
    }

    #[test]
    fn openapi_document_includes_swagger_served_paths() {
        let doc = ApiDoc::openapi();

        assert!(doc.paths.paths.contains_key("/health"));
        assert!(doc
            .paths
            .paths
            .contains_key("/api/images/{user_id}/{book_id}/{filename}"));
        assert!(doc
            .paths
            .paths
            .contains_key("/api/images/{user_id}/{book_id}/extract"));
        assert!(doc
            .paths
            .paths
            .contains_key("/api/images/{user_id}/{book_id}/inline"));
    }
}
