mod config;
mod http;
mod imaging;
mod metrics;
mod models;
mod pipeline;
mod search;
mod store;
#[cfg(test)]
mod test_util;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use config::AppConfig;
use imaging::ImageFetcher;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{
    ApiError, CatalogStats, CreateProductRequest, Product, ProductQuery, SearchRequest,
    SearchResponse, StoredImageInfo, UpdateImageRequest, UpdateImageResponse,
};
use pipeline::{ImageProcessingError, Pipeline, PipelineConfig};
use search::{CandidateSource, PlaceholderSource};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use store::{ProductStore, StoreError};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

const RECENT_LIMIT: usize = 5;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "shelfshot.api", "server crashed: {err}");
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env();
    let store = ProductStore::open(&config.database_path)?;
    if config.seed_sample_products {
        store.seed_samples()?;
    }

    let client = http::build_client(config.http);
    let pipeline = Pipeline::new(
        PipelineConfig {
            upload_root: config.upload_root.clone(),
            target_size: config.target_size(),
        },
        ImageFetcher::new(client),
    );
    let prometheus_handle = PrometheusBuilder::new().install_recorder()?;

    let port = config.port;
    let state = AppState {
        store: Arc::new(store),
        pipeline,
        images: Arc::new(PlaceholderSource::default()),
        openapi: Arc::new(load_openapi()),
        prometheus_handle,
        config: Arc::new(config),
    };
    let app = router(state);

    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(target = "shelfshot.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    store: Arc<ProductStore>,
    pipeline: Pipeline,
    images: Arc<dyn CandidateSource>,
    config: Arc<AppConfig>,
    openapi: Arc<serde_json::Value>,
    prometheus_handle: PrometheusHandle,
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);
    let uploads = ServeDir::new(&state.config.upload_root);
    let body_limit = state.config.request_max_bytes;

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/openapi.json", get(openapi_json))
        .route("/stats", get(stats))
        .route("/products", get(list_products).post(create_product))
        .route("/products/without-images", get(products_without_images))
        .route("/products/{id}", get(get_product).delete(delete_product))
        .route(
            "/products/{id}/search",
            get(search_product_images).post(search_product_images_with_term),
        )
        .route("/products/{id}/update-image", post(update_product_image))
        .route("/products/{id}/image", get(product_image_info))
        .nest_service("/uploads", uploads)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit))
}

fn load_openapi() -> serde_json::Value {
    serde_yaml::from_str(include_str!("../docs/openapi.yaml"))
        .unwrap_or(json!({"openapi": "3.0.3"}))
}

/// Health and readiness check.
///
/// Returns a small JSON payload with `status` and `service`.
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "shelfshot",
    }))
}

async fn openapi_json(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json((*state.openapi).clone())
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        [("Content-Type", "text/plain; version=0.0.4")],
        state.prometheus_handle.render(),
    )
}

/// Catalog completion summary.
async fn stats(State(state): State<AppState>) -> Result<Json<CatalogStats>, AppError> {
    crate::metrics::inc_requests("/stats");
    let total = state.store.count()?;
    let with_images = state.store.count_with_image()?;
    let completion = if total > 0 {
        (with_images as f64 / total as f64 * 1000.0).round() / 10.0
    } else {
        0.0
    };
    let mut needing = state.store.list_without_image()?;
    needing.truncate(RECENT_LIMIT);

    Ok(Json(CatalogStats {
        total_products: total,
        products_with_images: with_images,
        products_without_images: total - with_images,
        completion_percentage: completion,
        recent_products: state.store.recent(RECENT_LIMIT)?,
        products_needing_images: needing,
    }))
}

async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<Vec<Product>>, AppError> {
    crate::metrics::inc_requests("/products");
    let products = match query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        Some(term) => state.store.search(term)?,
        None => state.store.list()?,
    };
    Ok(Json(products))
}

async fn create_product(
    State(state): State<AppState>,
    Json(payload): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    crate::metrics::inc_requests("/products:create");
    let name = payload.name.trim();
    let code = payload.code.trim();
    if name.is_empty() || code.is_empty() {
        return Err(AppError::BadRequest("Product name and code are required".into()));
    }
    let product = state.store.create(name, code)?;
    info!(target = "shelfshot.api", id = product.id, code = %product.code, "product_created");
    Ok((StatusCode::CREATED, Json(product)))
}

async fn products_without_images(
    State(state): State<AppState>,
) -> Result<Json<Vec<Product>>, AppError> {
    crate::metrics::inc_requests("/products/without-images");
    Ok(Json(state.store.list_without_image()?))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Product>, AppError> {
    Ok(Json(find_product(&state, id)?))
}

/// Removes the catalog row. Any stored image stays under the upload root.
async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    crate::metrics::inc_requests("/products:delete");
    if state.store.delete(id)? {
        info!(target = "shelfshot.api", id, "product_deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("Product not found".into()))
    }
}

/// Candidate images for the product's own name.
async fn search_product_images(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SearchResponse>, AppError> {
    crate::metrics::inc_requests("/products/search");
    let product = find_product(&state, id)?;
    let term = product.name.clone();
    Ok(Json(run_search(&state, product, term)))
}

/// Candidate images for an explicit term. A blank or absent term falls back
/// to the product name.
async fn search_product_images_with_term(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<SearchResponse>, AppError> {
    crate::metrics::inc_requests("/products/search:term");
    let request: SearchRequest = if body.iter().all(u8::is_ascii_whitespace) {
        SearchRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| AppError::BadRequest(format!("Invalid search body: {err}")))?
    };
    let product = find_product(&state, id)?;
    let term = request
        .search_term
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| product.name.clone());
    Ok(Json(run_search(&state, product, term)))
}

fn run_search(state: &AppState, product: Product, term: String) -> SearchResponse {
    let images = search::search(
        state.images.as_ref(),
        &term,
        state.config.max_search_results,
    );
    crate::metrics::candidates_returned(images.len());
    SearchResponse {
        product,
        search_term: term,
        images,
    }
}

/// Downloads the chosen candidate, normalizes it and records it on the product.
///
/// - Body: `UpdateImageRequest`
/// - Response: `UpdateImageResponse` with the per-stage transcript
async fn update_product_image(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateImageRequest>,
) -> Result<Json<UpdateImageResponse>, AppError> {
    crate::metrics::inc_requests("/products/update-image");
    let Some(image_url) = payload
        .image_url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
    else {
        return Err(AppError::BadRequest("Image URL is required".into()));
    };
    let product = find_product(&state, id)?;

    let saved = state
        .pipeline
        .save_image_for_product(&image_url, &product.code)
        .await?;
    let path = saved.image.relative_path;
    if state.store.update_image(product.id, &path)?.is_none() {
        warn!(target = "shelfshot.api", id, path = %path, "product removed during image update");
        return Err(AppError::NotFound("Product not found".into()));
    }

    Ok(Json(UpdateImageResponse {
        success: true,
        message: "Image updated successfully".into(),
        image_path: path,
        stages: saved.stages,
    }))
}

async fn product_image_info(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<StoredImageInfo>, AppError> {
    let product = find_product(&state, id)?;
    let Some(path) = product.image_path else {
        return Err(AppError::NotFound("Product has no image".into()));
    };
    match state.pipeline.inspect_stored(&path).await {
        Ok(info) => Ok(Json(info)),
        Err(err) => {
            warn!(target = "shelfshot.api", id, path = %path, error = %err.detail(), "stored image unreadable");
            Err(AppError::NotFound("Stored image not found".into()))
        }
    }
}

fn find_product(state: &AppState, id: i64) -> Result<Product, AppError> {
    state
        .store
        .get(id)?
        .ok_or_else(|| AppError::NotFound("Product not found".into()))
}

#[derive(Debug)]
enum AppError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Pipeline(ImageProcessingError),
    Store(StoreError),
}

impl From<ImageProcessingError> for AppError {
    fn from(value: ImageProcessingError) -> Self {
        Self::Pipeline(value)
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::DuplicateCode(code) => {
                Self::Conflict(format!("Product code already exists: {code}"))
            }
            other => Self::Store(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, payload) = match self {
            AppError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                ApiError {
                    error: message,
                    detail: None,
                },
            ),
            AppError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    error: message,
                    detail: None,
                },
            ),
            AppError::Conflict(message) => (
                StatusCode::CONFLICT,
                ApiError {
                    error: message,
                    detail: None,
                },
            ),
            AppError::Pipeline(err) => {
                error!(target = "shelfshot.api", stage = err.stage(), error = %err.detail(), "image update failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: err.to_string(),
                        detail: Some(err.stage().to_string()),
                    },
                )
            }
            AppError::Store(err) => {
                error!(target = "shelfshot.api", error = %err, "store failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: "store".into(),
                        detail: Some(err.to_string()),
                    },
                )
            }
        };
        (status, Json(payload)).into_response()
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}
