use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub image_path: Option<String>,
    pub has_image: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An unverified reference to a possible product photo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageCandidate {
    pub url: String,
    pub title: String,
    pub source: String,
    pub search_term: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductQuery {
    #[serde(default)]
    pub q: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub search_term: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub product: Product,
    pub search_term: String,
    pub images: Vec<ImageCandidate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateImageRequest {
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpdateImageResponse {
    pub success: bool,
    pub message: String,
    pub image_path: String,
    pub stages: Vec<StageReport>,
}

#[derive(Debug, Serialize)]
pub struct CatalogStats {
    pub total_products: i64,
    pub products_with_images: i64,
    pub products_without_images: i64,
    pub completion_percentage: f64,
    pub recent_products: Vec<Product>,
    pub products_needing_images: Vec<Product>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredImageInfo {
    pub path: String,
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub file_size: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StageReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
