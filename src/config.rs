use std::{env, path::PathBuf, time::Duration};

/// Hard ceiling on a downloaded image, declared or streamed.
pub const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;

/// Quality used for every stored JPEG.
pub const JPEG_QUALITY: u8 = 85;

pub const USER_AGENT: &str = "Mozilla/5.0 (compatible; shelfshot/0.1; +https://github.com/shelfshot)";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_path: PathBuf,
    pub upload_root: PathBuf,
    pub image_size: u32,
    pub max_search_results: usize,
    pub http: HttpConfig,
    pub request_max_bytes: usize,
    pub seed_sample_products: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PORT").unwrap_or(5000),
            database_path: env::var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("database/products.db")),
            upload_root: env::var("UPLOAD_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("uploads")),
            image_size: env_parse::<u32>("IMAGE_SIZE")
                .filter(|v| *v > 0)
                .unwrap_or(500),
            max_search_results: env_parse::<usize>("MAX_SEARCH_RESULTS")
                .filter(|v| *v > 0)
                .unwrap_or(20),
            http: HttpConfig {
                timeout: Duration::from_secs(
                    env_parse::<u64>("HTTP_TIMEOUT_SECS")
                        .filter(|v| *v > 0)
                        .unwrap_or(30),
                ),
                connect_timeout: Duration::from_secs(
                    env_parse::<u64>("HTTP_CONNECT_TIMEOUT_SECS")
                        .filter(|v| *v > 0)
                        .unwrap_or(5),
                ),
            },
            request_max_bytes: env_parse::<usize>("REQUEST_MAX_BYTES")
                .filter(|v| *v > 0)
                .unwrap_or(256 * 1024),
            seed_sample_products: parse_env_bool("SEED_SAMPLE_PRODUCTS"),
        }
    }

    pub fn target_size(&self) -> (u32, u32) {
        (self.image_size, self.image_size)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn parse_env_bool(key: &str) -> bool {
    match env::var(key) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}
