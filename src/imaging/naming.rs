use reqwest::Url;
use std::time::{SystemTime, UNIX_EPOCH};

const KNOWN_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp"];
const DEFAULT_EXTENSION: &str = ".jpg";

/// `{code}_{hash8}{ext}` for the current second.
///
/// Two saves of the same product within one second produce the same name.
pub fn name(product_code: &str, source_url: &str) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    name_at(product_code, source_url, now)
}

pub fn name_at(product_code: &str, source_url: &str, unix_secs: u64) -> String {
    let digest = md5::compute(format!("{product_code}{unix_secs}"));
    let hash = format!("{digest:x}");
    format!(
        "{}_{}{}",
        sanitize_code(product_code),
        &hash[..8],
        extension_for(source_url)
    )
}

/// Keeps alphanumerics, `-` and `_`.
pub fn sanitize_code(code: &str) -> String {
    code.chars()
        .filter(|ch| ch.is_alphanumeric() || matches!(ch, '-' | '_'))
        .collect()
}

pub fn extension_for(source_url: &str) -> &'static str {
    let path = match Url::parse(source_url) {
        Ok(url) => url.path().to_lowercase(),
        Err(_) => source_url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_lowercase(),
    };
    KNOWN_EXTENSIONS
        .iter()
        .find(|ext| path.ends_with(*ext))
        .copied()
        .unwrap_or(DEFAULT_EXTENSION)
}
