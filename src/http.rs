use crate::config::{HttpConfig, USER_AGENT};
use reqwest::Client;

/// Builds the single outbound client shared by every download.
pub fn build_client(cfg: HttpConfig) -> Client {
    Client::builder()
        .timeout(cfg.timeout)
        .connect_timeout(cfg.connect_timeout)
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|_| Client::new())
}
