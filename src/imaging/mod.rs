pub mod fetch;
pub mod naming;
pub mod normalize;

pub use fetch::{DownloadError, FetchedImage, ImageFetcher};
pub use normalize::{NormalizeError, NormalizedImage};
