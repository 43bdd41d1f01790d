pub mod retriever;
pub mod terms;

use crate::models::ImageCandidate;
pub use retriever::{CandidateSource, PlaceholderSource};

/// Expands `term` and retrieves candidates for the resulting phrases.
pub fn search(source: &dyn CandidateSource, term: &str, max_results: usize) -> Vec<ImageCandidate> {
    let phrases = terms::expand(term);
    retriever::retrieve(source, &phrases, max_results)
}
