use crate::models::ImageCandidate;
use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::{debug, warn};

/// Most candidates a single phrase may contribute.
pub const SLOTS_PER_PHRASE: usize = 5;

/// Resolution baked into every placeholder URL.
pub const PLACEHOLDER_SIZE: u32 = 500;

pub const PLACEHOLDER_SOURCE: &str = "Picsum Photos";

/// Seed offsets nudging each product family towards a different placeholder set.
const CATEGORY_OFFSETS: &[(&[&str], u64)] = &[
    (&["phone", "iphone"], 1000),
    (&["headphone", "earphone"], 2000),
    (&["case"], 3000),
    (&["cable", "wire"], 4000),
    (&["stand"], 5000),
    (&["mouse"], 6000),
];

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("source `{source_name}` failed: {message}")]
    Source {
        source_name: &'static str,
        message: String,
    },
}

/// Anything able to turn one phrase into a bounded list of candidates.
pub trait CandidateSource: Send + Sync {
    fn name(&self) -> &'static str;

    fn candidates_for(
        &self,
        phrase: &str,
        limit: usize,
    ) -> Result<Vec<ImageCandidate>, RetrievalError>;
}

/// Deterministic placeholder provider: no network, URLs derived from the phrase.
#[derive(Debug, Clone, Copy)]
pub struct PlaceholderSource {
    size: u32,
}

impl Default for PlaceholderSource {
    fn default() -> Self {
        Self {
            size: PLACEHOLDER_SIZE,
        }
    }
}

impl CandidateSource for PlaceholderSource {
    fn name(&self) -> &'static str {
        "placeholder"
    }

    fn candidates_for(
        &self,
        phrase: &str,
        limit: usize,
    ) -> Result<Vec<ImageCandidate>, RetrievalError> {
        let base = phrase_seed(phrase);
        let offset = category_offset(phrase);
        let candidates = (0..limit.min(SLOTS_PER_PHRASE))
            .map(|slot| {
                let seed = base + slot as u64 * 100 + offset;
                ImageCandidate {
                    url: format!(
                        "https://picsum.photos/{size}/{size}?random={seed}",
                        size = self.size
                    ),
                    title: format!("{phrase} - Product Image {}", slot + 1),
                    source: PLACEHOLDER_SOURCE.to_string(),
                    search_term: phrase.to_string(),
                }
            })
            .collect();
        Ok(candidates)
    }
}

/// Collects candidates for every phrase, shuffles them and keeps at most
/// `max_results`. Source failures are logged and yield an empty list.
pub fn retrieve(
    source: &dyn CandidateSource,
    phrases: &[String],
    max_results: usize,
) -> Vec<ImageCandidate> {
    match collect(source, phrases, max_results) {
        Ok(candidates) => candidates,
        Err(err) => {
            warn!(target = "shelfshot.search", source = source.name(), error = %err, "candidate_retrieval_failed");
            Vec::new()
        }
    }
}

fn collect(
    source: &dyn CandidateSource,
    phrases: &[String],
    max_results: usize,
) -> Result<Vec<ImageCandidate>, RetrievalError> {
    if phrases.is_empty() || max_results == 0 {
        return Ok(Vec::new());
    }

    // Integer division: trailing phrases may get no slot at all.
    let per_phrase = max_results / phrases.len();
    let mut candidates = Vec::new();
    for phrase in phrases {
        candidates.extend(source.candidates_for(phrase, per_phrase)?);
    }

    candidates.shuffle(&mut rand::rng());
    candidates.truncate(max_results);
    debug!(
        target = "shelfshot.search",
        phrases = phrases.len(),
        per_phrase,
        returned = candidates.len(),
        "candidates_collected"
    );
    Ok(candidates)
}

/// Stable per-phrase seed in `0..10000`.
pub fn phrase_seed(phrase: &str) -> u64 {
    let digest = md5::compute(phrase.trim().to_lowercase().as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.0[..8]);
    u64::from_be_bytes(head) % 10_000
}

/// Offset of the first category whose keyword appears in the phrase.
pub fn category_offset(phrase: &str) -> u64 {
    let lowered = phrase.to_lowercase();
    CATEGORY_OFFSETS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|kw| lowered.contains(kw)))
        .map(|(_, offset)| *offset)
        .unwrap_or(0)
}
