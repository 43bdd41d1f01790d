/// Upper bound on the phrases handed to the retriever.
pub const MAX_PHRASES: usize = 5;

/// Category keywords in match order. The first key found in the normalized
/// product name wins, even when a later key would be a closer fit.
const CATEGORY_SYNONYMS: &[(&str, &[&str])] = &[
    (
        "phone",
        &[
            "smartphone",
            "mobile phone",
            "cell phone",
            "iphone",
            "android phone",
        ],
    ),
    (
        "headphone",
        &[
            "wireless headphones",
            "bluetooth headphones",
            "earphones",
            "headphones",
        ],
    ),
    (
        "case",
        &[
            "phone case",
            "smartphone case",
            "protective case",
            "phone cover",
        ],
    ),
    (
        "cable",
        &["usb cable", "charging cable", "data cable", "power cable"],
    ),
    (
        "stand",
        &[
            "laptop stand",
            "desk stand",
            "adjustable stand",
            "computer stand",
        ],
    ),
    (
        "mouse",
        &[
            "wireless mouse",
            "computer mouse",
            "ergonomic mouse",
            "gaming mouse",
        ],
    ),
    (
        "laptop",
        &["laptop computer", "notebook", "portable computer"],
    ),
    ("tablet", &["tablet computer", "ipad", "android tablet"]),
    ("watch", &["smartwatch", "digital watch", "fitness watch"]),
    ("camera", &["digital camera", "webcam", "security camera"]),
    (
        "speaker",
        &["bluetooth speaker", "portable speaker", "wireless speaker"],
    ),
    (
        "keyboard",
        &[
            "wireless keyboard",
            "mechanical keyboard",
            "computer keyboard",
        ],
    ),
];

const GENERIC_SUFFIXES: &[&str] = &["product", "device", "gadget"];

/// Expands a product name into at most [`MAX_PHRASES`] search phrases.
///
/// The untouched name always leads. It is followed by the synonyms of the
/// first matching category, or by generic phrases built from the normalized
/// name when no category matches. Blank input yields no phrases.
pub fn expand(product_name: &str) -> Vec<String> {
    if product_name.trim().is_empty() {
        return Vec::new();
    }

    let clean = normalize(product_name);
    let mut phrases = match category_for(&clean) {
        Some(synonyms) => synonyms.iter().map(|s| s.to_string()).collect(),
        None => generic_phrases(&clean),
    };

    if !phrases.iter().any(|p| p == product_name) {
        phrases.insert(0, product_name.to_string());
    }
    phrases.truncate(MAX_PHRASES);
    phrases
}

/// Lowercases and drops everything that is not a word character or whitespace.
pub fn normalize(input: &str) -> String {
    input
        .to_lowercase()
        .chars()
        .filter(|ch| ch.is_alphanumeric() || *ch == '_' || ch.is_whitespace())
        .collect()
}

fn category_for(clean: &str) -> Option<&'static [&'static str]> {
    CATEGORY_SYNONYMS
        .iter()
        .find(|(key, _)| clean.contains(key))
        .map(|(_, synonyms)| *synonyms)
}

fn generic_phrases(clean: &str) -> Vec<String> {
    let mut phrases: Vec<String> = GENERIC_SUFFIXES
        .iter()
        .map(|suffix| format!("{clean} {suffix}"))
        .collect();
    phrases.push(clean.to_string());
    phrases
}
