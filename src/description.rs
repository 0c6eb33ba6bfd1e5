//! Marketing copy for products whose page carries no description
//!
//! Titles are classified by case-insensitive substring checks against fixed
//! vocabularies. The first table entry found in the title wins, so more
//! specific keywords come first.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::ProductInfo;

/// (keyword, canonical type)
const PRODUCT_TYPES: &[(&str, &str)] = &[
    ("sweatshirt", "sweatshirt"),
    ("sweatpants", "sweatpants"),
    ("t-shirt", "t-shirt"),
    ("tshirt", "t-shirt"),
    ("polo", "polo shirt"),
    ("blouse", "blouse"),
    ("shirt", "shirt"),
    ("hoodie", "hoodie"),
    ("cardigan", "cardigan"),
    ("sweater", "sweater"),
    ("jumpsuit", "jumpsuit"),
    ("romper", "romper"),
    ("jeans", "jeans"),
    ("joggers", "joggers"),
    ("leggings", "leggings"),
    ("trousers", "trousers"),
    ("pants", "pants"),
    ("shorts", "shorts"),
    ("skirt", "skirt"),
    ("dress", "dress"),
    ("blazer", "blazer"),
    ("jacket", "jacket"),
    ("coat", "coat"),
    ("vest", "vest"),
    ("suit", "suit"),
    ("top", "top"),
];

const FORMAL_KEYWORDS: &[&str] = &[
    "formal", "business", "office", "blazer", "suit", "elegant", "wedding",
];

const SPORT_KEYWORDS: &[&str] = &[
    "sport", "gym", "running", "athletic", "yoga", "workout", "training", "jogger", "fitness",
];

const MATERIALS: &[&str] = &[
    "cotton", "linen", "denim", "polyester", "silk", "satin", "chiffon", "wool", "cashmere",
    "leather", "nylon", "spandex", "velvet", "fleece", "corduroy", "rayon", "viscose", "knit",
];

const COLORS: &[&str] = &[
    "black", "white", "navy", "blue", "red", "green", "grey", "gray", "brown", "beige", "khaki",
    "pink", "purple", "yellow", "orange", "burgundy", "cream",
];

const FEATURES: &[&str] = &[
    "loose fit", "slim fit", "regular fit", "high waist", "elastic waist", "drawstring",
    "pockets", "zipper", "button", "breathable", "stretch", "lightweight", "quick dry",
    "waterproof", "hooded", "long sleeve", "short sleeve", "sleeveless", "wrinkle free",
];

/// Boilerplate stripped from titles before they are reused as a lead sentence
static TITLE_NOISE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // "100% Cotton", "95%Polyester"
        r"(?i)\b\d+(?:\.\d+)?\s*%\s*[a-z]*",
        // measurements
        r#"(?i)\b\d+(?:\.\d+)?\s*(?:cm|mm|inch(?:es)?|in|kg|g|")(?:\s|$)"#,
        // size and fit boilerplate
        r"(?i)\bplus\s+size\b",
        r"(?i)\bsizes?\s*:?\s*(?:xxs|xs|s|m|l|xl|\d?xxl|\d?xl)(?:\s*-\s*(?:xs|s|m|l|xl|\d?xxl|\d?xl))?\b",
        // pack counts
        r"(?i)\b\d+\s*(?:pcs?|pieces?|pack)\b",
        // bracketed asides
        r"[\(\[\{][^\)\]\}]*[\)\]\}]",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("title noise pattern"))
    .collect()
});

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

/// Strip measurement, material and fit boilerplate from a product title
pub fn clean_title(title: &str) -> String {
    let mut cleaned = title.to_string();
    for pattern in TITLE_NOISE.iter() {
        cleaned = pattern.replace_all(&cleaned, " ").into_owned();
    }
    WHITESPACE
        .replace_all(&cleaned, " ")
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, ',' | '-' | '|' | '/'))
        .to_string()
}

/// Classify a title into type, style, material, color and features
pub fn classify(title: &str) -> ProductInfo {
    let lower = title.to_lowercase();
    let has = |keyword: &str| lower.contains(keyword);

    let style = if FORMAL_KEYWORDS.iter().any(|&k| has(k)) {
        "formal"
    } else if SPORT_KEYWORDS.iter().any(|&k| has(k)) {
        "sport"
    } else {
        "casual"
    };

    ProductInfo {
        product_type: PRODUCT_TYPES
            .iter()
            .find(|&&(keyword, _)| has(keyword))
            .map(|(_, canonical)| *canonical),
        style,
        material: MATERIALS.iter().copied().find(|&m| has(m)),
        color: COLORS.iter().copied().find(|&c| has(c)),
        features: FEATURES.iter().copied().filter(|&f| has(f)).collect(),
    }
}

/// Build templated marketing copy from a product title
pub fn synthesize(title: &str) -> String {
    let info = classify(title);
    let cleaned = clean_title(title);

    let mut descriptor: Vec<&str> = vec![info.style];
    descriptor.extend(info.color);
    descriptor.extend(info.material);
    descriptor.push(info.product_type.unwrap_or("piece"));

    let mut sentences = Vec::new();
    if !cleaned.is_empty() {
        sentences.push(format!("{}.", cleaned.trim_end_matches('.')));
    }

    if info.features.is_empty() {
        sentences.push(format!(
            "This {} is a versatile addition to your wardrobe.",
            descriptor.join(" ")
        ));
    } else {
        sentences.push(format!(
            "This {} features {}.",
            descriptor.join(" "),
            join_list(&info.features)
        ));
    }

    if let Some(material) = info.material {
        sentences.push(format!(
            "Made with quality {material} for lasting comfort and easy care."
        ));
    }

    sentences.push(
        match info.style {
            "formal" => "Tailored for a polished look, it suits the office, business meetings and special occasions.",
            "sport" => "Built for movement, it keeps you comfortable through workouts and active days.",
            _ => "Comfortable and easy to style, it is perfect for everyday wear and relaxed weekends.",
        }
        .to_string(),
    );

    sentences.join(" ")
}

fn join_list(items: &[&str]) -> String {
    match items {
        [] => String::new(),
        [only] => (*only).to_string(),
        [rest @ .., last] => format!("{} and {}", rest.join(", "), last),
    }
}
