//! Merchant name normalization.
//!
//! Raw merchant names coming back from the extraction service vary wildly
//! ("ICA Nära Hornstull", "ica maxi", "WILLYS HEMMA"). They are mapped onto a
//! canonical name through a fixed alias table; the longest alias contained in
//! the lower-cased input wins.

/// Lower-case alias → canonical merchant name.
const STORE_ALIASES: &[(&str, &str)] = &[
    ("elgiganten", "Elgiganten"),
    ("elgig", "Elgiganten"),
    ("hjertmans", "Hjertmans Båttillbehör"),
    ("systembolaget", "Systembolaget"),
    ("ica", "ICA"),
    ("coop", "Coop"),
    ("willys", "Willy:s"),
    ("lidl", "Lidl"),
    ("hemköp", "Hemköp"),
    ("carrfour", "Carrefour"),
    ("carrefour", "Carrefour"),
    ("jack & jones", "Jack & Jones"),
    ("jack and jones", "Jack & Jones"),
    ("scorett", "Scorett"),
    ("samsung", "Samsung"),
    ("ikea", "IKEA"),
];

/// Canonical name for a raw merchant name.
///
/// Falls back to the input with its first character upper-cased when no alias
/// matches.
pub fn normalize_merchant(raw: &str) -> String {
    let lower = raw.to_lowercase();

    let best = STORE_ALIASES
        .iter()
        .filter(|(alias, _)| lower.contains(alias))
        .fold(None::<&(&str, &str)>, |best, candidate| match best {
            Some(current) if current.0.len() >= candidate.0.len() => Some(current),
            _ => Some(candidate),
        });

    match best {
        Some((_, canonical)) => (*canonical).to_string(),
        None => capitalize_first(raw),
    }
}

/// [`normalize_merchant`] for optional, possibly blank, names.
pub fn normalize_store_name(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|name| !name.is_empty())
        .map(normalize_merchant)
}

fn capitalize_first(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
