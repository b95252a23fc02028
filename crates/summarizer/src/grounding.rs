use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Relative path-like tokens ending in a common source or config extension.
static PATH_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:[A-Za-z0-9_\-.]+/)*[A-Za-z0-9_\-]+\.(?:py|pyi|rs|js|jsx|mjs|ts|tsx|go|java|kt|kts|scala|c|h|cc|cpp|hpp|cs|rb|php|swift|sh|sql|proto|toml|yaml|yml|json|md)\b",
    )
    .expect("path token pattern")
});

/// `Node.js`, `Vue.js`, `D3.js`: a bare capitalised `.js` name is a technology, not a file.
fn is_technology_name(token: &str) -> bool {
    match token.strip_suffix(".js") {
        Some(stem) => {
            !stem.contains('/') && stem.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        }
        None => false,
    }
}

/// Path-like matches in `text` with their byte spans, `./` prefixes dropped.
fn path_matches(text: &str) -> impl Iterator<Item = (std::ops::Range<usize>, &str)> {
    PATH_TOKEN
        .find_iter(text)
        .map(|m| (m.range(), m.as_str().trim_start_matches("./")))
        .filter(|(_, token)| !is_technology_name(token))
}

/// Distinct path-like tokens in order of first appearance.
pub fn path_tokens(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    path_matches(text)
        .map(|(_, token)| token.to_string())
        .filter(|token| seen.insert(token.clone()))
        .collect()
}

/// A token is grounded when it names an allowed file exactly or as a path suffix.
pub fn is_grounded(token: &str, allowed: &[String]) -> bool {
    allowed
        .iter()
        .any(|file| file == token || file.ends_with(&format!("/{token}")))
}

pub fn ungrounded_tokens(text: &str, allowed: &[String]) -> Vec<String> {
    path_tokens(text)
        .into_iter()
        .filter(|token| !is_grounded(token, allowed))
        .collect()
}

/// Remove whole-token occurrences of `tokens` from `text` and tidy the
/// whitespace they leave behind. Longer paths containing a token survive.
pub fn strip_tokens(text: &str, tokens: &[String]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (span, token) in path_matches(text) {
        if tokens.iter().any(|t| t == token) {
            out.push_str(&text[last..span.start]);
            last = span.end;
        }
    }
    out.push_str(&text[last..]);
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
