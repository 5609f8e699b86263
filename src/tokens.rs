//! Token extraction and normalization.
//!
//! One ruleset maps free text to search tokens, and it runs on both sides
//! of the index: at load time over annotations, tags and shortcodes, and at
//! query time over the user's input. Search correctness depends on the two
//! sides agreeing, so everything lives here and stays pure.

/// Punctuation stripped from ordinary words. Words made entirely of
/// punctuation (emoticons like `:-)`) skip this and survive verbatim,
/// otherwise they would normalize to nothing.
const STRIPPED: [char; 4] = ['(', ')', ':', ','];

/// Split `text` into normalized tokens, in input order.
///
/// Words are separated by whitespace and underscores, so shortcodes like
/// `woman_technologist` yield the same tokens as the annotation
/// "woman technologist". Empty results are dropped.
pub fn extract_tokens(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || c == '_')
        .filter_map(normalize_word)
        .collect()
}

/// Lowercase a single already-split token. Shortcode lookup runs its
/// argument through this so `"SMILE"` finds the token `"smile"`.
pub fn normalize(token: &str) -> String {
    token.to_lowercase()
}

fn normalize_word(word: &str) -> Option<String> {
    if word.is_empty() {
        return None;
    }
    let token: String = if word.chars().any(char::is_alphanumeric) {
        word.chars()
            .filter(|c| !STRIPPED.contains(c))
            .map(|c| if c == '\u{2019}' { '\'' } else { c })
            .flat_map(char::to_lowercase)
            .collect()
    } else {
        word.to_lowercase()
    };
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
