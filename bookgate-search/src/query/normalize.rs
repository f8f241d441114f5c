//! Text normalisation for identity and cache keys.
//!
//! Provider calls always receive the caller's original text; these forms are
//! only used for comparing and keying.

/// Articles and conjunctions dropped from cache-key text.
const STOP_WORDS: &[&str] = &["a", "an", "the", "and", "or", "of"];

/// Lowercase, drop apostrophes, turn other punctuation into spaces, and
/// collapse whitespace.
///
/// Punctuation becomes a space rather than vanishing so that `J.R.R.` and
/// `J. R. R.` produce the same tokens.
pub fn normalize_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_space = false;
    for c in input.chars() {
        if matches!(c, '\'' | '\u{2019}') {
            continue;
        }
        for lc in c.to_lowercase() {
            if lc.is_alphanumeric() {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                out.push(lc);
            } else {
                pending_space = true;
            }
        }
    }
    out
}

/// [`normalize_text`] with stop words removed, for cache keys.
///
/// A query made only of stop words ("The") keeps them, otherwise it would
/// normalise to nothing.
pub fn normalize_for_key(input: &str) -> String {
    let normalized = normalize_text(input);
    let kept: Vec<&str> = normalized
        .split(' ')
        .filter(|token| !token.is_empty() && !STOP_WORDS.contains(token))
        .collect();
    if kept.is_empty() {
        normalized
    } else {
        kept.join(" ")
    }
}

/// Whitespace tokens of the normalised text.
pub fn tokens(input: &str) -> Vec<String> {
    normalize_text(input)
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUERIES: &[&str] = &[
        "Stephen King",
        "  The   Lord of the Rings  ",
        "J.R.R. Tolkien",
        "Ender's Game",
        "weir, andy",
        "The",
        "Harry Potter & the Philosopher's Stone",
        "İstanbul Hatırası",
        "¿Cien años de soledad?",
        "",
    ];

    #[test]
    fn lowercases_trims_and_collapses() {
        assert_eq!(normalize_text("  Stephen    KING "), "stephen king");
    }

    #[test]
    fn punctuation_separates_initials() {
        assert_eq!(normalize_text("J.R.R. Tolkien"), "j r r tolkien");
        assert_eq!(normalize_text("J. R. R. Tolkien"), "j r r tolkien");
    }

    #[test]
    fn apostrophes_are_dropped() {
        assert_eq!(normalize_text("Ender's Game"), "enders game");
        assert_eq!(normalize_text("Ender\u{2019}s Game"), "enders game");
    }

    #[test]
    fn key_form_drops_stop_words() {
        assert_eq!(normalize_for_key("The Lord of the Rings"), "lord rings");
        assert_eq!(normalize_for_key("Pride and Prejudice"), "pride prejudice");
    }

    #[test]
    fn key_form_keeps_all_stop_word_query() {
        assert_eq!(normalize_for_key("The"), "the");
        assert_eq!(normalize_for_key("A and The"), "a and the");
    }

    #[test]
    fn normalize_text_is_idempotent() {
        for q in QUERIES {
            let once = normalize_text(q);
            assert_eq!(normalize_text(&once), once, "query {q:?}");
        }
    }

    #[test]
    fn normalize_for_key_is_idempotent() {
        for q in QUERIES {
            let once = normalize_for_key(q);
            assert_eq!(normalize_for_key(&once), once, "query {q:?}");
        }
    }

    #[test]
    fn tokens_split_on_normalised_whitespace() {
        assert_eq!(tokens("Weir, Andy"), vec!["weir", "andy"]);
        assert!(tokens("   ").is_empty());
    }
}
