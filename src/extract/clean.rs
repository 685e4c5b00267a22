//! Text cleaning and interstitial detection for extracted article bodies.
//!
//! Cleaning works line by line:
//!
//! 1. Collapse runs of whitespace and trim
//! 2. Drop lines with fewer than `min_block_words` words (menus, captions,
//!    bylines, share buttons)
//! 3. Drop lines containing promotional or navigation phrases
//!
//! Bodies that arrive as one long line (JSON-LD `articleBody` usually does)
//! are first broken into sentences with [`split_sentences`], so a single
//! promotional sentence costs only itself.
//!
//! A cleaned body is then checked for verification phrases, which mark
//! CAPTCHA and bot-check pages that would otherwise pass as short articles.
//! A phrase only counts when it opens the page or the page is short; a long
//! article that merely mentions a CAPTCHA is still an article.

use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));
static SENTENCE_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([.!?]["'\u{201D}\u{2019})]?)\s+(["'\u{201C}\u{2018}(]?[A-Z0-9])"#)
        .expect("static regex")
});

/// Verification pages are short; longer bodies need the phrase up front.
const VERIFICATION_PAGE_MAX_WORDS: usize = 150;
/// How many leading lines count as "up front".
const VERIFICATION_LEADING_LINES: usize = 3;

/// Phrases that mark a line as promotion or navigation.
pub const UNWANTED_PHRASES: &[&str] = &[
    "subscribe now",
    "sign up",
    "newsletter",
    "exclusive offer",
    "limited time offer",
    "free trial",
    "download now",
    "join now",
    "register today",
    "special promotion",
    "promotional offer",
    "discount code",
    "early access",
    "sneak peek",
    "save now",
    "don't miss out",
    "act now",
    "last chance",
    "expires soon",
    "giveaway",
    "free access",
    "premium access",
    "unlock full access",
    "buy now",
    "learn more",
    "click here",
    "follow us on",
    "share this article",
    "connect with us",
    "advertisement",
    "sponsored content",
    "partner content",
    "affiliate links",
    "for more information",
    "you may also like",
    "we think you'll like",
    "from our network",
];

/// Phrases that only appear on human-verification interstitials.
pub const VERIFICATION_PHRASES: &[&str] = &[
    "you are human",
    "are you human",
    "i'm not a robot",
    "recaptcha",
];

/// Clean a raw body into newline-separated content lines.
pub fn clean_text(raw: &str, min_block_words: usize) -> String {
    raw.lines()
        .map(|line| WHITESPACE.replace_all(line, " ").trim().to_string())
        .filter(|line| word_count(line) >= min_block_words)
        .filter(|line| {
            let lower = line.to_lowercase();
            !UNWANTED_PHRASES.iter().any(|p| lower.contains(p))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Put every sentence of `text` on its own line.
pub fn split_sentences(text: &str) -> String {
    SENTENCE_BREAK.replace_all(text, "$1\n$2").into_owned()
}

/// The verification phrase that marks `text` as an interstitial, if any.
///
/// The phrase must appear in the leading lines, or anywhere in a body of at
/// most [`VERIFICATION_PAGE_MAX_WORDS`] words.
pub fn verification_phrase(text: &str) -> Option<&'static str> {
    let scope = if word_count(text) <= VERIFICATION_PAGE_MAX_WORDS {
        text.to_lowercase()
    } else {
        text.lines()
            .take(VERIFICATION_LEADING_LINES)
            .collect::<Vec<_>>()
            .join("\n")
            .to_lowercase()
    };
    VERIFICATION_PHRASES
        .iter()
        .copied()
        .find(|p| scope.contains(p))
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
