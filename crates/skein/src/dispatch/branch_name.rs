//! Branch naming for dispatched issues.

/// Number of title words carried into the branch name.
const TITLE_WORDS: usize = 2;

/// Whether `c` belongs to a word token (`[A-Za-z0-9_]`).
fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Derive the branch name for dispatching issue `index` titled `title`.
///
/// The name is the index, a dash, then the first two word tokens of the
/// title joined by an underscore. Anything outside `[A-Za-z0-9_]` separates
/// tokens and is dropped.
///
/// The result depends only on its inputs, so a retried dispatch lands on the
/// same branch.
///
/// ```
/// use skein::dispatch::derive_branch_name;
///
/// assert_eq!(derive_branch_name(42, "Fix login bug"), "42-Fix_login");
/// assert_eq!(derive_branch_name(7, ""), "7-");
/// ```
#[must_use]
pub fn derive_branch_name(index: i64, title: &str) -> String {
    let words: Vec<&str> = title
        .split(|c: char| !is_word_char(c))
        .filter(|word| !word.is_empty())
        .take(TITLE_WORDS)
        .collect();
    format!("{index}-{}", words.join("_"))
}
