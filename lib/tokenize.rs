// Shell-like splitting of console input
use once_cell::sync::Lazy;
use regex::Regex;

static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""[^"]*"|'[^']*'|\S+"#).expect("token pattern"));

/// Split a line on whitespace, keeping `"..."` and `'...'` runs together
/// (quotes stripped). An unmatched quote is just another character, so any
/// input tokenizes.
pub fn tokenize(line: &str) -> Vec<String> {
    TOKEN
        .find_iter(line.trim())
        .map(|m| strip_quotes(m.as_str()).to_string())
        .collect()
}

// 'abc' or "abc" loses its outer quotes
fn strip_quotes(token: &str) -> &str {
    for quote in ['"', '\''] {
        if token.len() >= 2 && token.starts_with(quote) && token.ends_with(quote) {
            return &token[1..token.len() - 1];
        }
    }
    token
}
