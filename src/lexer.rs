use crate::command::Token;

/// Characters that separate words. There is no quoting, so these can never
/// appear inside a token.
const SEPARATORS: &[char] = &[' ', '\t', '\r', '\n'];

/// Split a line into its words, in order.
pub fn split_into_tokens(line: &str) -> Vec<Token<'_>> {
    line.split(SEPARATORS).filter(|s| !s.is_empty()).collect()
}
