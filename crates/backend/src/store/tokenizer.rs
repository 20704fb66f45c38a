//! Identifier-aware tokenizer for lexical search.
//!
//! Lowercases, splits on non-alphanumeric characters, and preserves
//! identifier sub-tokens: `hashPassword` and `hash_password` both yield
//! `[hash, password]`, so natural-language queries match code symbols.

use bm25::Tokenizer;
use once_cell::sync::Lazy;
use regex::Regex;

/// Minimum token length kept in the index (filters operator noise).
const MIN_TOKEN_LEN: usize = 2;

#[derive(Debug, Clone, Default)]
pub struct CodeTokenizer;

impl CodeTokenizer {
  /// Split naming conventions into whitespace-separated words.
  fn preprocess(&self, text: &str) -> String {
    // snake_case and kebab-case separators
    static SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[_\-]+").expect("invalid regex"));
    let text = SEPARATOR_RE.replace_all(text, " ");

    // camelCase / PascalCase boundaries
    static CAMEL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("invalid regex"));
    let text = CAMEL_RE.replace_all(&text, "$1 $2");

    // Acronym boundaries: HTTPServer -> HTTP Server
    static ACRONYM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([A-Z]+)([A-Z][a-z])").expect("invalid regex"));
    ACRONYM_RE.replace_all(&text, "$1 $2").into_owned()
  }
}

impl Tokenizer for CodeTokenizer {
  fn tokenize(&self, input_text: &str) -> Vec<String> {
    self
      .preprocess(input_text)
      .split(|c: char| !c.is_alphanumeric())
      .filter(|t| t.len() >= MIN_TOKEN_LEN)
      .map(|t| t.to_lowercase())
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn tokens(text: &str) -> Vec<String> {
    CodeTokenizer.tokenize(text)
  }

  #[test]
  fn test_lowercases_and_splits_punctuation() {
    assert_eq!(tokens("Login(user, pass);"), vec!["login", "user", "pass"]);
  }

  #[test]
  fn test_splits_camel_case() {
    assert_eq!(tokens("hashPassword"), vec!["hash", "password"]);
    assert_eq!(tokens("XMLHttpRequest"), vec!["xml", "http", "request"]);
  }

  #[test]
  fn test_splits_snake_case() {
    assert_eq!(tokens("hash_password_v2"), vec!["hash", "password", "v2"]);
  }

  #[test]
  fn test_member_access_splits() {
    assert_eq!(tokens("auth.login::verify"), vec!["auth", "login", "verify"]);
  }

  #[test]
  fn test_short_noise_dropped() {
    assert_eq!(tokens("a = b + c2"), vec!["c2"]);
  }
}
