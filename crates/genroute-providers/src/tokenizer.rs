//! Prompt token counting for cost estimates.
//!
//! Uses tiktoken's BPE tables. Newer OpenAI model families use `o200k_base`,
//! everything else is counted with `cl100k_base` as a close-enough proxy.

use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;
use tracing::warn;

/// Model-id fragments that select `o200k_base`.
const O200K_FRAGMENTS: &[&str] = &["gpt-4o", "gpt-4.1", "gpt-5", "o1", "o3", "o4", "chatgpt-4o"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    O200kBase,
    Cl100kBase,
}

impl Encoding {
    pub fn for_model(model: &str) -> Self {
        let model = model.to_lowercase();
        if O200K_FRAGMENTS.iter().any(|f| model.contains(f)) {
            Encoding::O200kBase
        } else {
            Encoding::Cl100kBase
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Encoding::O200kBase => "o200k_base",
            Encoding::Cl100kBase => "cl100k_base",
        }
    }

    fn bpe(&self) -> Option<&'static CoreBPE> {
        static O200K: OnceLock<Option<CoreBPE>> = OnceLock::new();
        static CL100K: OnceLock<Option<CoreBPE>> = OnceLock::new();

        let (cell, load): (_, fn() -> anyhow::Result<CoreBPE>) = match self {
            Encoding::O200kBase => (&O200K, tiktoken_rs::o200k_base),
            Encoding::Cl100kBase => (&CL100K, tiktoken_rs::cl100k_base),
        };
        cell.get_or_init(|| match load() {
            Ok(bpe) => Some(bpe),
            Err(e) => {
                warn!(encoding = self.name(), error = %e, "tokenizer unavailable, using estimate");
                None
            }
        })
        .as_ref()
    }
}

/// Character-based estimate: `ceil(chars / 4)`.
pub fn approximate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Tokens in `text` as counted for `model`.
pub fn count_tokens(text: &str, model: &str) -> usize {
    match Encoding::for_model(model).bpe() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => approximate_tokens(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_selection() {
        assert_eq!(Encoding::for_model("gpt-4o-mini"), Encoding::O200kBase);
        assert_eq!(Encoding::for_model("openai/gpt-4.1"), Encoding::O200kBase);
        assert_eq!(Encoding::for_model("o3-mini"), Encoding::O200kBase);
        assert_eq!(Encoding::for_model("gpt-4-turbo"), Encoding::Cl100kBase);
        assert_eq!(Encoding::for_model("claude-sonnet-4"), Encoding::Cl100kBase);
    }

    #[test]
    fn test_approximate_tokens_rounds_up() {
        assert_eq!(approximate_tokens(""), 0);
        assert_eq!(approximate_tokens("abcd"), 1);
        assert_eq!(approximate_tokens("abcde"), 2);
        assert_eq!(approximate_tokens(&"x".repeat(400)), 100);
    }

    #[test]
    fn test_count_tokens_nonzero() {
        let n = count_tokens("Hello, world! How are you today?", "gpt-4o");
        assert!(n > 0 && n < 20);
        assert_eq!(count_tokens("", "claude-3-opus"), 0);
    }
}
