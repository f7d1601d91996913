//! Token budgets and prefix-preserving truncation.

use tiktoken_rs::CoreBPE;
use tracing::{debug, warn};

use linkdigest_shared::{LinkDigestError, Result};

/// Context window tier of a chat model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextTier {
    /// 4k-token models (`gpt-3.5-turbo` and anything unrecognized).
    Small,
    /// 8k-token models (the `gpt-4` family).
    Large,
}

impl ContextTier {
    pub fn for_model(model: &str) -> Self {
        if model.starts_with("gpt-4") {
            Self::Large
        } else {
            Self::Small
        }
    }

    pub fn max_total_tokens(self) -> usize {
        match self {
            Self::Small => 4096,
            Self::Large => 8192,
        }
    }
}

/// How the model's context window is split between input, response, and overhead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    pub max_total_tokens: usize,
    pub max_response_tokens: usize,
    pub buffer_tokens: usize,
}

impl TokenBudget {
    pub fn for_model(model: &str, max_response_tokens: usize, buffer_tokens: usize) -> Self {
        Self {
            max_total_tokens: ContextTier::for_model(model).max_total_tokens(),
            max_response_tokens,
            buffer_tokens,
        }
    }

    /// Tokens left for the article text.
    pub fn max_input_tokens(&self) -> usize {
        self.max_total_tokens
            .saturating_sub(self.max_response_tokens)
            .saturating_sub(self.buffer_tokens)
    }
}

/// Counts tokens and truncates text to a token budget.
pub trait Tokenizer: Send + Sync {
    fn count(&self, text: &str) -> usize;

    /// Keep the longest prefix of `text` that fits in `max_tokens`.
    fn truncate(&self, text: &str, max_tokens: usize) -> String;
}

/// tiktoken BPE tokenizer matching the configured model.
pub struct BpeTokenizer {
    bpe: CoreBPE,
}

impl BpeTokenizer {
    /// Encoding for `model`, falling back to `cl100k_base` for unknown models.
    pub fn for_model(model: &str) -> Result<Self> {
        let bpe = match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => bpe,
            Err(e) => {
                debug!(model, error = %e, "no dedicated encoding, using cl100k_base");
                tiktoken_rs::cl100k_base().map_err(|e| {
                    LinkDigestError::Summarize(format!("failed to load cl100k_base: {e}"))
                })?
            }
        };
        Ok(Self { bpe })
    }
}

impl Tokenizer for BpeTokenizer {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    fn truncate(&self, text: &str, max_tokens: usize) -> String {
        let tokens = self.bpe.encode_with_special_tokens(text);
        if tokens.len() <= max_tokens {
            return text.to_string();
        }

        // A cut can land inside a multi-byte character; shorten until the prefix decodes.
        for end in (0..=max_tokens).rev() {
            if let Ok(prefix) = self.bpe.decode(tokens[..end].to_vec()) {
                debug!(from = tokens.len(), to = end, "truncated input");
                return prefix;
            }
        }
        warn!("no decodable prefix, dropping input");
        String::new()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Tokenizer;

    /// One token per whitespace-separated word.
    pub struct WordTokenizer;

    impl Tokenizer for WordTokenizer {
        fn count(&self, text: &str) -> usize {
            text.split_whitespace().count()
        }

        fn truncate(&self, text: &str, max_tokens: usize) -> String {
            if self.count(text) <= max_tokens {
                return text.to_string();
            }
            text.split_whitespace()
                .take(max_tokens)
                .collect::<Vec<_>>()
                .join(" ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::WordTokenizer;
    use super::*;

    #[test]
    fn tiers_follow_model_family() {
        assert_eq!(ContextTier::for_model("gpt-4"), ContextTier::Large);
        assert_eq!(ContextTier::for_model("gpt-4o-mini"), ContextTier::Large);
        assert_eq!(ContextTier::for_model("gpt-3.5-turbo"), ContextTier::Small);
        assert_eq!(ContextTier::for_model("mistral-large"), ContextTier::Small);
    }

    #[test]
    fn input_budget_subtracts_response_and_buffer() {
        assert_eq!(TokenBudget::for_model("gpt-4", 1024, 100).max_input_tokens(), 7068);
        assert_eq!(TokenBudget::for_model("gpt-3.5-turbo", 1024, 100).max_input_tokens(), 2972);
        assert_eq!(TokenBudget::for_model("gpt-3.5-turbo", 5000, 100).max_input_tokens(), 0);
    }

    #[test]
    fn truncation_stops_exactly_at_budget() {
        let budget = 5;
        let text = (0..=budget).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        assert_eq!(WordTokenizer.count(&text), budget + 1);

        let truncated = WordTokenizer.truncate(&text, budget);
        assert_eq!(WordTokenizer.count(&truncated), budget);
        assert!(text.starts_with(&truncated));
    }

    #[test]
    fn bpe_truncation_is_a_prefix_within_budget() {
        let tokenizer = BpeTokenizer::for_model("gpt-4").unwrap();
        let budget = 50;
        let text = format!("a{}", " a".repeat(budget));
        assert_eq!(tokenizer.count(&text), budget + 1);

        let truncated = tokenizer.truncate(&text, budget);
        assert_eq!(tokenizer.count(&truncated), budget);
        assert!(text.starts_with(&truncated));
    }

    #[test]
    fn bpe_leaves_short_text_alone() {
        let tokenizer = BpeTokenizer::for_model("some-unknown-model").unwrap();
        assert_eq!(tokenizer.truncate("short text", 100), "short text");
    }

    #[test]
    fn bpe_truncation_never_splits_characters() {
        let tokenizer = BpeTokenizer::for_model("gpt-4").unwrap();
        let text = "🦀".repeat(40);
        for budget in 0..10 {
            let truncated = tokenizer.truncate(&text, budget);
            assert!(text.starts_with(&truncated));
            assert_eq!(truncated.chars().count() * 4, truncated.len());
        }
    }
}
