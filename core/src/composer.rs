use crate::tokenizer::Tokenizer;

/// How many times title tokens are repeated ahead of body tokens.
///
/// Repetition raises the term frequency of title words in the derived field,
/// which is the only weighting the single keyword index supports. The value
/// is empirical and can be tuned through [`KeywordComposer::with_title_boost`].
pub const DEFAULT_TITLE_BOOST: usize = 3;

/// Builds the `derived_keywords` blob for a title/body pair.
#[derive(Clone, Default)]
pub struct KeywordComposer {
    tokenizer: Tokenizer,
    title_boost: Option<usize>,
}

impl KeywordComposer {
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self { tokenizer, title_boost: None }
    }

    pub fn with_title_boost(mut self, boost: usize) -> Self {
        self.title_boost = Some(boost);
        self
    }

    pub fn title_boost(&self) -> usize {
        self.title_boost.unwrap_or(DEFAULT_TITLE_BOOST)
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn compose(&self, title: &str, body: &str) -> String {
        let title_tokens = self.tokenizer.tokenize(title);
        let body_tokens = self.tokenizer.tokenize(body);
        join_weighted(&title_tokens, &body_tokens, self.title_boost())
    }
}

/// `title_tokens` repeated `boost` times back to back, then `body_tokens`,
/// space separated.
pub fn join_weighted(title_tokens: &[String], body_tokens: &[String], boost: usize) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(title_tokens.len() * boost + body_tokens.len());
    for _ in 0..boost {
        parts.extend(title_tokens.iter().map(String::as_str));
    }
    parts.extend(body_tokens.iter().map(String::as_str));
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn title_repeats_in_sequence() {
        let out = join_weighted(&strings(&["go", "js"]), &strings(&["web"]), 3);
        assert_eq!(out, "go js go js go js web");
    }

    #[test]
    fn empty_inputs_give_empty_string() {
        assert_eq!(KeywordComposer::default().compose("   ", ""), "");
    }

    #[test]
    fn boost_is_configurable() {
        let composer = KeywordComposer::default().with_title_boost(1);
        assert_eq!(composer.compose("Rust", "async rust"), "rust async rust");
    }
}
