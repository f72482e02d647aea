use crate::analyzer::{HangulNounAnalyzer, NounAnalyzer};
use crate::error::AnalyzerError;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

lazy_static! {
    static ref LATIN_WORD: Regex = Regex::new(r"[A-Za-z]+").expect("valid regex");
}

/// Every maximal run of ASCII letters, lowercased, in order, duplicates kept.
pub fn latin_words(text: &str) -> Vec<String> {
    LATIN_WORD.find_iter(text).map(|m| m.as_str().to_ascii_lowercase()).collect()
}

/// Turns free text into keyword tokens: analyzer nouns first, then Latin words.
///
/// Analyzer failures never reach the caller. When the analyzer errors or
/// exceeds `timeout`, only the Latin words are returned.
#[derive(Clone)]
pub struct Tokenizer {
    analyzer: Arc<dyn NounAnalyzer>,
    timeout: Option<Duration>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(Arc::new(HangulNounAnalyzer))
    }
}

impl Tokenizer {
    pub fn new(analyzer: Arc<dyn NounAnalyzer>) -> Self {
        Self { analyzer, timeout: None }
    }

    /// Bound each analyzer call. The call runs on a helper thread so a hung
    /// analyzer cannot hold up the caller past `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn analyzer_name(&self) -> &'static str {
        self.analyzer.name()
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let latin = latin_words(text);
        match self.nouns(text) {
            Ok(nouns) => {
                let mut tokens: Vec<String> = nouns.into_iter().map(|n| n.to_lowercase()).collect();
                tokens.extend(latin);
                tokens
            }
            Err(err) => {
                tracing::warn!(analyzer = self.analyzer.name(), error = %err, "noun extraction failed, using latin words only");
                latin
            }
        }
    }

    fn nouns(&self, text: &str) -> Result<Vec<String>, AnalyzerError> {
        let Some(timeout) = self.timeout else {
            return self.analyzer.nouns(text);
        };
        let (tx, rx) = mpsc::channel();
        let analyzer = Arc::clone(&self.analyzer);
        let owned = text.to_string();
        thread::Builder::new()
            .name("noun-analyzer".into())
            .spawn(move || {
                // Receiver is gone if the caller already timed out.
                let _ = tx.send(analyzer.nouns(&owned));
            })?;
        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(AnalyzerError::Timeout(timeout)),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(AnalyzerError::Failed("analyzer thread panicked".into())),
        }
    }
}
