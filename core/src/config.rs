use crate::analyzer::{AnalyzerKind, CommandAnalyzer, HangulNounAnalyzer, NounAnalyzer, NullAnalyzer};
use crate::composer::{KeywordComposer, DEFAULT_TITLE_BOOST};
use crate::tokenizer::Tokenizer;
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Deadline for the external analyzer when none is configured.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(2_000);

/// Settings for the keyword pipeline, shared by the server and the indexer CLI.
#[derive(Debug, Clone)]
pub struct TextConfig {
    pub analyzer: AnalyzerKind,
    pub analyzer_command: Option<PathBuf>,
    pub analyzer_args: Vec<String>,
    /// Per-call bound on noun extraction; `None` runs the analyzer inline.
    pub analyzer_timeout: Option<Duration>,
    pub title_boost: usize,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            analyzer: AnalyzerKind::Hangul,
            analyzer_command: None,
            analyzer_args: Vec::new(),
            analyzer_timeout: None,
            title_boost: DEFAULT_TITLE_BOOST,
        }
    }
}

impl TextConfig {
    pub fn composer(&self) -> Result<KeywordComposer> {
        let analyzer: Arc<dyn NounAnalyzer> = match self.analyzer {
            AnalyzerKind::Hangul => Arc::new(HangulNounAnalyzer),
            AnalyzerKind::None => Arc::new(NullAnalyzer),
            AnalyzerKind::Command => {
                let Some(program) = &self.analyzer_command else {
                    bail!("analyzer 'command' requires an analyzer command path");
                };
                let timeout = self.analyzer_timeout.unwrap_or(DEFAULT_COMMAND_TIMEOUT);
                Arc::new(CommandAnalyzer::new(program.clone(), self.analyzer_args.clone(), timeout))
            }
        };
        let mut tokenizer = Tokenizer::new(analyzer);
        if let Some(timeout) = self.analyzer_timeout {
            tokenizer = tokenizer.with_timeout(timeout);
        }
        Ok(KeywordComposer::new(tokenizer).with_title_boost(self.title_boost))
    }
}
