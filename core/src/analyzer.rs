//! Noun extraction backends used by the [`crate::Tokenizer`].
//!
//! The tokenizer only needs `nouns(text)`. Three backends are provided: a
//! built-in Hangul heuristic, an external MeCab-compatible process, and a
//! no-op analyzer that leaves tokenization to the Latin word pass.

use crate::error::AnalyzerError;
use lazy_static::lazy_static;
use regex::Regex;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};
use unicode_normalization::UnicodeNormalization;

/// Extracts common nouns from free text, in order of appearance.
pub trait NounAnalyzer: Send + Sync {
    fn nouns(&self, text: &str) -> Result<Vec<String>, AnalyzerError>;

    fn name(&self) -> &'static str;
}

/// Which analyzer backend to build from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerKind {
    Hangul,
    Command,
    None,
}

impl FromStr for AnalyzerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hangul" => Ok(AnalyzerKind::Hangul),
            "command" | "mecab" => Ok(AnalyzerKind::Command),
            "none" | "latin" => Ok(AnalyzerKind::None),
            other => Err(format!("unknown analyzer '{other}' (expected hangul, command or none)")),
        }
    }
}

/// Analyzer that never finds nouns.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAnalyzer;

impl NounAnalyzer for NullAnalyzer {
    fn nouns(&self, _text: &str) -> Result<Vec<String>, AnalyzerError> {
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

lazy_static! {
    static ref HANGUL_RUN: Regex = Regex::new(r"\p{Hangul}+").expect("valid regex");
}

// Copula forms attached to a noun ("학생이다" -> "학생").
const COPULAS: &[&str] = &["입니다", "이에요", "이었다", "이라고", "이라는", "이다", "예요", "이야"];

// Runs ending in one of these are predicates, not nouns.
const PREDICATE_ENDINGS: &[&str] = &["습니다", "니다", "어요", "아요", "해요", "네요", "까요", "다", "요", "죠"];

// Postpositional particles, longest first. Single syllables that commonly end
// nouns on their own ("이", "나") are left out.
const PARTICLES: &[&str] = &[
    "에서부터", "으로부터", "에게서", "한테서", "에서는", "으로는", "까지는", "부터는", "에게는",
    "에서", "에게", "한테", "으로", "까지", "부터", "마다", "처럼", "보다", "이나", "이랑", "에는",
    "은", "는", "가", "을", "를", "에", "의", "와", "과", "도", "로", "만", "랑",
];

/// Dictionary-free noun extractor for Korean text.
///
/// Each run of Hangul syllables is treated as one word. Predicates are
/// dropped, copulas and a single trailing particle are stripped, and stems
/// shorter than two syllables are discarded.
#[derive(Debug, Default, Clone, Copy)]
pub struct HangulNounAnalyzer;

impl HangulNounAnalyzer {
    fn noun_stem(word: &str) -> Option<&str> {
        for copula in COPULAS {
            if let Some(stem) = word.strip_suffix(copula) {
                return Self::long_enough(stem);
            }
        }
        if PREDICATE_ENDINGS.iter().any(|e| word.ends_with(e)) {
            return None;
        }
        for particle in PARTICLES {
            if let Some(stem) = word.strip_suffix(particle) {
                if stem.chars().count() >= 2 {
                    return Some(stem);
                }
            }
        }
        Self::long_enough(word)
    }

    fn long_enough(stem: &str) -> Option<&str> {
        (stem.chars().count() >= 2).then_some(stem)
    }
}

impl NounAnalyzer for HangulNounAnalyzer {
    fn nouns(&self, text: &str) -> Result<Vec<String>, AnalyzerError> {
        let normalized = text.nfkc().collect::<String>();
        Ok(HANGUL_RUN
            .find_iter(&normalized)
            .filter_map(|m| Self::noun_stem(m.as_str()))
            .map(str::to_string)
            .collect())
    }

    fn name(&self) -> &'static str {
        "hangul"
    }
}

/// Runs an external MeCab-compatible analyzer once per call.
///
/// The text is written to the child's stdin; stdout is expected in MeCab's
/// `surface\tTAG,feature,...` format terminated by `EOS` lines. Tokens whose
/// tag starts with `NN` are kept. The child is killed once `timeout` passes.
#[derive(Debug, Clone)]
pub struct CommandAnalyzer {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandAnalyzer {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self { program: program.into(), args, timeout }
    }
}

impl NounAnalyzer for CommandAnalyzer {
    fn nouns(&self, text: &str) -> Result<Vec<String>, AnalyzerError> {
        let deadline = Instant::now() + self.timeout;
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| AnalyzerError::Failed("stdout not captured".into()))?;
        let reader = thread::spawn(move || {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).map(|_| buf)
        });

        // Written off-thread so a child that never drains stdin cannot outlive the deadline.
        if let Some(mut stdin) = child.stdin.take() {
            let mut input = text.as_bytes().to_vec();
            input.push(b'\n');
            thread::spawn(move || {
                // Broken pipe once the child exits or is killed; the exit status reports why.
                let _ = stdin.write_all(&input);
            });
        }

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(AnalyzerError::Timeout(self.timeout));
            }
            thread::sleep(Duration::from_millis(5));
        };

        let output = reader
            .join()
            .map_err(|_| AnalyzerError::Failed("stdout reader panicked".into()))??;
        if !status.success() {
            return Err(AnalyzerError::Failed(format!("{} exited with {status}", self.program.display())));
        }
        let output = String::from_utf8(output).map_err(|e| AnalyzerError::Malformed(e.to_string()))?;
        parse_mecab_nouns(&output)
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

/// Extract `NN*`-tagged surfaces from MeCab output.
pub fn parse_mecab_nouns(output: &str) -> Result<Vec<String>, AnalyzerError> {
    let mut nouns = Vec::new();
    for line in output.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line == "EOS" {
            continue;
        }
        let (surface, features) = line
            .split_once('\t')
            .ok_or_else(|| AnalyzerError::Malformed(format!("missing tab in line {line:?}")))?;
        let tag = features.split(',').next().unwrap_or_default();
        if tag.starts_with("NN") && !surface.is_empty() {
            nouns.push(surface.to_string());
        }
    }
    Ok(nouns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hangul_strips_particles() {
        let nouns = HangulNounAnalyzer.nouns("고양이가 좋아요").unwrap();
        assert_eq!(nouns, vec!["고양이"]);
    }

    #[test]
    fn hangul_drops_predicates_and_short_stems() {
        let nouns = HangulNounAnalyzer.nouns("서울에서 개발자를 만났다. 책 읽기").unwrap();
        assert_eq!(nouns, vec!["서울", "개발자", "읽기"]);
    }

    #[test]
    fn hangul_strips_copula() {
        let nouns = HangulNounAnalyzer.nouns("철수는 학생이다").unwrap();
        assert_eq!(nouns, vec!["철수", "학생"]);
    }

    #[test]
    fn hangul_ignores_latin() {
        assert!(HangulNounAnalyzer.nouns("Go Go js").unwrap().is_empty());
    }

    #[test]
    fn mecab_output_keeps_noun_tags() {
        let out = "고양이\tNNG,*,F,고양이,*,*,*,*\n가\tJKS,*,F,가,*,*,*,*\n서울\tNNP,지명,T,서울,*,*,*,*\nEOS\n";
        assert_eq!(parse_mecab_nouns(out).unwrap(), vec!["고양이", "서울"]);
    }

    #[test]
    fn mecab_output_without_tab_is_malformed() {
        assert!(matches!(parse_mecab_nouns("garbage\n"), Err(AnalyzerError::Malformed(_))));
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let analyzer = CommandAnalyzer::new("/nonexistent/quill-mecab", vec![], Duration::from_millis(200));
        assert!(matches!(analyzer.nouns("고양이"), Err(AnalyzerError::Spawn(_))));
    }

    #[cfg(unix)]
    #[test]
    fn stalled_child_is_killed_at_deadline() {
        // `sleep` never reads stdin, and the input is larger than a pipe buffer.
        let analyzer = CommandAnalyzer::new("sleep", vec!["3".into()], Duration::from_millis(100));
        let started = Instant::now();
        let result = analyzer.nouns(&"가".repeat(200_000));
        assert!(matches!(result, Err(AnalyzerError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[cfg(unix)]
    #[test]
    fn echoing_child_output_is_parsed() {
        let script = "cat >/dev/null; printf '서울\\tNNP,*\\n에\\tJKB,*\\nEOS\\n'";
        let analyzer = CommandAnalyzer::new("sh", vec!["-c".into(), script.into()], Duration::from_secs(5));
        assert_eq!(analyzer.nouns("서울에").unwrap(), vec!["서울"]);
    }

    #[test]
    fn analyzer_kind_parses() {
        assert_eq!("Hangul".parse::<AnalyzerKind>().unwrap(), AnalyzerKind::Hangul);
        assert_eq!("mecab".parse::<AnalyzerKind>().unwrap(), AnalyzerKind::Command);
        assert!("bogus".parse::<AnalyzerKind>().is_err());
    }
}
