//! Syntax Detector
//!
//! Two-stage language guess for a code sample:
//! 1. A probabilistic [`Classifier`] proposes its top label. If the label's
//!    probability clears `min_confidence` and the label maps to a known ext,
//!    that ext wins.
//! 2. Otherwise the sample's prefix is tested against [`PREFIX_TABLE`], in
//!    order. Longer literals come before the shorter ones they overlap.
//!
//! The threshold is deliberately low; snippets pasted into chats are short.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Default classifier probability required to trust its guess
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.12;

/// Literal prefix -> ext, tested in order
pub const PREFIX_TABLE: &[(&str, &str)] = &[
    ("{", "json"),
    ("---\n", "yaml"),
    ("--- ", "diff"),
    ("-- ", "lua"),
    ("\\", "tex"),
    ("[[", "toml"),
    ("[", "ini"),
    ("<?php", "php"),
    ("<", "xml"),
];

/// Probability distribution over language labels
pub trait Classifier: Send + Sync {
    /// Label probabilities, most likely first
    fn probabilities(&self, sample: &str) -> Vec<(String, f64)>;
}

/// How a detection was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMethod {
    Classifier,
    Heuristic,
    None,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classifier => "classifier",
            Self::Heuristic => "heuristic",
            Self::None => "none",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Syntax ext, e.g. `py`
    pub language: Option<String>,
    /// In [0, 1]
    pub confidence: f64,
    pub method: DetectionMethod,
}

impl Detection {
    fn none() -> Self {
        Self {
            language: None,
            confidence: 0.0,
            method: DetectionMethod::None,
        }
    }
}

/// First matching entry of [`PREFIX_TABLE`]
pub fn prefix_guess(sample: &str) -> Option<&'static str> {
    PREFIX_TABLE
        .iter()
        .find(|(prefix, _)| sample.starts_with(prefix))
        .map(|(_, ext)| *ext)
}

/// Classifier + prefix-table language detector
#[derive(Clone)]
pub struct SyntaxDetector {
    classifier: Arc<dyn Classifier>,
    labels: HashMap<String, String>,
    min_confidence: f64,
}

impl SyntaxDetector {
    /// `labels` maps classifier labels to syntax exts
    pub fn new(classifier: Arc<dyn Classifier>, labels: HashMap<String, String>) -> Self {
        Self {
            classifier,
            labels,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence.clamp(0.0, 1.0);
        self
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    /// Detect with the configured threshold
    pub fn detect(&self, sample: &str) -> Detection {
        self.detect_with(sample, self.min_confidence)
    }

    pub fn detect_with(&self, sample: &str, min_confidence: f64) -> Detection {
        let distribution = self.classifier.probabilities(sample);
        debug!(distribution = ?distribution, "classifier distribution");

        if let Some((label, probability)) = distribution.first() {
            let ext = self.labels.get(label);
            debug!(
                label = %label,
                probability,
                min_confidence,
                ext = ?ext,
                "guessed syntax"
            );
            if *probability >= min_confidence {
                if let Some(ext) = ext {
                    return Detection {
                        language: Some(ext.clone()),
                        confidence: probability.clamp(0.0, 1.0),
                        method: DetectionMethod::Classifier,
                    };
                }
            }
        }

        match prefix_guess(sample) {
            Some(ext) => {
                debug!(ext, "simple-guessed syntax");
                Detection {
                    language: Some(ext.to_string()),
                    confidence: 1.0,
                    method: DetectionMethod::Heuristic,
                }
            }
            None => Detection::none(),
        }
    }
}

// ============ Keyword Classifier ============

/// Smoothing mass so that a single weak hit stays below certainty
const PRIOR_MASS: f64 = 4.0;

/// Per-pattern hit cap, keeps one repeated token from dominating
const MAX_HITS_PER_PATTERN: usize = 3;

struct Signature {
    label: &'static str,
    patterns: Vec<(Regex, f64)>,
}

fn signature(label: &'static str, patterns: &[(&str, f64)]) -> Signature {
    Signature {
        label,
        patterns: patterns
            .iter()
            .map(|(p, w)| (Regex::new(p).expect("invalid signature pattern"), *w))
            .collect(),
    }
}

static SIGNATURES: Lazy<Vec<Signature>> = Lazy::new(|| {
    vec![
        signature("Python", &[
            (r"(?m)^\s*def \w+\(.*\)\s*(->\s*[\w\[\], ]+)?:\s*$", 3.0),
            (r"(?m)^\s*(import \w+|from [\w.]+ import \w+)", 2.0),
            (r"\bself\.", 1.0),
            (r"\belif\b", 2.0),
            (r"\bprint\(", 0.5),
            (r"(?m)^\s*@\w+", 0.5),
            (r"\bNone\b", 1.0),
        ]),
        signature("Rust", &[
            (r"\bfn \w+(<[^>]*>)?\(", 3.0),
            (r"\blet mut\b", 2.0),
            (r"(?m)^\s*impl\b", 2.0),
            (r"\w+!\(", 1.0),
            (r"\bpub (fn|struct|enum|mod|trait)\b", 2.0),
            (r"&mut \w+", 1.0),
            (r"(?m)^\s*use \w+::", 2.0),
        ]),
        signature("JavaScript", &[
            (r"\bfunction\s*\w*\s*\(", 2.0),
            (r"\b(const|let) \w+ = ", 1.0),
            (r"=>", 1.0),
            (r"console\.log\(", 3.0),
            (r"\bvar \w+", 1.0),
            (r"===", 1.5),
            (r"\brequire\(['\x22]", 2.0),
        ]),
        signature("TypeScript", &[
            (r":\s*(string|number|boolean|void)\b", 2.0),
            (r"\binterface \w+\s*\{", 2.0),
            (r"\bexport (type|interface)\b", 3.0),
        ]),
        signature("Go", &[
            (r"(?m)^package \w+", 3.0),
            (r"\bfunc (\(\w+ \*?\w+\) )?\w+\(", 3.0),
            (r":=", 1.0),
            (r"\bfmt\.\w+", 2.0),
        ]),
        signature("C", &[
            (r"#include\s*<\w+\.h>", 3.0),
            (r"\bprintf\(", 1.5),
            (r"\bint main\(", 2.0),
            (r"\bmalloc\(", 2.0),
        ]),
        signature("C++", &[
            (r"#include\s*<\w+>", 3.0),
            (r"\bstd::", 2.0),
            (r"\bcout\b", 2.0),
            (r"\btemplate\s*<", 2.0),
        ]),
        signature("Java", &[
            (r"\bpublic (static )?(class|void|final)\b", 3.0),
            (r"System\.out\.print", 3.0),
            (r"(?m)^import java\.", 3.0),
        ]),
        signature("Shell", &[
            (r"^#!/(usr/)?bin/(env )?(ba|z)?sh", 4.0),
            (r"(?m)^\s*echo\b", 1.0),
            (r"\$\{\w+\}", 1.0),
            (r"(?m)^\s*fi\s*$", 2.0),
            (r";\s*then\b", 2.0),
        ]),
        signature("Ruby", &[
            (r"(?m)^\s*def \w+[?!]?\s*$", 2.0),
            (r"(?m)^\s*end\s*$", 1.0),
            (r"\bputs\b", 2.0),
            (r"(?m)^require '", 2.0),
            (r"\.each do\b", 2.0),
        ]),
        signature("PHP", &[
            (r"<\?php", 4.0),
            (r"\$\w+\s*=", 1.0),
            (r"\$this->", 2.0),
        ]),
        signature("SQL", &[
            (r"(?is)\bselect\b.+\bfrom\b", 3.0),
            (r"(?i)\binsert into\b", 3.0),
            (r"(?i)\bcreate table\b", 3.0),
            (r"(?i)\bwhere\b", 0.5),
        ]),
        signature("HTML", &[
            (r"(?i)<(html|head|body|div|span|p|a)\b", 2.0),
            (r"(?i)<!doctype html", 4.0),
        ]),
        signature("CSS", &[
            (r"(?m)^\s*[.#]?[\w-]+(\s*[>,]?\s*[.#]?[\w-]+)*\s*\{\s*$", 1.0),
            (r"(?m)^\s*(color|margin|padding|display|font-[\w-]+|background)\s*:[^;]+;", 2.0),
        ]),
    ]
});

/// Keyword/regex scoring classifier.
///
/// Each label has weighted patterns; a label's score is the weighted hit
/// count, and scores are normalised against their sum plus a fixed prior so
/// that sparse evidence produces low probabilities.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    fn scores(&self, sample: &str) -> Vec<(&'static str, f64)> {
        SIGNATURES
            .iter()
            .map(|sig| {
                let score = sig
                    .patterns
                    .iter()
                    .map(|(re, weight)| {
                        re.find_iter(sample).take(MAX_HITS_PER_PATTERN).count() as f64 * weight
                    })
                    .sum::<f64>();
                (sig.label, score)
            })
            .filter(|(_, score)| *score > 0.0)
            .collect()
    }
}

impl Classifier for KeywordClassifier {
    fn probabilities(&self, sample: &str) -> Vec<(String, f64)> {
        let scores = self.scores(sample);
        let total: f64 = scores.iter().map(|(_, s)| s).sum::<f64>() + PRIOR_MASS;

        let mut distribution: Vec<(String, f64)> = scores
            .into_iter()
            .map(|(label, score)| (label.to_string(), score / total))
            .collect();
        distribution.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        distribution
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Always answers with one fixed label and probability
    struct FixedClassifier(&'static str, f64);

    impl Classifier for FixedClassifier {
        fn probabilities(&self, _sample: &str) -> Vec<(String, f64)> {
            vec![(self.0.to_string(), self.1)]
        }
    }

    fn labels() -> HashMap<String, String> {
        [("Python", "py"), ("Rust", "rs"), ("PHP", "php")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn detector(label: &'static str, p: f64) -> SyntaxDetector {
        SyntaxDetector::new(Arc::new(FixedClassifier(label, p)), labels())
    }

    #[test]
    fn test_confident_classifier_wins() {
        let d = detector("Python", 0.5).detect("{ looks like json }");
        assert_eq!(d.language.as_deref(), Some("py"));
        assert_eq!(d.method, DetectionMethod::Classifier);
        assert_eq!(d.confidence, 0.5);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let d = detector("Rust", DEFAULT_MIN_CONFIDENCE).detect("fn main() {}");
        assert_eq!(d.language.as_deref(), Some("rs"));
        assert_eq!(d.method, DetectionMethod::Classifier);
    }

    #[test]
    fn test_low_confidence_falls_back_to_prefix() {
        let d = detector("Python", 0.05).detect("{\"a\": 1}");
        assert_eq!(d.language.as_deref(), Some("json"));
        assert_eq!(d.method, DetectionMethod::Heuristic);
    }

    #[test]
    fn test_php_prefix_beats_xml() {
        let d = detector("Python", 0.01).detect("<?php echo 'hi'; ?>");
        assert_eq!(d.language.as_deref(), Some("php"));
        assert_eq!(d.method, DetectionMethod::Heuristic);
    }

    #[test]
    fn test_toml_prefix_beats_ini() {
        assert_eq!(prefix_guess("[[bin]]\nname = \"x\""), Some("toml"));
        assert_eq!(prefix_guess("[section]\nkey=value"), Some("ini"));
    }

    #[test]
    fn test_dash_prefixes() {
        assert_eq!(prefix_guess("---\nkey: value"), Some("yaml"));
        assert_eq!(prefix_guess("--- a/file\n+++ b/file"), Some("diff"));
        assert_eq!(prefix_guess("-- comment\nlocal x = 1"), Some("lua"));
        assert_eq!(prefix_guess("\\documentclass{article}"), Some("tex"));
        assert_eq!(prefix_guess("<root/>"), Some("xml"));
    }

    #[test]
    fn test_no_match_returns_none() {
        let d = detector("Python", 0.01).detect("hello there");
        assert_eq!(d, Detection::none());
        assert_eq!(d.method.as_str(), "none");
    }

    #[test]
    fn test_unmapped_label_falls_through() {
        let d = detector("Brainfuck", 0.9).detect("[-]>+");
        assert_eq!(d.language.as_deref(), Some("ini"));
        assert_eq!(d.method, DetectionMethod::Heuristic);
    }

    #[test]
    fn test_keyword_classifier_python() {
        let sample = "import os\n\ndef main(args):\n    if args:\n        print(args)\n    elif os.environ:\n        return None\n";
        let dist = KeywordClassifier::new().probabilities(sample);
        assert_eq!(dist[0].0, "Python");
        assert!(dist[0].1 >= DEFAULT_MIN_CONFIDENCE);
        assert!(dist[0].1 < 1.0);
    }

    #[test]
    fn test_keyword_classifier_rust() {
        let sample = "use std::io;\n\npub fn main() {\n    let mut x = 1;\n    println!(\"{}\", x);\n}\n";
        let dist = KeywordClassifier::new().probabilities(sample);
        assert_eq!(dist[0].0, "Rust");
    }

    #[test]
    fn test_keyword_classifier_empty_for_prose() {
        let dist = KeywordClassifier::new().probabilities("just some words");
        assert!(dist.is_empty());
    }

    #[test]
    fn test_keyword_classifier_distribution_sorted() {
        let dist = KeywordClassifier::new().probabilities("<?php\n$x = 1;\necho $x;\n");
        assert_eq!(dist[0].0, "PHP");
        assert!(dist.windows(2).all(|w| w[0].1 >= w[1].1));
        assert!(dist.iter().map(|(_, p)| p).sum::<f64>() < 1.0);
    }
}
