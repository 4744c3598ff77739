pub mod patterns;

use crate::error::PatternError;
use crate::report::Severity;
use patterns::{PatternSpec, BUILTIN_PATTERNS, GLOBAL_FALSE_POSITIVES, TEST_VALUE, VALUE_FALSE_POSITIVES};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

const SNIPPET_MAX_CHARS: usize = 100;

/// One suspected secret in scanned text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternMatch {
    /// Name of the pattern that fired.
    #[serde(rename = "type")]
    pub kind: String,
    pub line: usize,
    /// 1-based, counted in characters.
    pub column: usize,
    pub severity: Severity,
    /// Trimmed source line, at most 100 characters.
    pub snippet: String,
}

/// How the scanner's pattern set is assembled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default, rename = "patterns")]
    pub custom_patterns: Vec<PatternSpec>,
    #[serde(default)]
    pub disable_builtin: bool,
}

/// Per-call scan options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Only run these patterns. `None` runs all of them.
    #[serde(default)]
    pub patterns: Option<Vec<String>>,
    #[serde(default)]
    pub ignore_test_values: bool,
}

impl ScanOptions {
    fn includes(&self, name: &str) -> bool {
        match &self.patterns {
            Some(names) => names.iter().any(|n| n == name),
            None => true,
        }
    }
}

/// Options for scanning many files at once.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Paths containing any of these substrings are skipped.
    pub ignore: Vec<String>,
    pub scan: ScanOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileScanResult {
    pub path: String,
    pub matches: Vec<PatternMatch>,
}

/// Result of a batch scan. `files` only lists files with matches, sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchScanResult {
    pub files: Vec<FileScanResult>,
    pub files_scanned: usize,
    pub files_with_findings: usize,
    pub total_matches: usize,
}

struct CompiledPattern {
    name: String,
    severity: Severity,
    regex: Regex,
    exclude: Vec<Regex>,
}

/// Regex-based secret detector with layered false-positive suppression.
pub struct SecretScanner {
    patterns: Vec<CompiledPattern>,
    global_false_positives: Vec<Regex>,
    value_false_positives: Vec<Regex>,
    test_value: Regex,
}

impl SecretScanner {
    /// Build a scanner with the built-in pattern set.
    pub fn with_builtins() -> Result<Self, PatternError> {
        Self::new(&ScannerConfig::default())
    }

    /// Build a scanner from configuration. Custom patterns are compiled here,
    /// so a malformed expression fails before any scan runs.
    pub fn new(config: &ScannerConfig) -> Result<Self, PatternError> {
        let mut specs: Vec<PatternSpec> = Vec::new();
        if !config.disable_builtin {
            specs.extend(BUILTIN_PATTERNS.iter().map(|p| p.to_spec()));
        }
        specs.extend(config.custom_patterns.iter().cloned());

        let mut seen = HashSet::new();
        let mut patterns = Vec::with_capacity(specs.len());
        for spec in specs {
            if !seen.insert(spec.name.clone()) {
                return Err(PatternError::DuplicateName(spec.name));
            }
            patterns.push(compile(spec)?);
        }

        Ok(Self {
            patterns,
            global_false_positives: compile_internal("global_false_positive", GLOBAL_FALSE_POSITIVES)?,
            value_false_positives: compile_internal("value_false_positive", VALUE_FALSE_POSITIVES)?,
            test_value: Regex::new(TEST_VALUE).map_err(|source| PatternError::InvalidRegex {
                name: "test_value".to_string(),
                source,
            })?,
        })
    }

    pub fn pattern_names(&self) -> Vec<&str> {
        self.patterns.iter().map(|p| p.name.as_str()).collect()
    }

    /// Scan text and return unsuppressed matches ordered by position.
    pub fn scan(&self, content: &str, options: &ScanOptions) -> Vec<PatternMatch> {
        let lines = LineIndex::new(content);
        let mut matches = Vec::new();

        for pattern in self.patterns.iter().filter(|p| options.includes(&p.name)) {
            for m in pattern.regex.find_iter(content) {
                let (line_no, line_start) = lines.locate(m.start());
                let line = lines.line_text(content, line_no);

                if let Some(reason) = self.suppression(pattern, line, m.as_str(), options) {
                    tracing::trace!(pattern = %pattern.name, line = line_no, reason, "suppressed match");
                    continue;
                }

                matches.push(PatternMatch {
                    kind: pattern.name.clone(),
                    line: line_no,
                    column: content[line_start..m.start()].chars().count() + 1,
                    severity: pattern.severity,
                    snippet: line.trim().chars().take(SNIPPET_MAX_CHARS).collect(),
                });
            }
        }

        matches.sort_by_key(|m| (m.line, m.column));
        matches
    }

    /// Whether `text` contains at least one unsuppressed match.
    pub fn is_match(&self, text: &str, options: &ScanOptions) -> bool {
        !self.scan(text, options).is_empty()
    }

    /// True when the line is a known-safe shape: env lookups, interpolation,
    /// placeholders or public key material.
    pub fn is_false_positive_line(&self, line: &str) -> bool {
        self.global_false_positives.iter().any(|re| re.is_match(line))
    }

    /// Suppression layers, first hit wins.
    fn suppression(
        &self,
        pattern: &CompiledPattern,
        line: &str,
        matched: &str,
        options: &ScanOptions,
    ) -> Option<&'static str> {
        if pattern.exclude.iter().any(|re| re.is_match(line)) {
            return Some("pattern exclude");
        }
        if self.is_false_positive_line(line) {
            return Some("global false positive");
        }
        if self.value_false_positives.iter().any(|re| re.is_match(matched)) {
            return Some("filler value");
        }
        if options.ignore_test_values && self.test_value.is_match(matched) {
            return Some("test value");
        }
        None
    }

    /// Scan a path→content map. Ignored paths are not counted.
    pub fn scan_files(&self, files: &BTreeMap<String, String>, options: &BatchOptions) -> BatchScanResult {
        let mut result = BatchScanResult::default();
        let mut scanned: Vec<(String, Vec<PatternMatch>)> = Vec::new();

        for (path, content) in files {
            let normalized = normalize_path(path);
            if is_ignored(&normalized, &options.ignore) {
                tracing::debug!(path = %normalized, "skipping ignored path");
                continue;
            }
            scanned.push((normalized, self.scan(content, &options.scan)));
        }

        scanned.sort_by(|a, b| a.0.cmp(&b.0));
        for (path, matches) in scanned {
            result.files_scanned += 1;
            if !matches.is_empty() {
                result.files_with_findings += 1;
                result.total_matches += matches.len();
                result.files.push(FileScanResult { path, matches });
            }
        }
        result
    }

    /// Scan files through a caller-supplied reader.
    ///
    /// Files the reader fails on are skipped and left out of the totals.
    pub fn scan_paths<P, F>(&self, paths: &[P], options: &BatchOptions, mut read: F) -> BatchScanResult
    where
        P: AsRef<Path>,
        F: FnMut(&Path) -> std::io::Result<String>,
    {
        let mut files = BTreeMap::new();
        for path in paths {
            let path = path.as_ref();
            let normalized = normalize_path(&path.to_string_lossy());
            if is_ignored(&normalized, &options.ignore) {
                continue;
            }
            match read(path) {
                Ok(content) => {
                    files.insert(normalized, content);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to read file, skipping");
                }
            }
        }
        self.scan_files(&files, options)
    }
}

fn compile(spec: PatternSpec) -> Result<CompiledPattern, PatternError> {
    let regex = Regex::new(&spec.regex).map_err(|source| PatternError::InvalidRegex {
        name: spec.name.clone(),
        source,
    })?;
    let exclude = spec
        .exclude
        .iter()
        .map(|e| Regex::new(e))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| PatternError::InvalidExclude {
            name: spec.name.clone(),
            source,
        })?;
    Ok(CompiledPattern {
        name: spec.name,
        severity: spec.severity,
        regex,
        exclude,
    })
}

fn compile_internal(name: &str, sources: &[&str]) -> Result<Vec<Regex>, PatternError> {
    sources
        .iter()
        .map(|s| Regex::new(s))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| PatternError::InvalidRegex {
            name: name.to_string(),
            source,
        })
}

fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut trimmed = unified.as_str();
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest;
    }
    trimmed.to_string()
}

fn is_ignored(path: &str, ignore: &[String]) -> bool {
    ignore.iter().any(|pattern| !pattern.is_empty() && path.contains(pattern.as_str()))
}

/// Byte offsets of line starts, for offset → (line, line start) lookups.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(content: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(content.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    /// 1-based line number and byte offset of that line's start.
    fn locate(&self, offset: usize) -> (usize, usize) {
        let idx = self.starts.partition_point(|&s| s <= offset) - 1;
        (idx + 1, self.starts[idx])
    }

    fn line_text<'a>(&self, content: &'a str, line_no: usize) -> &'a str {
        let start = self.starts[line_no - 1];
        let end = self
            .starts
            .get(line_no)
            .map(|&next| next - 1)
            .unwrap_or(content.len());
        content[start..end].trim_end_matches('\r')
    }
}
