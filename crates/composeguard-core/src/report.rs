use crate::topology::Topology;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Severity level for findings. Declaration order is rank order, so
/// `Critical < High < ... < Info` under `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    /// Points deducted from the report score per finding.
    pub fn weight(&self) -> u32 {
        match self {
            Severity::Critical => 25,
            Severity::High => 15,
            Severity::Medium => 10,
            Severity::Low => 5,
            Severity::Info => 0,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
            Severity::Info => "INFO",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            "info" => Ok(Severity::Info),
            other => Err(format!(
                "unknown severity '{}' (expected critical, high, medium, low or info)",
                other
            )),
        }
    }
}

/// A single rule violation or recommendation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub rule: String,
    pub severity: Severity,
    /// Service the finding applies to, if any.
    pub scope: Option<String>,
    pub message: String,
    pub fix: String,
    /// 1-based source line, set for findings against line-oriented input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl Finding {
    pub fn new(
        rule: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
        fix: impl Into<String>,
    ) -> Self {
        Self {
            rule: rule.into(),
            severity,
            scope: None,
            message: message.into(),
            fix: fix.into(),
            line: None,
        }
    }

    pub fn for_service(mut self, service: impl Into<String>) -> Self {
        self.scope = Some(service.into());
        self
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

/// Number of findings per severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeveritySummary {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
}

impl SeveritySummary {
    pub fn from_findings(findings: &[Finding]) -> Self {
        let mut summary = Self::default();
        for finding in findings {
            summary.add(finding.severity);
        }
        summary
    }

    fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
            Severity::Info => self.info += 1,
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Info => self.info,
        }
    }

    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low + self.info
    }
}

/// The complete, scored result of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub findings: Vec<Finding>,
    pub score: u8,
    pub summary: SeveritySummary,
    pub recommendations: Vec<Finding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology: Option<Topology>,
}

impl Report {
    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = Some(topology);
        self
    }

    /// True when at least one finding is at or above `threshold`.
    pub fn exceeds(&self, threshold: Severity) -> bool {
        self.findings.iter().any(|f| f.severity <= threshold)
    }

    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn findings_for<'a>(&'a self, service: &'a str) -> impl Iterator<Item = &'a Finding> + 'a {
        self.findings
            .iter()
            .filter(move |f| f.scope.as_deref() == Some(service))
    }
}

/// Severity-weighted score in `[0, 100]`. Info findings are free.
pub fn score(findings: &[Finding]) -> u8 {
    let penalty: u32 = findings.iter().map(|f| f.severity.weight()).sum();
    100u32.saturating_sub(penalty) as u8
}

/// Merge evaluator outputs into a single report.
///
/// Findings keep their input order. Recommendations hold the first finding
/// seen for each rule id, stable-sorted by severity.
pub fn aggregate<I>(groups: I) -> Report
where
    I: IntoIterator<Item = Vec<Finding>>,
{
    let findings: Vec<Finding> = groups.into_iter().flatten().collect();

    let recommendations = {
        let mut seen = HashSet::new();
        let mut firsts: Vec<Finding> = findings
            .iter()
            .filter(|f| seen.insert(f.rule.as_str()))
            .cloned()
            .collect();
        firsts.sort_by_key(|f| f.severity);
        firsts
    };

    Report {
        score: score(&findings),
        summary: SeveritySummary::from_findings(&findings),
        recommendations,
        findings,
        topology: None,
    }
}
