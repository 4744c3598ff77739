use crate::report::Severity;
use serde::{Deserialize, Serialize};

/// A named, severity-tagged detection expression.
///
/// Built-in patterns and caller-supplied ones share this shape. `exclude`
/// expressions are matched against the whole line the match sits on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSpec {
    pub name: String,
    pub regex: String,
    pub severity: Severity,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl PatternSpec {
    pub fn new(name: impl Into<String>, regex: impl Into<String>, severity: Severity) -> Self {
        Self {
            name: name.into(),
            regex: regex.into(),
            severity,
            exclude: Vec::new(),
            description: None,
        }
    }

    pub fn with_exclude(mut self, exclude: impl Into<String>) -> Self {
        self.exclude.push(exclude.into());
        self
    }
}

pub(crate) struct BuiltinPattern {
    pub name: &'static str,
    pub description: &'static str,
    pub regex: &'static str,
    pub severity: Severity,
    pub exclude: &'static [&'static str],
}

impl BuiltinPattern {
    pub fn to_spec(&self) -> PatternSpec {
        PatternSpec {
            name: self.name.to_string(),
            regex: self.regex.to_string(),
            severity: self.severity,
            exclude: self.exclude.iter().map(|e| e.to_string()).collect(),
            description: Some(self.description.to_string()),
        }
    }
}

// Every repetition is bounded so pathological lines stay cheap.
pub(crate) const BUILTIN_PATTERNS: &[BuiltinPattern] = &[
    BuiltinPattern {
        name: "aws_access_key",
        description: "AWS access key ID",
        regex: r"\b(?:AKIA|ASIA)[0-9A-Z]{16}\b",
        severity: Severity::Critical,
        exclude: &[],
    },
    BuiltinPattern {
        name: "aws_secret_key",
        description: "AWS secret access key assignment",
        regex: r#"(?i)aws[_-]?secret[_-]?(?:access[_-]?)?key["']?\s{0,5}[:=]\s{0,5}["']?[A-Za-z0-9/+=]{40}\b"#,
        severity: Severity::Critical,
        exclude: &[],
    },
    BuiltinPattern {
        name: "github_token",
        description: "GitHub token",
        regex: r"\bgh[pousr]_[A-Za-z0-9]{36,255}\b",
        severity: Severity::Critical,
        exclude: &[],
    },
    BuiltinPattern {
        name: "slack_token",
        description: "Slack API token",
        regex: r"\bxox[baprs]-[A-Za-z0-9-]{10,72}",
        severity: Severity::High,
        exclude: &[],
    },
    BuiltinPattern {
        name: "slack_webhook",
        description: "Slack incoming webhook URL",
        regex: r"https://hooks\.slack\.com/services/T[A-Z0-9]{1,16}/B[A-Z0-9]{1,16}/[A-Za-z0-9]{1,48}",
        severity: Severity::High,
        exclude: &[],
    },
    BuiltinPattern {
        name: "stripe_key",
        description: "Stripe live secret key",
        regex: r"\b[sr]k_live_[A-Za-z0-9]{24,99}\b",
        severity: Severity::Critical,
        exclude: &[],
    },
    BuiltinPattern {
        name: "google_api_key",
        description: "Google API key",
        regex: r"\bAIza[0-9A-Za-z_\-]{35}",
        severity: Severity::High,
        exclude: &[],
    },
    BuiltinPattern {
        name: "private_key",
        description: "Private key block",
        regex: r"-----BEGIN (?:RSA |EC |DSA |OPENSSH |ENCRYPTED )?PRIVATE KEY-----",
        severity: Severity::Critical,
        exclude: &[],
    },
    BuiltinPattern {
        name: "jwt",
        description: "JSON Web Token",
        regex: r"\beyJ[A-Za-z0-9_-]{10,512}\.eyJ[A-Za-z0-9_-]{10,1024}\.[A-Za-z0-9_-]{10,512}",
        severity: Severity::Medium,
        exclude: &[],
    },
    BuiltinPattern {
        name: "database_url",
        description: "Connection string with embedded credentials",
        regex: r"(?i)\b(?:postgres(?:ql)?|mysql|mariadb|mongodb(?:\+srv)?|redis|amqps?)://[^:/\s@]{1,64}:[^@/\s]{3,128}@",
        severity: Severity::High,
        exclude: &[],
    },
    BuiltinPattern {
        name: "password_assignment",
        description: "Hardcoded password",
        regex: r#"(?i)[a-z0-9_]{0,32}(?:password|passwd|pwd)[a-z0-9_]{0,16}["']?\s{0,5}[:=]\s{0,5}["'][^"'\s]{4,128}["']"#,
        severity: Severity::High,
        exclude: &[
            r"(?i)process\.env|os\.environ|getenv",
            r"%\([A-Za-z_]{1,32}\)s",
        ],
    },
    BuiltinPattern {
        name: "generic_api_key",
        description: "Hardcoded API key or token",
        regex: r#"(?i)[a-z0-9_]{0,32}(?:api[_-]?key|secret[_-]?key|access[_-]?token|auth[_-]?token|client[_-]?secret)[a-z0-9_]{0,16}["']?\s{0,5}[:=]\s{0,5}["'][A-Za-z0-9+/=_.\-]{16,128}["']"#,
        severity: Severity::High,
        exclude: &[],
    },
];

/// Checked against the full line of every match.
pub(crate) const GLOBAL_FALSE_POSITIVES: &[&str] = &[
    r"process\.env\.",
    r"(?i)\bos\.(?:environ|getenv)\b",
    r"(?i)\bgetenv\s{0,3}\(",
    r"\bENV\[",
    r"\$\{[^}\n]{0,256}\}",
    r"\$[A-Z_][A-Z0-9_]{2,64}\b",
    r"\{\{\s{0,3}secrets\.",
    r"(?i)\bYOUR_[A-Z0-9_]{0,64}_HERE\b",
    r"(?i)placeholder",
    r"-----BEGIN (?:RSA )?PUBLIC KEY-----",
    r"-----BEGIN CERTIFICATE-----",
];

/// Checked against the matched text only.
pub(crate) const VALUE_FALSE_POSITIVES: &[&str] = &[
    r"(?i)x{6,}",
    r"\*{4,}",
    r"0{8,}",
    r"<[A-Za-z0-9_ -]{1,64}>",
];

pub(crate) const TEST_VALUE: &str = r"(?i)test|example|sample|demo";
