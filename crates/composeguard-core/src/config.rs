use crate::rules::{is_known_rule, suggest_rule, RuleTables};
use crate::scanner::patterns::PatternSpec;
use crate::scanner::{BatchOptions, ScanOptions, ScannerConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Rules switched off by the lenient profile.
const LENIENT_DISABLED: &[&str] = &["recommend-seccomp", "recommend-read-only"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Strict,
    Lenient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSetting {
    On,
    Off,
}

/// Engine configuration loaded from `.composeguard.toml` (or JSON).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub profile: Profile,
    /// Per-rule overrides keyed by rule id. Unknown ids are ignored.
    pub rules: BTreeMap<String, RuleSetting>,
    pub scanner: ScannerSection,
    pub tables: RuleTables,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerSection {
    pub ignore_test_values: bool,
    pub disable_builtin: bool,
    /// Path substrings skipped by batch scans.
    pub ignore: Vec<String>,
    pub patterns: Vec<PatternSpec>,
}

impl EngineConfig {
    /// An explicit override wins; otherwise the profile decides.
    pub fn is_enabled(&self, rule: &str) -> bool {
        match self.rules.get(rule) {
            Some(RuleSetting::On) => true,
            Some(RuleSetting::Off) => false,
            None => !(self.profile == Profile::Lenient && LENIENT_DISABLED.contains(&rule)),
        }
    }

    /// Override ids that no evaluator emits, each with the closest known id.
    pub fn unknown_rules(&self) -> Vec<(&str, Option<&'static str>)> {
        self.rules
            .keys()
            .filter(|id| !is_known_rule(id))
            .map(|id| (id.as_str(), suggest_rule(id)))
            .collect()
    }

    pub fn ignore_test_values(&self) -> bool {
        self.scanner.ignore_test_values || self.profile == Profile::Lenient
    }

    pub fn scanner_config(&self) -> ScannerConfig {
        ScannerConfig {
            custom_patterns: self.scanner.patterns.clone(),
            disable_builtin: self.scanner.disable_builtin,
        }
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            patterns: None,
            ignore_test_values: self.ignore_test_values(),
        }
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            ignore: self.scanner.ignore.clone(),
            scan: self.scan_options(),
        }
    }
}

/// Load configuration from disk. `.json` files are read as JSON, anything
/// else as TOML.
pub fn load_config(path: &Path) -> anyhow::Result<EngineConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let config: EngineConfig = if is_json {
        serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?
    } else {
        toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?
    };

    tracing::debug!(path = %path.display(), profile = ?config.profile, overrides = config.rules.len(), "config loaded");
    Ok(config)
}

/// Starter `.composeguard.toml`.
pub fn generate_default_config() -> String {
    r#"# composeguard configuration

# "strict" enables every rule; "lenient" skips recommend-seccomp and
# recommend-read-only and ignores obvious test values in the scanner.
profile = "strict"

[rules]
# Switch individual rules "on" or "off"
# recommend-resource-limits = "off"

[scanner]
ignore_test_values = false
disable_builtin = false
ignore = ["node_modules/", "target/", ".git/"]

# Extra secret patterns
# [[scanner.patterns]]
# name = "internal_token"
# regex = "itk_[a-z0-9]{32}"
# severity = "high"
# exclude = []

# [tables]
# dangerous_capabilities = ["SYS_ADMIN", "NET_ADMIN", "SYS_PTRACE", "SYS_MODULE"]
# database_images = ["postgres", "mysql", "mariadb", "mongo", "redis"]
# database_ports = [5432, 3306, 27017, 6379]
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Severity;
    use std::io::Write;

    #[test]
    fn test_default_config_enables_everything() {
        let config = EngineConfig::default();
        assert_eq!(config.profile, Profile::Strict);
        assert!(config.is_enabled("recommend-seccomp"));
        assert!(config.is_enabled("no-privileged"));
        assert!(!config.ignore_test_values());
    }

    #[test]
    fn test_lenient_profile() {
        let config: EngineConfig = toml::from_str("profile = \"lenient\"\n").unwrap();
        assert!(!config.is_enabled("recommend-seccomp"));
        assert!(!config.is_enabled("recommend-read-only"));
        assert!(config.is_enabled("no-privileged"));
        assert!(config.ignore_test_values());
    }

    #[test]
    fn test_override_beats_profile() {
        let config: EngineConfig = toml::from_str(
            "profile = \"lenient\"\n[rules]\nrecommend-seccomp = \"on\"\nno-host-network = \"off\"\n",
        )
        .unwrap();
        assert!(config.is_enabled("recommend-seccomp"));
        assert!(!config.is_enabled("no-host-network"));
    }

    #[test]
    fn test_unknown_rules_with_hint() {
        let config: EngineConfig =
            toml::from_str("[rules]\nno-privilegd = \"off\"\nzzz = \"off\"\n").unwrap();
        let unknown = config.unknown_rules();
        assert_eq!(unknown.len(), 2);
        assert!(unknown.contains(&("no-privilegd", Some("no-privileged"))));
        assert!(unknown.contains(&("zzz", None)));
    }

    #[test]
    fn test_scanner_section() {
        let config: EngineConfig = toml::from_str(
            r#"
[scanner]
ignore = ["vendor/"]

[[scanner.patterns]]
name = "internal_token"
regex = "itk_[a-z0-9]{32}"
severity = "high"
"#,
        )
        .unwrap();
        let scanner = config.scanner_config();
        assert_eq!(scanner.custom_patterns.len(), 1);
        assert_eq!(scanner.custom_patterns[0].severity, Severity::High);
        assert_eq!(config.batch_options().ignore, vec!["vendor/"]);
    }

    #[test]
    fn test_tables_override() {
        let config: EngineConfig =
            toml::from_str("[tables]\ndatabase_images = [\"cockroach\"]\n").unwrap();
        assert_eq!(config.tables.database_images, vec!["cockroach"]);
        assert!(!config.tables.dangerous_capabilities.is_empty());
    }

    #[test]
    fn test_load_config_toml_and_json() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join(".composeguard.toml");
        std::fs::write(&toml_path, "profile = \"lenient\"\n").unwrap();
        assert_eq!(load_config(&toml_path).unwrap().profile, Profile::Lenient);

        let json_path = dir.path().join("composeguard.json");
        let mut file = std::fs::File::create(&json_path).unwrap();
        writeln!(file, r#"{{"rules": {{"no-privileged": "off"}}}}"#).unwrap();
        assert!(!load_config(&json_path).unwrap().is_enabled("no-privileged"));
    }

    #[test]
    fn test_load_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(load_config(&missing).unwrap_err().to_string().contains("Failed to read"));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "profile = \"paranoid\"\n").unwrap();
        assert!(load_config(&bad).unwrap_err().to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_generated_config_parses() {
        let config: EngineConfig = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.profile, Profile::Strict);
        assert_eq!(config.scanner.ignore.len(), 3);
    }
}
