use crate::config::EngineConfig;
use crate::error::{ParseError, PatternError};
use crate::parser::compose::ComposeParser;
use crate::parser::manifest::Manifest;
use crate::report::{aggregate, Finding, Report};
use crate::rules::network::{NetworkAnalysis, NetworkAnalyzer};
use crate::rules::secrets::SecretsEvaluator;
use crate::rules::service::ServiceRuleEvaluator;
use crate::scanner::{BatchScanResult, PatternMatch, SecretScanner};
use std::collections::BTreeMap;
use std::path::Path;

/// Runs every evaluator over a manifest and folds the results into a report.
///
/// Built once per configuration; custom scanner patterns are compiled in
/// [`Engine::new`], so analysis calls themselves cannot fail.
pub struct Engine {
    config: EngineConfig,
    services: ServiceRuleEvaluator,
    secrets: SecretsEvaluator,
    network: NetworkAnalyzer,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, PatternError> {
        for (id, hint) in config.unknown_rules() {
            match hint {
                Some(known) => {
                    tracing::debug!(rule = id, suggestion = known, "ignoring unknown rule override")
                }
                None => tracing::debug!(rule = id, "ignoring unknown rule override"),
            }
        }

        let scanner = SecretScanner::new(&config.scanner_config())?;
        let secrets = SecretsEvaluator::new(scanner).with_options(config.scan_options());

        Ok(Self {
            services: ServiceRuleEvaluator::new(config.tables.clone()),
            network: NetworkAnalyzer::new(config.tables.clone()),
            secrets,
            config,
        })
    }

    pub fn with_defaults() -> Result<Self, PatternError> {
        Self::new(EngineConfig::default())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Service, secrets and network findings, in that order, with disabled
    /// rules removed and the topology attached.
    pub fn validate(&self, manifest: &Manifest) -> Report {
        let analysis = self.network.analyze(manifest);
        let groups = [
            self.services.evaluate(manifest),
            self.secrets.evaluate_manifest(manifest),
            analysis.findings,
        ];

        let report = aggregate(groups.into_iter().map(|group| self.enabled(group)));
        tracing::debug!(
            services = manifest.services.len(),
            findings = report.findings.len(),
            score = report.score,
            "manifest validated"
        );
        report.with_topology(analysis.topology)
    }

    pub fn validate_str(&self, content: &str) -> Result<Report, ParseError> {
        let manifest = ComposeParser::parse(content)?;
        Ok(self.validate(&manifest))
    }

    pub fn validate_file(&self, path: &Path) -> anyhow::Result<Report> {
        let manifest = ComposeParser::parse_file(path)?;
        Ok(self.validate(&manifest))
    }

    pub fn validate_dockerfile(&self, content: &str) -> Report {
        aggregate([self.enabled(self.secrets.evaluate_dockerfile(content))])
    }

    /// Network findings and topology alone, honoring rule overrides.
    pub fn network_analysis(&self, manifest: &Manifest) -> NetworkAnalysis {
        let mut analysis = self.network.analyze(manifest);
        analysis.retain(|f| self.config.is_enabled(&f.rule));
        analysis
    }

    pub fn scan(&self, content: &str) -> Vec<PatternMatch> {
        self.secrets
            .scanner()
            .scan(content, &self.config.scan_options())
    }

    pub fn scan_files(&self, files: &BTreeMap<String, String>) -> BatchScanResult {
        self.secrets
            .scanner()
            .scan_files(files, &self.config.batch_options())
    }

    pub fn scan_paths<P: AsRef<Path>>(&self, paths: &[P]) -> BatchScanResult {
        self.secrets
            .scanner()
            .scan_paths(paths, &self.config.batch_options(), |p| std::fs::read_to_string(p))
    }

    fn enabled(&self, mut findings: Vec<Finding>) -> Vec<Finding> {
        findings.retain(|f| self.config.is_enabled(&f.rule));
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Profile, RuleSetting};
    use crate::report::Severity;
    use crate::scanner::patterns::PatternSpec;

    const HARDENED: &str = r#"
services:
  api:
    image: myorg/api:1.4
    read_only: true
    user: "1000:1000"
    cap_drop: [ALL]
    security_opt:
      - no-new-privileges:true
      - seccomp:./seccomp.json
    deploy:
      resources:
        limits:
          cpus: "0.5"
          memory: 256M
    networks: [backend]
networks:
  backend:
"#;

    const INSECURE: &str = r#"
services:
  web:
    image: nginx
    privileged: true
    network_mode: host
    environment:
      DB_PASSWORD: hunter2hunter2
"#;

    fn rules(report: &Report) -> Vec<&str> {
        report.findings.iter().map(|f| f.rule.as_str()).collect()
    }

    #[test]
    fn test_hardened_service_is_clean() {
        let engine = Engine::with_defaults().unwrap();
        let report = engine.validate_str(HARDENED).unwrap();
        assert!(report.is_clean(), "unexpected findings: {:?}", rules(&report));
        assert_eq!(report.score, 100);
        assert!(report.topology.is_some());
    }

    #[test]
    fn test_insecure_service_findings() {
        let engine = Engine::with_defaults().unwrap();
        let report = engine.validate_str(INSECURE).unwrap();
        let ids = rules(&report);
        assert!(ids.contains(&"no-privileged"));
        assert!(ids.contains(&"no-host-network"));
        assert!(ids.contains(&"hardcoded-secret"));
        assert!(ids.contains(&"prefer-docker-secrets"));
        assert_eq!(report.recommendations[0].severity, Severity::Critical);
        assert!(report.exceeds(Severity::Critical));
    }

    #[test]
    fn test_overrides_filter_findings() {
        let mut config = EngineConfig::default();
        config.rules.insert("no-privileged".into(), RuleSetting::Off);
        config.rules.insert("not-a-rule".into(), RuleSetting::Off);
        let engine = Engine::new(config).unwrap();

        let report = engine.validate_str(INSECURE).unwrap();
        assert!(!rules(&report).contains(&"no-privileged"));
        assert!(rules(&report).contains(&"no-host-network"));
    }

    #[test]
    fn test_lenient_profile_skips_recommendations() {
        let config = EngineConfig {
            profile: Profile::Lenient,
            ..Default::default()
        };
        let strict = Engine::with_defaults().unwrap().validate_str(INSECURE).unwrap();
        let lenient = Engine::new(config).unwrap().validate_str(INSECURE).unwrap();
        assert!(rules(&strict).contains(&"recommend-seccomp"));
        assert!(!rules(&lenient).contains(&"recommend-seccomp"));
        assert!(!rules(&lenient).contains(&"recommend-read-only"));
        assert!(lenient.score >= strict.score);
    }

    #[test]
    fn test_validation_is_deterministic() {
        let engine = Engine::with_defaults().unwrap();
        let first = engine.validate_str(INSECURE).unwrap();
        let second = engine.validate_str(INSECURE).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_parse_errors_surface() {
        let engine = Engine::with_defaults().unwrap();
        assert!(engine.validate_str("services: [a, b]").is_err());
        assert!(engine.validate_str("").unwrap().is_clean());
    }

    #[test]
    fn test_invalid_custom_pattern_fails_construction() {
        let mut config = EngineConfig::default();
        config
            .scanner
            .patterns
            .push(PatternSpec::new("broken", "([a-z", Severity::High));
        assert!(matches!(
            Engine::new(config),
            Err(PatternError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn test_dockerfile_validation() {
        let engine = Engine::with_defaults().unwrap();
        let report = engine.validate_dockerfile(
            "FROM alpine\nENV API_TOKEN=tok_9f8e7d6c5b4a3f2e\nCOPY id_rsa /root/.ssh/\n",
        );
        assert_eq!(rules(&report), vec!["secret-in-dockerfile", "secret-file-copied"]);
        assert_eq!(report.findings[0].line, Some(2));
        assert_eq!(report.score, 50);
    }

    #[test]
    fn test_network_analysis_honors_overrides() {
        let mut config = EngineConfig::default();
        config.rules.insert("no-default-bridge".into(), RuleSetting::Off);
        let engine = Engine::new(config).unwrap();
        let manifest = ComposeParser::parse("services:\n  web:\n    image: nginx\n").unwrap();
        let analysis = engine.network_analysis(&manifest);
        assert!(analysis.findings.is_empty());
        assert_eq!(analysis.score, 100);
    }

    #[test]
    fn test_scan_uses_configured_patterns() {
        let mut config = EngineConfig::default();
        config.scanner.disable_builtin = true;
        config
            .scanner
            .patterns
            .push(PatternSpec::new("internal_token", r"itk_[a-z0-9]{32}", Severity::High));
        let engine = Engine::new(config).unwrap();

        let matches = engine.scan(&format!("token: itk_{}\nAKIAIOSFODNN7EXAMPLE\n", "a1".repeat(16)));
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].kind, "internal_token");
    }
}
