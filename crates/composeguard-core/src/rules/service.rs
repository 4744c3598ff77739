use crate::parser::manifest::{Manifest, ServiceSpec};
use crate::report::{Finding, Severity};
use crate::rules::RuleTables;

/// A per-service check: predicate plus how to report it.
pub struct ServiceRule {
    pub id: &'static str,
    pub severity: Severity,
    pub applies: fn(&ServiceSpec, &RuleTables) -> bool,
    pub message: fn(&ServiceSpec, &RuleTables) -> String,
    pub fix: &'static str,
}

/// The service rule battery, in evaluation order.
pub const SERVICE_RULES: &[ServiceRule] = &[
    ServiceRule {
        id: "no-privileged",
        severity: Severity::Critical,
        applies: |s, _| s.privileged,
        message: |s, _| {
            format!(
                "Service '{}' runs in privileged mode and has full access to the host's devices and kernel",
                s.name
            )
        },
        fix: "Remove 'privileged: true' and grant only the specific capabilities the service needs",
    },
    ServiceRule {
        id: "require-cap-drop-all",
        severity: Severity::High,
        applies: |s, _| !s.has_capability_dropped("ALL"),
        message: |s, _| format!("Service '{}' keeps the default Linux capability set", s.name),
        fix: "Add 'cap_drop: [ALL]' and re-add only required capabilities with 'cap_add'",
    },
    ServiceRule {
        id: "dangerous-capabilities",
        severity: Severity::High,
        applies: |s, t| !t.dangerous_in(&s.cap_add).is_empty(),
        message: |s, t| {
            format!(
                "Service '{}' adds dangerous capabilities: {}",
                s.name,
                t.dangerous_in(&s.cap_add).join(", ")
            )
        },
        fix: "Remove these capabilities from 'cap_add' or isolate the workload that needs them",
    },
    ServiceRule {
        id: "no-host-network",
        severity: Severity::High,
        applies: |s, _| s.network_mode.as_deref() == Some("host"),
        message: |s, _| {
            format!(
                "Service '{}' shares the host network namespace, bypassing network isolation",
                s.name
            )
        },
        fix: "Remove 'network_mode: host' and attach the service to a user-defined network",
    },
    ServiceRule {
        id: "recommend-read-only",
        severity: Severity::Medium,
        applies: |s, t| !t.is_database(s) && !s.read_only,
        message: |s, _| format!("Service '{}' has a writable root filesystem", s.name),
        fix: "Set 'read_only: true' and mount tmpfs or volumes for paths that need writes",
    },
    ServiceRule {
        id: "recommend-user",
        severity: Severity::Medium,
        applies: |s, _| s.user.as_deref().map_or(true, |u| u.trim().is_empty()),
        message: |s, _| {
            format!(
                "Service '{}' does not set a user and runs as the image default (often root)",
                s.name
            )
        },
        fix: "Set 'user' to a non-root UID:GID, for example 'user: \"1000:1000\"'",
    },
    ServiceRule {
        id: "no-root-user",
        severity: Severity::High,
        applies: |s, t| s.user.as_deref().is_some_and(|u| t.is_root_user(u)),
        message: |s, _| {
            format!(
                "Service '{}' explicitly runs as root ({})",
                s.name,
                s.user.as_deref().unwrap_or_default()
            )
        },
        fix: "Run the service as a non-root UID:GID",
    },
    ServiceRule {
        id: "recommend-no-new-privileges",
        severity: Severity::Medium,
        applies: |s, _| !has_no_new_privileges(&s.security_opt),
        message: |s, _| {
            format!(
                "Service '{}' allows processes to gain privileges through setuid binaries",
                s.name
            )
        },
        fix: "Add 'no-new-privileges:true' to 'security_opt'",
    },
    ServiceRule {
        id: "recommend-seccomp",
        severity: Severity::Low,
        applies: |s, _| !has_seccomp_profile(&s.security_opt),
        message: |s, _| format!("Service '{}' does not declare a seccomp profile", s.name),
        fix: "Add 'seccomp:<profile>' to 'security_opt' (avoid 'seccomp:unconfined')",
    },
    ServiceRule {
        id: "recommend-resource-limits",
        severity: Severity::Medium,
        applies: |s, _| s.resource_limits.is_none() && s.mem_limit.is_none(),
        message: |s, _| {
            format!(
                "Service '{}' has no memory or CPU limits and can exhaust host resources",
                s.name
            )
        },
        fix: "Set 'deploy.resources.limits' (memory and cpus) or 'mem_limit'",
    },
    ServiceRule {
        id: "no-docker-socket-mount",
        severity: Severity::Critical,
        applies: |s, _| mounts_docker_socket(s),
        message: |s, _| {
            format!(
                "Service '{}' mounts the Docker socket, which grants root-equivalent control of the host",
                s.name
            )
        },
        fix: "Remove the docker.sock mount or front it with a restricted socket proxy",
    },
];

fn has_no_new_privileges(opts: &[String]) -> bool {
    opts.iter().any(|opt| {
        let opt = opt.trim().to_ascii_lowercase();
        match opt.strip_prefix("no-new-privileges") {
            Some(rest) => !matches!(rest, ":false" | "=false"),
            None => false,
        }
    })
}

fn has_seccomp_profile(opts: &[String]) -> bool {
    opts.iter().any(|opt| {
        let opt = opt.trim().to_ascii_lowercase();
        opt.starts_with("seccomp") && !opt.ends_with("unconfined")
    })
}

fn mounts_docker_socket(s: &ServiceSpec) -> bool {
    s.volumes.iter().any(|v| {
        let source = v.split(':').next().unwrap_or(v);
        source.ends_with("docker.sock")
    })
}

/// Runs the service rule registry over every service of a manifest.
pub struct ServiceRuleEvaluator {
    tables: RuleTables,
    rules: Vec<&'static ServiceRule>,
}

impl ServiceRuleEvaluator {
    pub fn new(tables: RuleTables) -> Self {
        Self {
            tables,
            rules: SERVICE_RULES.iter().collect(),
        }
    }

    /// Drop rules from the registry before evaluation.
    pub fn without_rules(mut self, ids: &[&str]) -> Self {
        self.rules.retain(|rule| !ids.contains(&rule.id));
        self
    }

    pub fn rule_ids(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.id).collect()
    }

    pub fn tables(&self) -> &RuleTables {
        &self.tables
    }

    /// Findings for every service in manifest order, rules in registry order.
    pub fn evaluate(&self, manifest: &Manifest) -> Vec<Finding> {
        let findings: Vec<Finding> = manifest
            .services
            .iter()
            .flat_map(|service| self.evaluate_service(service))
            .collect();
        tracing::debug!(
            services = manifest.services.len(),
            findings = findings.len(),
            "service rules evaluated"
        );
        findings
    }

    pub fn evaluate_service(&self, service: &ServiceSpec) -> Vec<Finding> {
        self.rules
            .iter()
            .filter(|rule| (rule.applies)(service, &self.tables))
            .map(|rule| {
                Finding::new(
                    rule.id,
                    rule.severity,
                    (rule.message)(service, &self.tables),
                    rule.fix,
                )
                .for_service(&service.name)
            })
            .collect()
    }
}

impl Default for ServiceRuleEvaluator {
    fn default() -> Self {
        Self::new(RuleTables::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::compose::ComposeParser;
    use crate::parser::manifest::ResourceLimits;

    fn rules_for(service: ServiceSpec) -> Vec<String> {
        ServiceRuleEvaluator::default()
            .evaluate_service(&service)
            .into_iter()
            .map(|f| f.rule)
            .collect()
    }

    fn hardened(name: &str) -> ServiceSpec {
        let mut svc = ServiceSpec::new(name);
        svc.image = Some("nginx:1.25".into());
        svc.cap_drop = vec!["ALL".into()];
        svc.user = Some("1000:1000".into());
        svc.read_only = true;
        svc.security_opt = vec!["no-new-privileges:true".into(), "seccomp:default".into()];
        svc.resource_limits = Some(ResourceLimits {
            cpus: None,
            memory: Some("512M".into()),
        });
        svc
    }

    #[test]
    fn test_privileged_is_critical() {
        let mut svc = ServiceSpec::new("app");
        svc.privileged = true;
        let findings = ServiceRuleEvaluator::default().evaluate_service(&svc);
        let privileged = findings.iter().find(|f| f.rule == "no-privileged").unwrap();
        assert_eq!(privileged.severity, Severity::Critical);
        assert_eq!(privileged.scope.as_deref(), Some("app"));
    }

    #[test]
    fn test_hardened_service_is_clean() {
        assert!(rules_for(hardened("web")).is_empty());
    }

    #[test]
    fn test_bare_service_gets_baseline_recommendations() {
        let rules = rules_for(ServiceSpec::new("web"));
        assert_eq!(
            rules,
            vec![
                "require-cap-drop-all",
                "recommend-read-only",
                "recommend-user",
                "recommend-no-new-privileges",
                "recommend-seccomp",
                "recommend-resource-limits",
            ]
        );
    }

    #[test]
    fn test_dangerous_capabilities_listed() {
        let mut svc = hardened("vpn");
        svc.cap_add = vec!["NET_ADMIN".into(), "CHOWN".into(), "SYS_TIME".into()];
        let findings = ServiceRuleEvaluator::default().evaluate_service(&svc);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, "dangerous-capabilities");
        assert!(findings[0].message.contains("NET_ADMIN, SYS_TIME"));
        assert!(!findings[0].message.contains("CHOWN"));
    }

    #[test]
    fn test_user_rules_are_mutually_exclusive() {
        for root in ["root", "0", "0:0"] {
            let mut svc = hardened("app");
            svc.user = Some(root.into());
            assert_eq!(rules_for(svc), vec!["no-root-user"]);
        }
        let mut svc = hardened("app");
        svc.user = None;
        assert_eq!(rules_for(svc), vec!["recommend-user"]);
    }

    #[test]
    fn test_database_exempt_from_read_only() {
        let mut svc = hardened("db");
        svc.image = Some("postgres:16".into());
        svc.read_only = false;
        assert!(rules_for(svc).is_empty());
    }

    #[test]
    fn test_security_opt_variants() {
        let mut svc = hardened("app");
        svc.security_opt = vec!["no-new-privileges:false".into(), "seccomp:unconfined".into()];
        assert_eq!(rules_for(svc), vec!["recommend-no-new-privileges", "recommend-seccomp"]);

        let mut svc = hardened("app");
        svc.security_opt = vec!["no-new-privileges".into(), "seccomp=./profile.json".into()];
        assert!(rules_for(svc).is_empty());
    }

    #[test]
    fn test_host_network_and_mem_limit() {
        let mut svc = hardened("app");
        svc.network_mode = Some("host".into());
        svc.resource_limits = None;
        svc.mem_limit = Some("256m".into());
        assert_eq!(rules_for(svc), vec!["no-host-network"]);
    }

    #[test]
    fn test_docker_socket_mount() {
        let mut svc = hardened("agent");
        svc.volumes = vec!["/var/run/docker.sock:/var/run/docker.sock:ro".into()];
        assert_eq!(rules_for(svc), vec!["no-docker-socket-mount"]);
    }

    #[test]
    fn test_registry_filter_and_manifest_order() {
        let manifest = ComposeParser::parse(
            "services:\n  b:\n    privileged: true\n  a:\n    privileged: true\n",
        )
        .unwrap();
        let evaluator = ServiceRuleEvaluator::default().without_rules(&["recommend-seccomp"]);
        assert!(!evaluator.rule_ids().contains(&"recommend-seccomp"));

        let findings = evaluator.evaluate(&manifest);
        assert!(findings.iter().all(|f| f.rule != "recommend-seccomp"));
        assert_eq!(findings[0].scope.as_deref(), Some("b"));
        assert_eq!(findings.last().unwrap().scope.as_deref(), Some("a"));
    }

    #[test]
    fn test_custom_tables() {
        let tables = RuleTables {
            dangerous_capabilities: vec!["CHOWN".into()],
            ..RuleTables::default()
        };
        let mut svc = hardened("app");
        svc.cap_add = vec!["CHOWN".into(), "SYS_ADMIN".into()];
        let findings = ServiceRuleEvaluator::new(tables).evaluate_service(&svc);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.ends_with("CHOWN"));
    }
}
