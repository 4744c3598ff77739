use crate::parser::manifest::{Manifest, ServiceSpec};
use crate::report::{Finding, Severity};
use crate::rules::RuleTables;
use crate::topology::{Topology, TopologyGraph};
use serde::{Deserialize, Serialize};

const ISOLATION_PENALTY: u32 = 15;
const EXPOSURE_PENALTY: u32 = 20;
const COMBINED_PENALTY: u32 = 10;

/// Findings from one network check with its standalone score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub findings: Vec<Finding>,
    pub score: u8,
}

impl CheckResult {
    fn new(findings: Vec<Finding>, penalty: u32) -> Self {
        let score = flat_score(findings.len(), penalty);
        Self { findings, score }
    }
}

/// Complete network analysis of a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkAnalysis {
    pub findings: Vec<Finding>,
    pub topology: Topology,
    pub score: u8,
}

impl NetworkAnalysis {
    /// Keep only matching findings and rescore.
    pub fn retain<F: FnMut(&Finding) -> bool>(&mut self, keep: F) {
        self.findings.retain(keep);
        self.score = flat_score(self.findings.len(), COMBINED_PENALTY);
    }
}

/// A parsed `ports` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    pub host_ip: Option<String>,
    pub host_port: Option<String>,
    pub container_port: String,
    pub protocol: Option<String>,
}

impl PortBinding {
    /// Parse `[ip:][host:]container[/proto]`, including bracketed IPv6.
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();
        let (addr, protocol) = match spec.rsplit_once('/') {
            Some((addr, proto)) => (addr, Some(proto.to_string())),
            None => (spec, None),
        };

        let mut parts = addr.rsplitn(3, ':');
        let container_port = parts.next().unwrap_or_default().to_string();
        let host_port = parts.next().map(String::from);
        let host_ip = parts.next().map(|ip| ip.trim_matches(&['[', ']'][..]).to_string());

        Self {
            host_ip,
            host_port: host_port.filter(|p| !p.is_empty()),
            container_port,
            protocol,
        }
    }

    /// Whether `port` falls in the container port or port range.
    pub fn container_covers(&self, port: u16) -> bool {
        port_in_range(&self.container_port, port)
    }

    pub fn host_covers(&self, port: u16) -> bool {
        self.host_port.as_deref().is_some_and(|p| port_in_range(p, port))
    }
}

fn port_in_range(range: &str, port: u16) -> bool {
    match range.split_once('-') {
        Some((lo, hi)) => match (lo.trim().parse::<u16>(), hi.trim().parse::<u16>()) {
            (Ok(lo), Ok(hi)) => (lo..=hi).contains(&port),
            _ => false,
        },
        None => range.trim().parse::<u16>() == Ok(port),
    }
}

fn flat_score(count: usize, penalty: u32) -> u8 {
    100u32.saturating_sub(penalty.saturating_mul(count as u32)) as u8
}

/// Network isolation, port exposure and reachability analysis.
pub struct NetworkAnalyzer {
    tables: RuleTables,
}

impl NetworkAnalyzer {
    pub fn new(tables: RuleTables) -> Self {
        Self { tables }
    }

    /// Isolation and exposure findings plus topology. The combined score
    /// charges a flat 10 points per finding.
    pub fn analyze(&self, manifest: &Manifest) -> NetworkAnalysis {
        let mut findings = self.check_isolation(manifest).findings;
        findings.extend(self.detect_exposed_ports(manifest).findings);
        let topology = self.build_topology(manifest).to_view();

        tracing::debug!(
            findings = findings.len(),
            edges = topology.edges.len(),
            "network analyzed"
        );

        NetworkAnalysis {
            score: flat_score(findings.len(), COMBINED_PENALTY),
            findings,
            topology,
        }
    }

    pub fn build_topology(&self, manifest: &Manifest) -> TopologyGraph {
        TopologyGraph::from_manifest(manifest)
    }

    /// Segmentation checks. Standalone score: 15 points per finding.
    pub fn check_isolation(&self, manifest: &Manifest) -> CheckResult {
        let mut findings = Vec::new();
        if manifest.services.is_empty() {
            return CheckResult::new(findings, ISOLATION_PENALTY);
        }

        let uses_custom = manifest
            .services
            .iter()
            .any(|s| s.networks.iter().any(|n| manifest.network(n).is_some()));
        if manifest.networks.is_empty() || !uses_custom {
            let message = if manifest.networks.is_empty() {
                "No custom networks are defined; all services share the default bridge network"
            } else {
                "Custom networks are defined but no service uses them; all services share the default bridge network"
            };
            findings.push(Finding::new(
                "no-default-bridge",
                Severity::Medium,
                message,
                "Define user-defined networks and attach each service only to the networks it needs",
            ));
        }

        for service in manifest.services.iter().filter(|s| self.tables.is_database(s)) {
            let exposed: Vec<String> = service
                .effective_networks()
                .into_iter()
                .filter(|n| !manifest.is_internal(n))
                .collect();
            if !exposed.is_empty() {
                findings.push(
                    Finding::new(
                        "database-internal-only",
                        Severity::High,
                        format!(
                            "Database service '{}' is attached to externally routable network(s): {}",
                            service.name,
                            exposed.join(", ")
                        ),
                        "Attach databases only to networks declared with 'internal: true'",
                    )
                    .for_service(&service.name),
                );
            }
        }

        if let Some((network, members)) = single_shared_network(manifest) {
            if members > 2 && manifest.networks.len() <= 1 {
                findings.push(Finding::new(
                    "recommend-network-segmentation",
                    Severity::Low,
                    format!(
                        "All {} services share the single network '{}'; a compromise of one reaches every other",
                        members, network
                    ),
                    "Split services into tiers (e.g. frontend, backend, data) on separate networks",
                ));
            }
        }

        CheckResult::new(findings, ISOLATION_PENALTY)
    }

    /// Published-port checks. Standalone score: 20 points per finding.
    pub fn detect_exposed_ports(&self, manifest: &Manifest) -> CheckResult {
        let mut findings = Vec::new();

        for service in &manifest.services {
            let is_database = self.tables.is_database(service);
            for spec in &service.ports {
                let binding = PortBinding::parse(spec);

                if is_database {
                    if let Some(port) = self.database_port(&binding) {
                        findings.push(database_port_finding(service, spec, port));
                    }
                }

                if spec.trim().starts_with("0.0.0.0:") {
                    findings.push(
                        Finding::new(
                            "avoid-bind-all-interfaces",
                            Severity::Medium,
                            format!(
                                "Service '{}' binds '{}' on all host interfaces",
                                service.name, spec
                            ),
                            "Bind to a specific interface, e.g. '127.0.0.1:<host>:<container>'",
                        )
                        .for_service(&service.name),
                    );
                }
            }
        }

        CheckResult::new(findings, EXPOSURE_PENALTY)
    }

    fn database_port(&self, binding: &PortBinding) -> Option<u16> {
        self.tables
            .database_ports
            .iter()
            .copied()
            .find(|&p| binding.container_covers(p) || binding.host_covers(p))
    }
}

impl Default for NetworkAnalyzer {
    fn default() -> Self {
        Self::new(RuleTables::default())
    }
}

fn database_port_finding(service: &ServiceSpec, spec: &str, port: u16) -> Finding {
    Finding::new(
        "database-port-exposed",
        Severity::High,
        format!(
            "Database service '{}' publishes port {} to the host ('{}')",
            service.name, port, spec
        ),
        "Remove the 'ports' mapping and reach the database over an internal network ('expose' if needed)",
    )
    .for_service(&service.name)
}

/// The only network services declare membership in, with its member count.
fn single_shared_network(manifest: &Manifest) -> Option<(&str, usize)> {
    let mut used: Vec<(&str, usize)> = Vec::new();
    for service in &manifest.services {
        for network in &service.networks {
            match used.iter_mut().find(|(n, _)| *n == network.as_str()) {
                Some((_, count)) => *count += 1,
                None => used.push((network.as_str(), 1)),
            }
        }
    }
    if used.len() == 1 {
        used.pop()
    } else {
        None
    }
}
