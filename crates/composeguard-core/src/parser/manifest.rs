use serde::{Deserialize, Serialize};

/// Name of the network compose attaches services to when none is declared.
pub const DEFAULT_NETWORK: &str = "default";

/// `deploy.resources.limits` of a service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpus: Option<String>,
    pub memory: Option<String>,
}

impl ResourceLimits {
    pub fn is_empty(&self) -> bool {
        self.cpus.is_none() && self.memory.is_none()
    }
}

/// A service definition, normalized so evaluators never branch on the
/// shape the author happened to use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    pub image: Option<String>,
    /// Build context, from `build: ./dir` or `build: { context: ./dir }`.
    pub build: Option<String>,
    pub privileged: bool,
    /// Upper-cased capability tokens without the `CAP_` prefix, deduplicated.
    pub cap_add: Vec<String>,
    pub cap_drop: Vec<String>,
    pub network_mode: Option<String>,
    pub read_only: bool,
    pub user: Option<String>,
    pub security_opt: Vec<String>,
    /// `KEY=VALUE` entries in source order. A key without a value is kept bare.
    pub environment: Vec<String>,
    /// Published ports as `[ip:]host:container[/proto]`.
    pub ports: Vec<String>,
    /// Ports exposed to linked services only.
    pub expose: Vec<String>,
    pub resource_limits: Option<ResourceLimits>,
    /// `mem_limit` (or the legacy `memory` key).
    pub mem_limit: Option<String>,
    pub secrets: Vec<String>,
    pub networks: Vec<String>,
    /// Short-syntax mounts, `source:target[:mode]`.
    pub volumes: Vec<String>,
}

impl ServiceSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Networks the service is attached to at runtime, for exposure checks.
    ///
    /// Services that declare no networks and have no `network_mode` end up on
    /// the project's implicit default network. Reachability uses the declared
    /// `networks` only.
    pub fn effective_networks(&self) -> Vec<String> {
        if self.network_mode.is_some() {
            return self.networks.clone();
        }
        if self.networks.is_empty() {
            vec![DEFAULT_NETWORK.to_string()]
        } else {
            self.networks.clone()
        }
    }

    /// Environment entries split into `(key, value)`; bare keys yield `None`.
    pub fn env_pairs(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.environment.iter().map(|entry| match entry.split_once('=') {
            Some((key, value)) => (key, Some(value)),
            None => (entry.as_str(), None),
        })
    }

    pub fn has_capability_dropped(&self, cap: &str) -> bool {
        self.cap_drop.iter().any(|c| c == cap)
    }
}

/// A top-level network declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub name: String,
    /// Not externally routable. Defaults to false.
    pub internal: bool,
    /// Created outside this manifest.
    pub external: bool,
    pub driver: Option<String>,
}

impl NetworkSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Normalized result of parsing one orchestration manifest.
///
/// Services and networks keep the order they were declared in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: Option<String>,
    pub services: Vec<ServiceSpec>,
    pub networks: Vec<NetworkSpec>,
    pub volumes: Vec<String>,
    pub secrets: Vec<String>,
}

impl Manifest {
    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn network(&self, name: &str) -> Option<&NetworkSpec> {
        self.networks.iter().find(|n| n.name == name)
    }

    pub fn service_names(&self) -> Vec<String> {
        self.services.iter().map(|s| s.name.clone()).collect()
    }

    /// A network is internal only when it is declared with `internal: true`.
    /// Undeclared networks, including the implicit default, are routable.
    pub fn is_internal(&self, network: &str) -> bool {
        self.network(network).is_some_and(|n| n.internal)
    }

    pub fn declares_secrets(&self) -> bool {
        !self.secrets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_networks_default() {
        let svc = ServiceSpec::new("web");
        assert_eq!(svc.effective_networks(), vec!["default".to_string()]);
    }

    #[test]
    fn test_effective_networks_host_mode() {
        let mut svc = ServiceSpec::new("web");
        svc.network_mode = Some("host".into());
        assert!(svc.effective_networks().is_empty());
    }

    #[test]
    fn test_env_pairs() {
        let mut svc = ServiceSpec::new("web");
        svc.environment = vec!["A=1".into(), "B".into(), "C=x=y".into()];
        let pairs: Vec<_> = svc.env_pairs().collect();
        assert_eq!(pairs, vec![("A", Some("1")), ("B", None), ("C", Some("x=y"))]);
    }

    #[test]
    fn test_undeclared_network_is_not_internal() {
        let mut manifest = Manifest::default();
        let mut backend = NetworkSpec::new("backend");
        backend.internal = true;
        manifest.networks.push(backend);
        assert!(manifest.is_internal("backend"));
        assert!(!manifest.is_internal("default"));
    }
}
