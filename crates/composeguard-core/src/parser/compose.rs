use crate::error::{yaml_kind, ParseError};
use crate::parser::manifest::*;
use anyhow::Context;
use serde_yaml::{Mapping, Value};
use std::path::Path;

/// Parser for compose manifests (`docker-compose.yml`, `compose.yaml`).
pub struct ComposeParser;

impl ComposeParser {
    /// Read and parse a manifest from disk.
    pub fn parse_file(path: &Path) -> anyhow::Result<Manifest> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read compose file: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Parse manifest text into a normalized [`Manifest`].
    ///
    /// Structural problems are errors; missing keys are not.
    pub fn parse(content: &str) -> Result<Manifest, ParseError> {
        let mut yaml: Value = serde_yaml::from_str(content)?;
        yaml.apply_merge()?;

        let root = match &yaml {
            Value::Null => return Ok(Manifest::default()),
            Value::Mapping(map) => map,
            other => {
                return Err(ParseError::RootNotMapping {
                    found: yaml_kind(other),
                })
            }
        };

        let mut manifest = Manifest {
            version: root.get("version").and_then(scalar_to_string),
            ..Default::default()
        };

        if let Some(services) = section(root, "services")? {
            for (name, config) in services {
                let name = match scalar_to_string(name) {
                    Some(n) => n,
                    None => continue,
                };
                let service = Self::parse_service(&name, config)?;
                manifest.services.push(service);
            }
        }

        if let Some(networks) = section(root, "networks")? {
            for (name, config) in networks {
                if let Some(name) = scalar_to_string(name) {
                    manifest.networks.push(Self::parse_network(name, config));
                }
            }
        }

        if let Some(volumes) = section(root, "volumes")? {
            manifest.volumes = volumes.keys().filter_map(scalar_to_string).collect();
        }

        if let Some(secrets) = section(root, "secrets")? {
            manifest.secrets = secrets.keys().filter_map(scalar_to_string).collect();
        }

        Ok(manifest)
    }

    fn parse_service(name: &str, config: &Value) -> Result<ServiceSpec, ParseError> {
        let mut svc = ServiceSpec::new(name);

        let config = match config {
            Value::Null => return Ok(svc),
            Value::Mapping(map) => map,
            _ => return Err(ParseError::ServiceNotMapping(name.to_string())),
        };

        svc.image = config.get("image").and_then(scalar_to_string);
        svc.build = config.get("build").and_then(|b| match b {
            Value::Mapping(m) => m.get("context").and_then(scalar_to_string),
            other => scalar_to_string(other),
        });
        svc.privileged = config.get("privileged").is_some_and(truthy);
        svc.read_only = config.get("read_only").is_some_and(truthy);
        svc.user = config.get("user").and_then(scalar_to_string);
        svc.network_mode = config.get("network_mode").and_then(scalar_to_string);
        svc.mem_limit = config
            .get("mem_limit")
            .or_else(|| config.get("memory"))
            .and_then(scalar_to_string);

        svc.cap_add = normalize_capabilities(string_list(name, "cap_add", config.get("cap_add"))?);
        svc.cap_drop = normalize_capabilities(string_list(name, "cap_drop", config.get("cap_drop"))?);
        svc.security_opt = string_list(name, "security_opt", config.get("security_opt"))?;
        svc.expose = string_list(name, "expose", config.get("expose"))?;

        if let Some(env) = config.get("environment") {
            svc.environment = Self::parse_environment(name, env)?;
        }
        if let Some(ports) = config.get("ports") {
            svc.ports = Self::parse_ports(name, ports)?;
        }
        if let Some(networks) = config.get("networks") {
            svc.networks = names_from_list_or_map(name, "networks", networks)?;
        }
        if let Some(secrets) = config.get("secrets") {
            svc.secrets = Self::parse_secret_refs(name, secrets)?;
        }
        if let Some(volumes) = config.get("volumes") {
            svc.volumes = Self::parse_volumes(name, volumes)?;
        }

        svc.resource_limits = config
            .get("deploy")
            .and_then(|d| d.get("resources"))
            .and_then(|r| r.get("limits"))
            .and_then(|l| l.as_mapping())
            .map(|limits| ResourceLimits {
                cpus: limits.get("cpus").and_then(scalar_to_string),
                memory: limits.get("memory").and_then(scalar_to_string),
            })
            .filter(|l| !l.is_empty());

        Ok(svc)
    }

    /// Collapse map-form and list-form environments into `KEY=VALUE` entries.
    fn parse_environment(service: &str, env: &Value) -> Result<Vec<String>, ParseError> {
        match env {
            Value::Null => Ok(Vec::new()),
            Value::Mapping(map) => Ok(map
                .iter()
                .filter_map(|(k, v)| {
                    let key = scalar_to_string(k)?;
                    Some(match scalar_to_string(v) {
                        Some(value) => format!("{}={}", key, value),
                        None => key,
                    })
                })
                .collect()),
            Value::Sequence(seq) => Ok(seq.iter().filter_map(scalar_to_string).collect()),
            other => Err(ParseError::InvalidField {
                service: service.to_string(),
                field: "environment",
                found: yaml_kind(other),
            }),
        }
    }

    fn parse_ports(service: &str, ports: &Value) -> Result<Vec<String>, ParseError> {
        let seq = match ports {
            Value::Null => return Ok(Vec::new()),
            Value::Sequence(seq) => seq,
            other => {
                return Err(ParseError::InvalidField {
                    service: service.to_string(),
                    field: "ports",
                    found: yaml_kind(other),
                })
            }
        };

        let mut out = Vec::new();
        for entry in seq {
            match entry {
                Value::Mapping(long) => {
                    if let Some(port) = long_syntax_port(long) {
                        out.push(port);
                    }
                }
                other => {
                    if let Some(port) = scalar_to_string(other) {
                        out.push(port.trim().to_string());
                    }
                }
            }
        }
        Ok(out)
    }

    fn parse_secret_refs(service: &str, secrets: &Value) -> Result<Vec<String>, ParseError> {
        match secrets {
            Value::Null => Ok(Vec::new()),
            Value::Sequence(seq) => Ok(seq
                .iter()
                .filter_map(|s| match s {
                    Value::Mapping(m) => m.get("source").and_then(scalar_to_string),
                    other => scalar_to_string(other),
                })
                .collect()),
            other => Err(ParseError::InvalidField {
                service: service.to_string(),
                field: "secrets",
                found: yaml_kind(other),
            }),
        }
    }

    fn parse_volumes(service: &str, volumes: &Value) -> Result<Vec<String>, ParseError> {
        match volumes {
            Value::Null => Ok(Vec::new()),
            Value::Sequence(seq) => Ok(seq
                .iter()
                .filter_map(|v| match v {
                    Value::Mapping(m) => {
                        let target = m.get("target").and_then(scalar_to_string)?;
                        Some(match m.get("source").and_then(scalar_to_string) {
                            Some(source) => format!("{}:{}", source, target),
                            None => target,
                        })
                    }
                    other => scalar_to_string(other),
                })
                .collect()),
            other => Err(ParseError::InvalidField {
                service: service.to_string(),
                field: "volumes",
                found: yaml_kind(other),
            }),
        }
    }

    fn parse_network(name: String, config: &Value) -> NetworkSpec {
        let mut network = NetworkSpec::new(name);
        if let Some(map) = config.as_mapping() {
            network.internal = map.get("internal").is_some_and(truthy);
            network.external = map.get("external").is_some_and(|e| e.is_mapping() || truthy(e));
            network.driver = map.get("driver").and_then(scalar_to_string);
        }
        network
    }
}

/// Fetch an optional top-level section, rejecting non-mapping shapes.
fn section<'a>(root: &'a Mapping, key: &'static str) -> Result<Option<&'a Mapping>, ParseError> {
    match root.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Mapping(map)) => Ok(Some(map)),
        Some(other) => Err(ParseError::SectionNotMapping {
            section: key,
            found: yaml_kind(other),
        }),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.to_ascii_lowercase().as_str(), "true" | "yes" | "on"),
        _ => false,
    }
}

fn string_list(service: &str, field: &'static str, value: Option<&Value>) -> Result<Vec<String>, ParseError> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Sequence(seq)) => Ok(seq.iter().filter_map(scalar_to_string).collect()),
        Some(other) => match scalar_to_string(other) {
            Some(single) => Ok(vec![single]),
            None => Err(ParseError::InvalidField {
                service: service.to_string(),
                field,
                found: yaml_kind(other),
            }),
        },
    }
}

fn names_from_list_or_map(service: &str, field: &'static str, value: &Value) -> Result<Vec<String>, ParseError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(seq) => Ok(seq.iter().filter_map(scalar_to_string).collect()),
        Value::Mapping(map) => Ok(map.keys().filter_map(scalar_to_string).collect()),
        other => Err(ParseError::InvalidField {
            service: service.to_string(),
            field,
            found: yaml_kind(other),
        }),
    }
}

fn normalize_capabilities(caps: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(caps.len());
    for cap in caps {
        let upper = cap.trim().to_ascii_uppercase();
        let token = upper.strip_prefix("CAP_").unwrap_or(&upper).to_string();
        if !token.is_empty() && !out.contains(&token) {
            out.push(token);
        }
    }
    out
}

/// `{target, published, host_ip, protocol}` → `[ip:]published:target[/proto]`.
fn long_syntax_port(long: &Mapping) -> Option<String> {
    let target = long.get("target").and_then(scalar_to_string)?;
    let mut port = match long.get("published").and_then(scalar_to_string) {
        Some(published) => match long.get("host_ip").and_then(scalar_to_string) {
            Some(ip) => format!("{}:{}:{}", ip, published, target),
            None => format!("{}:{}", published, target),
        },
        None => target,
    };
    if let Some(proto) = long.get("protocol").and_then(scalar_to_string) {
        if proto != "tcp" {
            port.push('/');
            port.push_str(&proto);
        }
    }
    Some(port)
}
