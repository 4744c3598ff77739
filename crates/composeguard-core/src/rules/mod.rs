pub mod network;
pub mod secrets;
pub mod service;

use crate::parser::manifest::ServiceSpec;
use serde::{Deserialize, Serialize};

/// Every rule id an evaluator can emit.
pub const RULE_IDS: &[&str] = &[
    "no-privileged",
    "require-cap-drop-all",
    "dangerous-capabilities",
    "no-host-network",
    "recommend-read-only",
    "recommend-user",
    "no-root-user",
    "recommend-no-new-privileges",
    "recommend-seccomp",
    "recommend-resource-limits",
    "no-docker-socket-mount",
    "hardcoded-secret",
    "prefer-docker-secrets",
    "secret-in-dockerfile",
    "secret-file-copied",
    "no-default-bridge",
    "database-internal-only",
    "recommend-network-segmentation",
    "database-port-exposed",
    "avoid-bind-all-interfaces",
];

/// Name tokens of tools that sit next to a database without being one.
const COMPANION_TOKENS: &[&str] = &[
    "exporter", "commander", "express", "admin", "adminer", "ui", "gui", "insight", "dashboard",
    "backup", "migrate", "migrations", "metrics", "monitor", "proxy", "web",
];

pub fn is_known_rule(id: &str) -> bool {
    RULE_IDS.contains(&id)
}

/// Closest known rule id, for hints on misspelled overrides.
pub fn suggest_rule(id: &str) -> Option<&'static str> {
    RULE_IDS
        .iter()
        .map(|known| (*known, strsim::jaro_winkler(id, known)))
        .filter(|(_, similarity)| *similarity > 0.85)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(known, _)| known)
}

/// Control tables consulted by the evaluators.
///
/// Passed in at construction so differently configured evaluators can live
/// side by side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleTables {
    pub dangerous_capabilities: Vec<String>,
    /// Image repository names (registry, namespace and tag stripped).
    pub database_images: Vec<String>,
    pub database_ports: Vec<u16>,
    pub root_users: Vec<String>,
}

impl Default for RuleTables {
    fn default() -> Self {
        Self {
            dangerous_capabilities: [
                "SYS_ADMIN",
                "NET_ADMIN",
                "SYS_PTRACE",
                "SYS_MODULE",
                "DAC_READ_SEARCH",
                "SYS_RAWIO",
                "SYS_BOOT",
                "SYS_TIME",
                "MKNOD",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            database_images: [
                "postgres",
                "postgresql",
                "mysql",
                "mariadb",
                "mongo",
                "mongodb",
                "redis",
                "elasticsearch",
                "memcached",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            database_ports: vec![5432, 3306, 27017, 6379, 9200, 9300],
            root_users: ["root", "0", "0:0", "root:root"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl RuleTables {
    /// Databases are recognized by image or by service name.
    pub fn is_database(&self, service: &ServiceSpec) -> bool {
        let by_image = service
            .image
            .as_deref()
            .map(image_repository)
            .is_some_and(|repo| self.database_images.iter().any(|db| *db == repo));
        by_image || self.is_database_name(&service.name)
    }

    /// Name heuristic: a `db`/`database` token (`user-db`, `db_primary`,
    /// `mongodb`) or a token naming a database product (`cache-redis`).
    /// Names of companion tools (`postgres-exporter`, `mongo-express`) are
    /// not databases.
    pub fn is_database_name(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        let tokens: Vec<&str> = lower
            .split(&['-', '_', '.'][..])
            .map(|token| token.trim_end_matches(|c: char| c.is_ascii_digit()))
            .collect();
        if tokens.iter().any(|token| COMPANION_TOKENS.contains(token)) {
            return false;
        }
        tokens.iter().any(|&token| {
            token == "db"
                || token == "database"
                || (token.len() > 2 && token.ends_with("db"))
                || self.database_images.iter().any(|db| db == token)
        })
    }

    pub fn dangerous_in<'a>(&self, caps: &'a [String]) -> Vec<&'a str> {
        caps.iter()
            .filter(|cap| self.dangerous_capabilities.iter().any(|d| d.eq_ignore_ascii_case(cap)))
            .map(|cap| cap.as_str())
            .collect()
    }

    pub fn is_root_user(&self, user: &str) -> bool {
        let user = user.trim();
        self.root_users.iter().any(|r| r == user)
    }

    pub fn is_database_port(&self, port: u16) -> bool {
        self.database_ports.contains(&port)
    }
}

/// `registry:5000/team/postgres:16-alpine@sha256:…` → `postgres`.
pub fn image_repository(image: &str) -> String {
    let without_digest = image.split('@').next().unwrap_or(image);
    let last = without_digest.rsplit('/').next().unwrap_or(without_digest);
    let repo = last.split(':').next().unwrap_or(last);
    repo.to_ascii_lowercase()
}

/// Show at most the first four characters of a secret.
pub(crate) fn redact_value(value: &str) -> String {
    if value.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{}****", value.chars().take(4).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(name: &str, image: Option<&str>) -> ServiceSpec {
        let mut svc = ServiceSpec::new(name);
        svc.image = image.map(String::from);
        svc
    }

    #[test]
    fn test_image_repository() {
        assert_eq!(image_repository("postgres"), "postgres");
        assert_eq!(image_repository("postgres:16-alpine"), "postgres");
        assert_eq!(image_repository("docker.io/library/redis:7"), "redis");
        assert_eq!(image_repository("localhost:5000/team/mysql:8@sha256:abc"), "mysql");
        assert_eq!(image_repository("bitnami/postgresql:15"), "postgresql");
    }

    #[test]
    fn test_database_classification() {
        let tables = RuleTables::default();
        assert!(tables.is_database(&service("store", Some("postgres:16"))));
        assert!(tables.is_database(&service("db", None)));
        assert!(tables.is_database(&service("users-db", Some("custom/app"))));
        assert!(tables.is_database(&service("db_primary2", None)));
        assert!(tables.is_database(&service("mongodb", None)));
        assert!(tables.is_database(&service("redis-cache", None)));
        assert!(tables.is_database(&service("cache-redis", None)));
        assert!(!tables.is_database(&service("web", Some("nginx:1.25"))));
        assert!(!tables.is_database(&service("feedback", None)));
        assert!(!tables.is_database(&service("admin", Some("mongo-express"))));
    }

    #[test]
    fn test_database_companions_are_not_databases() {
        let tables = RuleTables::default();
        for name in ["postgres-exporter", "redis-commander", "mongo-express", "db-backup", "mysql_admin"] {
            assert!(!tables.is_database(&service(name, None)), "{} classified as a database", name);
        }
        assert!(!tables.is_database_name("redisinsight"));
        assert!(!tables.is_database_name("postgresql_exporter2"));
    }

    #[test]
    fn test_suggest_rule() {
        assert_eq!(suggest_rule("no-privileges"), Some("no-privileged"));
        assert_eq!(suggest_rule("completely-unrelated-thing"), None);
        assert!(is_known_rule("recommend-seccomp"));
    }

    #[test]
    fn test_redact_value() {
        assert_eq!(redact_value("abc"), "****");
        assert_eq!(redact_value("supersecret"), "supe****");
    }
}
