pub mod config;
pub mod engine;
pub mod error;
pub mod parser;
pub mod report;
pub mod rules;
pub mod scanner;
pub mod topology;

pub use config::{generate_default_config, load_config, EngineConfig, Profile, RuleSetting};
pub use engine::Engine;
pub use error::{EngineError, ParseError, PatternError};
pub use parser::compose::ComposeParser;
pub use parser::manifest::{Manifest, NetworkSpec, ServiceSpec};
pub use report::{Finding, Report, Severity};
pub use rules::network::{NetworkAnalysis, NetworkAnalyzer};
pub use scanner::{PatternMatch, SecretScanner};
pub use topology::{Topology, TopologyGraph};

/// Validate manifest text with the default configuration.
pub fn validate(content: &str) -> Result<Report, EngineError> {
    let engine = Engine::with_defaults()?;
    Ok(engine.validate_str(content)?)
}
