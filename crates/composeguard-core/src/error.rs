use thiserror::Error;

/// A manifest that cannot be turned into a [`Manifest`](crate::Manifest).
///
/// Parsing is all-or-nothing: a partially normalized manifest is never
/// handed to the evaluators.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("manifest root must be a mapping, found {found}")]
    RootNotMapping { found: &'static str },

    #[error("top-level '{section}' must be a mapping, found {found}")]
    SectionNotMapping {
        section: &'static str,
        found: &'static str,
    },

    #[error("service '{service}': '{field}' has an unsupported shape ({found})")]
    InvalidField {
        service: String,
        field: &'static str,
        found: &'static str,
    },

    #[error("service '{0}' must be a mapping")]
    ServiceNotMapping(String),
}

/// A caller-supplied pattern that failed to compile.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid pattern '{name}': {source}")]
    InvalidRegex {
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid exclude pattern for '{name}': {source}")]
    InvalidExclude {
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("duplicate pattern name '{0}'")]
    DuplicateName(String),
}

/// Anything that stops a one-shot validation from producing a report.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Pattern(#[from] PatternError),
}

/// Short type name of a YAML node, used in error messages.
pub(crate) fn yaml_kind(value: &serde_yaml::Value) -> &'static str {
    use serde_yaml::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}
