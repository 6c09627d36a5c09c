use std::error::Error;
use std::fmt::Display;
use std::io;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ConfigError {
  Io { path: PathBuf, source: io::Error },
  Yaml(serde_yaml::Error),
  MissingTemplate,
  EmptyTemplate,
  InvalidTemplate,
  InvalidBenchmarks,
  MissingParameterField { field: &'static str },
  EmptyParameterId,
  EmptyRange { id: String },
  DuplicateParameter { id: String },
  SecondaryWithoutPrimary { id: String },
  ParameterNotSupported { id: String },
  Coercion { id: String, value: String, target: &'static str },
  MissingField { section: &'static str, field: &'static str },
  InvalidField { section: &'static str, field: &'static str },
  InvalidPort { address: String },
}

impl Display for ConfigError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ConfigError::Io { path, source } => {
        write!(f, "failed to access {}: {source}", path.display())
      }
      ConfigError::Yaml(e) => write!(f, "invalid YAML: {e}"),
      ConfigError::MissingTemplate => write!(f, "no template config given"),
      ConfigError::EmptyTemplate => write!(f, "template config is empty"),
      ConfigError::InvalidTemplate => write!(f, "template config must be a mapping"),
      ConfigError::InvalidBenchmarks => write!(f, "benchmarks must be a sequence"),
      ConfigError::MissingParameterField { field } => {
        write!(f, "invalid benchmark: parameter {field} field is missing")
      }
      ConfigError::EmptyParameterId => write!(f, "invalid benchmark: parameter id is empty"),
      ConfigError::EmptyRange { id } => {
        write!(f, "invalid benchmark: no range is given for {id}")
      }
      ConfigError::DuplicateParameter { id } => write!(
        f,
        "primary and secondary parameters should be different (both are {id})"
      ),
      ConfigError::SecondaryWithoutPrimary { id } => write!(
        f,
        "secondary parameter {id} is given without a primary parameter"
      ),
      ConfigError::ParameterNotSupported { id } => {
        write!(f, "parameter {id} is not supported by the template")
      }
      ConfigError::Coercion { id, value, target } => {
        write!(f, "cannot convert value {value:?} of {id} to {target}")
      }
      ConfigError::MissingField { section, field } => {
        write!(f, "{section}.{field} is not given")
      }
      ConfigError::InvalidField { section, field } => {
        write!(f, "{section}.{field} has an unexpected type")
      }
      ConfigError::InvalidPort { address } => write!(f, "wrong port format in {address:?}"),
    }
  }
}

impl Error for ConfigError {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    match self {
      ConfigError::Io { source, .. } => Some(source),
      ConfigError::Yaml(e) => Some(e),
      _ => None,
    }
  }
}

impl From<serde_yaml::Error> for ConfigError {
  fn from(e: serde_yaml::Error) -> Self {
    ConfigError::Yaml(e)
  }
}

#[derive(Debug)]
pub enum ResultError {
  Io { path: PathBuf, source: io::Error },
  Yaml(serde_yaml::Error),
  /// The result document lacks a field needed to compute throughput.
  Format(String),
  /// The benchmarking client reported its own failure for a scenario.
  RunFailure { scenario: String, message: String },
}

impl Display for ResultError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ResultError::Io { path, source } => {
        write!(f, "failed to read result file {}: {source}", path.display())
      }
      ResultError::Yaml(e) => write!(f, "result document is not valid YAML: {e}"),
      ResultError::Format(msg) => write!(f, "malformed result document: {msg}"),
      ResultError::RunFailure { scenario, message } => {
        write!(f, "benchmark {scenario} exited with error: {message}")
      }
    }
  }
}

impl Error for ResultError {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    match self {
      ResultError::Io { source, .. } => Some(source),
      ResultError::Yaml(e) => Some(e),
      _ => None,
    }
  }
}

impl From<serde_yaml::Error> for ResultError {
  fn from(e: serde_yaml::Error) -> Self {
    ResultError::Yaml(e)
  }
}
