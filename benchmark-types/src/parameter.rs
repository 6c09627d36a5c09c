use crate::error::ConfigError;
use crate::template::Template;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::Mapping;
use serde_yaml::Value;
use std::fs;
use std::path::Path;

static RANGE_SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\W+").unwrap());

/// Splits a declared range such as `"32, 64, 128"` into its tokens.
pub fn split_range(range: &str) -> Vec<String> {
  RANGE_SEPARATOR_RE
    .split(range)
    .filter(|token| !token.is_empty())
    .map(|token| token.to_string())
    .collect()
}

fn scalar_to_string(value: &Value) -> Option<String> {
  match value {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    _ => None,
  }
}

/// One axis of a benchmark matrix. An empty spec (no id) is iterated exactly once without substitution.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct ParameterSpec {
  pub id: Option<String>,
  pub range: Vec<String>,
}

impl ParameterSpec {
  pub fn new(id: impl Into<String>, range: Vec<String>) -> Self {
    Self {
      id: Some(id.into()),
      range,
    }
  }

  pub fn empty() -> Self {
    Self::default()
  }

  pub fn is_empty(&self) -> bool {
    self.id.is_none()
  }

  /// The values this axis takes, in declared order. An empty spec yields a single `None`.
  pub fn values(&self) -> Vec<Option<&str>> {
    if self.is_empty() {
      vec![None]
    } else {
      self.range.iter().map(|v| Some(v.as_str())).collect()
    }
  }

  /// Number of iterations this axis contributes to the matrix.
  pub fn len(&self) -> usize {
    if self.is_empty() {
      1
    } else {
      self.range.len()
    }
  }

  pub fn from_value(value: Option<&Value>) -> Result<Self, ConfigError> {
    let map = match value {
      None | Some(Value::Null) => return Ok(Self::empty()),
      Some(Value::Mapping(map)) if map.is_empty() => return Ok(Self::empty()),
      Some(Value::Mapping(map)) => map,
      Some(_) => return Err(ConfigError::MissingParameterField { field: "id" }),
    };
    let id = map
      .get("id")
      .and_then(scalar_to_string)
      .ok_or(ConfigError::MissingParameterField { field: "id" })?;
    if id.trim().is_empty() {
      return Err(ConfigError::EmptyParameterId);
    };
    let range = map
      .get("range")
      .and_then(scalar_to_string)
      .ok_or(ConfigError::MissingParameterField { field: "range" })?;
    let range = split_range(&range);
    if range.is_empty() {
      return Err(ConfigError::EmptyRange { id });
    };
    Ok(Self::new(id, range))
  }
}

/// Which one or two fields vary across a run matrix.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct BenchmarkPair {
  pub primary: ParameterSpec,
  pub secondary: ParameterSpec,
}

impl BenchmarkPair {
  pub fn new(primary: ParameterSpec, secondary: ParameterSpec) -> Result<Self, ConfigError> {
    if let (Some(p), Some(s)) = (&primary.id, &secondary.id) {
      if p == s {
        return Err(ConfigError::DuplicateParameter { id: p.clone() });
      };
    };
    if primary.is_empty() {
      if let Some(s) = &secondary.id {
        return Err(ConfigError::SecondaryWithoutPrimary { id: s.clone() });
      };
    };
    Ok(Self { primary, secondary })
  }

  pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
    let empty = Mapping::new();
    let map = match value {
      Value::Mapping(map) => map,
      Value::Null => &empty,
      _ => return Err(ConfigError::InvalidBenchmarks),
    };
    Self::new(
      ParameterSpec::from_value(map.get("prime_parameter"))?,
      ParameterSpec::from_value(map.get("second_parameter"))?,
    )
  }

  /// Checks that every declared axis names a field of the template.
  pub fn validate_against(&self, template: &Template) -> Result<(), ConfigError> {
    for id in [&self.primary.id, &self.secondary.id].into_iter().flatten() {
      if !template.contains(id) {
        return Err(ConfigError::ParameterNotSupported { id: id.clone() });
      };
    }
    Ok(())
  }

  pub fn run_count(&self) -> usize {
    self.primary.len() * self.secondary.len()
  }
}

/// Single-pass producer of the declared benchmark pairs. Each declaration is only parsed when it is pulled.
pub struct BenchmarkPairs {
  declared: std::vec::IntoIter<Value>,
  default_pending: bool,
}

impl BenchmarkPairs {
  fn new(declared: Vec<Value>) -> Self {
    Self {
      default_pending: declared.is_empty(),
      declared: declared.into_iter(),
    }
  }
}

impl Iterator for BenchmarkPairs {
  type Item = Result<BenchmarkPair, ConfigError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.default_pending {
      self.default_pending = false;
      return Some(Ok(BenchmarkPair::default()));
    };
    self
      .declared
      .next()
      .map(|value| BenchmarkPair::from_value(&value))
  }
}

/// Splits an orchestrator config document into the template and its benchmark declarations.
pub fn parse_config(raw: &str) -> Result<(Template, BenchmarkPairs), ConfigError> {
  let doc: Value = serde_yaml::from_str(raw)?;
  let Value::Mapping(mut doc) = doc else {
    return Err(ConfigError::MissingTemplate);
  };
  let template = match doc.remove("template") {
    None => return Err(ConfigError::MissingTemplate),
    Some(value) => Template::from_value(value)?,
  };
  let declared = match doc.remove("benchmarks") {
    None | Some(Value::Null) => Vec::new(),
    Some(Value::Sequence(seq)) => seq,
    Some(_) => return Err(ConfigError::InvalidBenchmarks),
  };
  Ok((template, BenchmarkPairs::new(declared)))
}

pub fn load(path: &Path) -> Result<(Template, BenchmarkPairs), ConfigError> {
  let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
    path: path.to_path_buf(),
    source,
  })?;
  parse_config(&raw)
}

#[cfg(test)]
mod tests {
  use super::parse_config;
  use super::split_range;
  use super::BenchmarkPair;
  use super::ParameterSpec;
  use crate::error::ConfigError;

  const TEMPLATE: &str = "
template:
  zstor_config:
    block_size: 64
  bench_config:
    clients: 1
";

  #[test]
  fn test_split_range() {
    assert_eq!(split_range("32, 64,128"), vec!["32", "64", "128"]);
    assert_eq!(split_range(" read;write "), vec!["read", "write"]);
    assert_eq!(split_range("per_second"), vec!["per_second"]);
    assert!(split_range(" , ").is_empty());
  }

  #[test]
  fn test_no_benchmarks_yields_single_empty_pair() {
    let (_, pairs) = parse_config(TEMPLATE).unwrap();
    let pairs = pairs.collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(pairs, vec![BenchmarkPair::default()]);
    assert_eq!(pairs[0].run_count(), 1);
  }

  #[test]
  fn test_empty_benchmark_list_yields_single_empty_pair() {
    let (_, pairs) = parse_config(&format!("{TEMPLATE}benchmarks: []\n")).unwrap();
    assert_eq!(pairs.count(), 1);
  }

  #[test]
  fn test_pairs_are_parsed_in_order() {
    let doc = format!(
      "{TEMPLATE}
benchmarks:
  - prime_parameter:
      id: block_size
      range: 32, 64, 128
  - prime_parameter:
      id: block_size
      range: 16 32
    second_parameter:
      id: clients
      range: 1,2
"
    );
    let (template, pairs) = parse_config(&doc).unwrap();
    let pairs = pairs.collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(pairs.len(), 2);
    assert_eq!(
      pairs[0].primary,
      ParameterSpec::new("block_size", vec!["32".into(), "64".into(), "128".into()])
    );
    assert!(pairs[0].secondary.is_empty());
    assert_eq!(pairs[0].run_count(), 3);
    assert_eq!(pairs[1].secondary.range, vec!["1", "2"]);
    assert_eq!(pairs[1].run_count(), 4);
    pairs[1].validate_against(&template).unwrap();
  }

  #[test]
  fn test_missing_template() {
    assert!(matches!(
      parse_config("benchmarks: []\n"),
      Err(ConfigError::MissingTemplate)
    ));
    assert!(matches!(
      parse_config("template: {}\n"),
      Err(ConfigError::EmptyTemplate)
    ));
  }

  #[test]
  fn test_duplicate_parameter_is_rejected() {
    let doc = format!(
      "{TEMPLATE}
benchmarks:
  - prime_parameter:
      id: block_size
      range: 1,2
    second_parameter:
      id: block_size
      range: 3,4
"
    );
    let (_, mut pairs) = parse_config(&doc).unwrap();
    assert!(matches!(
      pairs.next(),
      Some(Err(ConfigError::DuplicateParameter { id })) if id == "block_size"
    ));
  }

  #[test]
  fn test_secondary_without_primary_is_rejected() {
    let doc = format!(
      "{TEMPLATE}
benchmarks:
  - second_parameter:
      id: clients
      range: 1,2
"
    );
    let (_, mut pairs) = parse_config(&doc).unwrap();
    assert!(matches!(
      pairs.next(),
      Some(Err(ConfigError::SecondaryWithoutPrimary { .. }))
    ));
  }

  #[test]
  fn test_missing_parameter_fields() {
    let missing_range = format!("{TEMPLATE}benchmarks:\n  - prime_parameter:\n      id: clients\n");
    let (_, mut pairs) = parse_config(&missing_range).unwrap();
    assert!(matches!(
      pairs.next(),
      Some(Err(ConfigError::MissingParameterField { field: "range" }))
    ));

    let missing_id = format!("{TEMPLATE}benchmarks:\n  - prime_parameter:\n      range: 1,2\n");
    let (_, mut pairs) = parse_config(&missing_id).unwrap();
    assert!(matches!(
      pairs.next(),
      Some(Err(ConfigError::MissingParameterField { field: "id" }))
    ));
  }

  #[test]
  fn test_unknown_parameter_fails_validation() {
    let doc = format!(
      "{TEMPLATE}benchmarks:\n  - prime_parameter:\n      id: key_size\n      range: 1,2\n"
    );
    let (template, mut pairs) = parse_config(&doc).unwrap();
    let pair = pairs.next().unwrap().unwrap();
    assert!(matches!(
      pair.validate_against(&template),
      Err(ConfigError::ParameterNotSupported { id }) if id == "key_size"
    ));
  }

  #[test]
  fn test_numeric_range_scalar() {
    let spec = ParameterSpec::from_value(Some(&serde_yaml::from_str("{id: clients, range: 4}").unwrap()))
      .unwrap();
    assert_eq!(spec.range, vec!["4"]);
  }
}
