use crate::error::ConfigError;
use serde_yaml::Mapping;
use serde_yaml::Value;

/*

# Template

The template is the baseline config shared by every run of a matrix. It is kept as an untyped YAML tree because it carries both the storage client policy and the benchmark config, and the set of fields a benchmark may vary is open.

Field lookup is a depth-first walk in document order: for each entry of a mapping, its key is compared before its value is descended into; sequence items are visited in order. The first matching key wins. Duplicate keys deeper in the tree are never touched.

*/

/// Keys removed at any depth from config snapshots that end up in reports.
pub const SENSITIVE_KEYS: &[&str] = &[
  "organization",
  "namespace",
  "iyo_app_id",
  "iyo_app_secret",
  "data_shards",
  "meta_shards",
  "encrypt_key",
];

/// The closed set of scalar types a range token can be coerced into.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ValueKind {
  Integer,
  Float,
  Boolean,
  String,
}

impl ValueKind {
  /// Returns None for values a token can never replace (null, sequences, mappings, tagged values).
  pub fn of(value: &Value) -> Option<ValueKind> {
    match value {
      Value::Bool(_) => Some(ValueKind::Boolean),
      Value::Number(n) if n.is_f64() => Some(ValueKind::Float),
      Value::Number(_) => Some(ValueKind::Integer),
      Value::String(_) => Some(ValueKind::String),
      _ => None,
    }
  }

  pub fn name(self) -> &'static str {
    match self {
      ValueKind::Integer => "integer",
      ValueKind::Float => "float",
      ValueKind::Boolean => "boolean",
      ValueKind::String => "string",
    }
  }

  pub fn coerce(self, token: &str) -> Option<Value> {
    match self {
      ValueKind::Integer => token
        .parse::<i64>()
        .map(Value::from)
        .or_else(|_| token.parse::<u64>().map(Value::from))
        .ok(),
      ValueKind::Float => token.parse::<f64>().ok().map(Value::from),
      ValueKind::Boolean => match token.to_ascii_lowercase().as_str() {
        "true" => Some(Value::Bool(true)),
        "false" => Some(Value::Bool(false)),
        _ => None,
      },
      ValueKind::String => Some(Value::String(token.to_string())),
    }
  }
}

fn find_in_mapping<'a>(map: &'a Mapping, id: &str) -> Option<&'a Value> {
  for (key, child) in map {
    if key.as_str() == Some(id) {
      return Some(child);
    };
    if let Some(found) = find(child, id) {
      return Some(found);
    };
  }
  None
}

fn find<'a>(value: &'a Value, id: &str) -> Option<&'a Value> {
  match value {
    Value::Mapping(map) => find_in_mapping(map, id),
    Value::Sequence(seq) => seq.iter().find_map(|child| find(child, id)),
    _ => None,
  }
}

fn find_in_mapping_mut<'a>(map: &'a mut Mapping, id: &str) -> Option<&'a mut Value> {
  for (key, child) in map.iter_mut() {
    if key.as_str() == Some(id) {
      return Some(child);
    };
    if let Some(found) = find_mut(child, id) {
      return Some(found);
    };
  }
  None
}

fn find_mut<'a>(value: &'a mut Value, id: &str) -> Option<&'a mut Value> {
  match value {
    Value::Mapping(map) => find_in_mapping_mut(map, id),
    Value::Sequence(seq) => seq.iter_mut().find_map(|child| find_mut(child, id)),
    _ => None,
  }
}

/// Removes every entry whose key is in `keys`, at any depth. Order of the remaining keys is kept.
pub fn strip_keys(value: &mut Value, keys: &[&str]) {
  match value {
    Value::Mapping(map) => strip_mapping_keys(map, keys),
    Value::Sequence(seq) => {
      for item in seq {
        strip_keys(item, keys);
      }
    }
    _ => {}
  }
}

pub fn strip_mapping_keys(map: &mut Mapping, keys: &[&str]) {
  *map = std::mem::take(map)
    .into_iter()
    .filter(|(k, _)| !k.as_str().is_some_and(|k| keys.contains(&k)))
    .map(|(k, mut v)| {
      strip_keys(&mut v, keys);
      (k, v)
    })
    .collect();
}

#[derive(Clone, PartialEq, Debug)]
pub struct Template(Mapping);

impl Template {
  pub fn from_value(value: Value) -> Result<Template, ConfigError> {
    match value {
      Value::Mapping(map) if map.is_empty() => Err(ConfigError::EmptyTemplate),
      Value::Mapping(map) => Ok(Template(map)),
      Value::Null => Err(ConfigError::EmptyTemplate),
      _ => Err(ConfigError::InvalidTemplate),
    }
  }

  pub fn as_mapping(&self) -> &Mapping {
    &self.0
  }

  pub fn into_mapping(self) -> Mapping {
    self.0
  }

  pub fn contains(&self, id: &str) -> bool {
    self.get(id).is_some()
  }

  /// Looks a field up anywhere in the tree, using the same order as `apply`.
  pub fn get(&self, id: &str) -> Option<&Value> {
    find_in_mapping(&self.0, id)
  }

  /// Replaces the first field named `id` with `token`, coerced to the type the field already holds.
  /// On error the template is left untouched.
  pub fn apply(&mut self, id: &str, token: &str) -> Result<(), ConfigError> {
    let field = find_in_mapping_mut(&mut self.0, id).ok_or_else(|| {
      ConfigError::ParameterNotSupported {
        id: id.to_string(),
      }
    })?;
    let coercion_error = |target: &'static str| ConfigError::Coercion {
      id: id.to_string(),
      value: token.to_string(),
      target,
    };
    let kind = ValueKind::of(field).ok_or_else(|| coercion_error("an unsupported type"))?;
    *field = kind
      .coerce(token)
      .ok_or_else(|| coercion_error(kind.name()))?;
    Ok(())
  }

  /// A top-level section such as `zstor_config`.
  pub fn section(&self, name: &str) -> Option<&Mapping> {
    self.0.get(name).and_then(Value::as_mapping)
  }

  pub fn section_mut(&mut self, name: &str) -> Option<&mut Mapping> {
    self.0.get_mut(name).and_then(Value::as_mapping_mut)
  }

  /// A copy of the template that is safe to embed in a report.
  pub fn sanitized(&self) -> Mapping {
    let mut map = self.0.clone();
    strip_mapping_keys(&mut map, SENSITIVE_KEYS);
    map
  }
}
