use crate::error::ConfigError;
use crate::parameter::BenchmarkPair;
use crate::template::Template;
use serde_yaml::Mapping;
use serde_yaml::Value;
use std::fs;
use std::path::Path;

/// One concrete config for a single benchmark run.
#[derive(Clone, Debug)]
pub struct Scenario {
  pub id: String,
  /// Position in the primary range (0 when the primary axis is empty).
  pub primary_index: usize,
  /// Position in the secondary range (0 when the secondary axis is empty).
  pub secondary_index: usize,
  pub primary_value: Option<String>,
  pub secondary_value: Option<String>,
  pub template: Template,
}

impl Scenario {
  /// The document handed to the benchmarking client: `{scenarios: {<id>: <template>}}`.
  pub fn document(&self) -> Value {
    let mut scenarios = Mapping::new();
    scenarios.insert(
      Value::from(self.id.clone()),
      Value::Mapping(self.template.as_mapping().clone()),
    );
    let mut doc = Mapping::new();
    doc.insert(Value::from("scenarios"), Value::Mapping(scenarios));
    Value::Mapping(doc)
  }

  pub fn persist(&self, path: &Path) -> Result<(), ConfigError> {
    let raw = serde_yaml::to_string(&self.document())?;
    fs::write(path, raw).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })
  }

  pub fn label(&self) -> String {
    let mut parts = Vec::new();
    if let Some(v) = &self.primary_value {
      parts.push(v.as_str());
    };
    if let Some(v) = &self.secondary_value {
      parts.push(v.as_str());
    };
    if parts.is_empty() {
      self.id.clone()
    } else {
      format!("{} ({})", self.id, parts.join(", "))
    }
  }
}

/// Expands one benchmark pair into its ordered scenarios: the outer loop walks the secondary range, the inner loop the primary range.
/// Every scenario starts from a fresh deep copy of the template.
pub struct ScenarioMatrix<'t> {
  template: &'t Template,
  pair: BenchmarkPair,
  next: usize,
}

impl<'t> ScenarioMatrix<'t> {
  /// Fails if a parameter id is missing from the template or any range value cannot take the type of the field it replaces, before a single scenario is produced.
  pub fn new(template: &'t Template, pair: BenchmarkPair) -> Result<Self, ConfigError> {
    pair.validate_against(template)?;
    for axis in [&pair.secondary, &pair.primary] {
      if let Some(id) = &axis.id {
        for value in &axis.range {
          template.clone().apply(id, value)?;
        }
      };
    }
    Ok(Self {
      template,
      pair,
      next: 0,
    })
  }

  pub fn pair(&self) -> &BenchmarkPair {
    &self.pair
  }

  pub fn len(&self) -> usize {
    self.pair.run_count()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn build(&self, seq: usize) -> Result<Scenario, ConfigError> {
    let primary_len = self.pair.primary.len();
    let primary_index = seq % primary_len;
    let secondary_index = seq / primary_len;
    let primary_value = self.pair.primary.values()[primary_index].map(str::to_string);
    let secondary_value = self.pair.secondary.values()[secondary_index].map(str::to_string);

    let mut template = self.template.clone();
    if let (Some(id), Some(value)) = (&self.pair.secondary.id, &secondary_value) {
      template.apply(id, value)?;
    };
    if let (Some(id), Some(value)) = (&self.pair.primary.id, &primary_value) {
      template.apply(id, value)?;
    };

    Ok(Scenario {
      id: format!("scenario_{}", seq + 1),
      primary_index,
      secondary_index,
      primary_value,
      secondary_value,
      template,
    })
  }
}

impl<'t> Iterator for ScenarioMatrix<'t> {
  type Item = Result<Scenario, ConfigError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.next >= self.len() {
      return None;
    };
    let seq = self.next;
    self.next += 1;
    Some(self.build(seq))
  }
}
