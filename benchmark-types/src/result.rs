use crate::error::ResultError;
use crate::template::strip_mapping_keys;
use crate::template::SENSITIVE_KEYS;
use serde_yaml::Mapping;
use serde_yaml::Value;
use std::fs;
use std::path::Path;

/// Aggregation unit of a per-interval series.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TimeUnit {
  PerSecond,
  PerMinute,
  PerHour,
}

impl TimeUnit {
  pub fn parse(literal: &str) -> Option<TimeUnit> {
    match literal {
      "per_second" => Some(TimeUnit::PerSecond),
      "per_minute" => Some(TimeUnit::PerMinute),
      "per_hour" => Some(TimeUnit::PerHour),
      _ => None,
    }
  }

  pub fn seconds(self) -> u64 {
    match self {
      TimeUnit::PerSecond => 1,
      TimeUnit::PerMinute => 60,
      TimeUnit::PerHour => 3600,
    }
  }

  /// The unit without its `per_` prefix.
  pub fn unit_name(self) -> &'static str {
    match self {
      TimeUnit::PerSecond => "second",
      TimeUnit::PerMinute => "minute",
      TimeUnit::PerHour => "hour",
    }
  }
}

/// One measurement reported by the client for a scenario.
#[derive(Clone, PartialEq, Debug)]
pub struct RunSample {
  pub duration: f64,
  pub count: u64,
  /// Operations completed in each successive time bucket. Empty when the client did not record it.
  pub per_interval: Vec<u64>,
}

impl RunSample {
  /// Bytes per second.
  pub fn throughput(&self, value_size: u64) -> f64 {
    self.count as f64 * value_size as f64 / self.duration
  }
}

#[derive(Clone, Debug)]
pub struct RunResult {
  pub scenario_id: String,
  pub samples: Vec<RunSample>,
  pub value_size: u64,
  pub time_unit: TimeUnit,
  /// The scenario config echoed back by the client, with sensitive keys removed.
  pub config: Mapping,
}

impl RunResult {
  /// Mean throughput over all samples, each weighted equally.
  pub fn throughput(&self) -> f64 {
    let total: f64 = self
      .samples
      .iter()
      .map(|s| s.throughput(self.value_size))
      .sum();
    total / self.samples.len() as f64
  }

  pub fn has_per_interval(&self) -> bool {
    self.samples.iter().any(|s| !s.per_interval.is_empty())
  }
}

fn format_err(msg: impl Into<String>) -> ResultError {
  ResultError::Format(msg.into())
}

fn key_to_string(key: &Value) -> Option<String> {
  match key {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

fn parse_sample(scenario: &str, raw: &Value) -> Result<RunSample, ResultError> {
  let duration = raw
    .get("duration")
    .and_then(Value::as_f64)
    .ok_or_else(|| format_err(format!("{scenario}: duration is not given, or is not a number")))?;
  if !(duration.is_finite() && duration > 0.0) {
    return Err(format_err(format!(
      "{scenario}: duration must be greater than zero, got {duration}"
    )));
  };
  let count = raw
    .get("count")
    .and_then(Value::as_u64)
    .ok_or_else(|| format_err(format!("{scenario}: count is not given, or is not an integer")))?;
  let per_interval = match raw.get("per_interval").or_else(|| raw.get("perinterval")) {
    None | Some(Value::Null) => Vec::new(),
    Some(Value::Sequence(seq)) => seq
      .iter()
      .map(Value::as_u64)
      .collect::<Option<Vec<_>>>()
      .ok_or_else(|| format_err(format!("{scenario}: per_interval must hold integers")))?,
    Some(_) => {
      return Err(format_err(format!(
        "{scenario}: per_interval must be a sequence"
      )))
    }
  };
  Ok(RunSample {
    duration,
    count,
    per_interval,
  })
}

fn parse_scenario(id: String, entry: &Value) -> Result<RunResult, ResultError> {
  if !entry.is_mapping() {
    return Err(format_err(format!("{id}: scenario entry must be a mapping")));
  };
  match entry.get("error") {
    None | Some(Value::Null) => {}
    Some(Value::String(msg)) if msg.is_empty() => {}
    Some(err) => {
      let message = match err {
        Value::String(msg) => msg.clone(),
        other => serde_yaml::to_string(other)?.trim().to_string(),
      };
      return Err(ResultError::RunFailure {
        scenario: id,
        message,
      });
    }
  };

  let samples = match entry.get("results") {
    Some(Value::Sequence(seq)) if !seq.is_empty() => seq
      .iter()
      .map(|raw| parse_sample(&id, raw))
      .collect::<Result<Vec<_>, _>>()?,
    _ => return Err(format_err(format!("{id}: no results are provided"))),
  };

  let mut config = entry
    .get("scenario")
    .and_then(Value::as_mapping)
    .cloned()
    .ok_or_else(|| format_err(format!("{id}: scenario config is not given")))?;
  let bench_config = config.get("bench_config");
  let value_size = bench_config
    .and_then(|c| c.get("value_size"))
    .and_then(Value::as_u64)
    .ok_or_else(|| format_err(format!("{id}: bench_config.value_size is not given, or is not an integer")))?;
  let time_unit = match bench_config.and_then(|c| c.get("result_output")) {
    None | Some(Value::Null) => TimeUnit::PerSecond,
    Some(v) => v
      .as_str()
      .and_then(TimeUnit::parse)
      .ok_or_else(|| format_err(format!("{id}: unknown bench_config.result_output")))?,
  };
  strip_mapping_keys(&mut config, SENSITIVE_KEYS);

  Ok(RunResult {
    scenario_id: id,
    samples,
    value_size,
    time_unit,
    config,
  })
}

/// Parses every scenario of a result document, in document order. The first scenario carrying an `error` aborts parsing.
pub fn parse_result_document(raw: &str) -> Result<Vec<RunResult>, ResultError> {
  let doc: Value = serde_yaml::from_str(raw)?;
  let scenarios = doc
    .get("scenarios")
    .and_then(Value::as_mapping)
    .filter(|s| !s.is_empty())
    .ok_or_else(|| format_err("no scenarios are given"))?;
  scenarios
    .iter()
    .map(|(key, entry)| {
      let id = key_to_string(key).ok_or_else(|| format_err("scenario ids must be strings"))?;
      parse_scenario(id, entry)
    })
    .collect()
}

fn read(path: &Path) -> Result<String, ResultError> {
  fs::read_to_string(path).map_err(|source| ResultError::Io {
    path: path.to_path_buf(),
    source,
  })
}

pub fn parse_results(path: &Path) -> Result<Vec<RunResult>, ResultError> {
  parse_result_document(&read(path)?)
}

/// Parses a result document written for a single scenario.
pub fn parse_result(path: &Path) -> Result<RunResult, ResultError> {
  let mut results = parse_results(path)?;
  if results.len() != 1 {
    return Err(format_err(format!(
      "expected exactly one scenario in {}, found {}",
      path.display(),
      results.len()
    )));
  };
  Ok(results.remove(0))
}
