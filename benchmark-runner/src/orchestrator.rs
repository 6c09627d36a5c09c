use crate::driver::DriverError;
use crate::driver::RunDriver;
use benchmark_plotter::Aggregation;
use benchmark_plotter::Report;
use benchmark_plotter::ReportError;
use benchmark_types::parameter;
use benchmark_types::ConfigError;
use benchmark_types::ScenarioMatrix;
use serde_yaml::Mapping;
use std::error::Error;
use std::fmt::Display;
use std::path::Path;
use tracing::error;
use tracing::info;
use tracing::warn;

/*

# Orchestration

Benchmark pairs are pulled one at a time from the config. Each pair is expanded into its scenario matrix, which is checked against the template before anything is deployed. Scenarios run strictly one after another; the driver tears each deployment down before returning.

A run that times out deploying, writes a malformed result, or reports its own error abandons the rest of its matrix and no report section is written for it. The loop then moves on to the next pair. Anything else stops the whole process.

*/

#[derive(Debug)]
pub enum OrchestratorError {
  Config(ConfigError),
  Driver(DriverError),
  Report(ReportError),
}

impl Display for OrchestratorError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      OrchestratorError::Config(e) => write!(f, "invalid config: {e}"),
      OrchestratorError::Driver(e) => write!(f, "{e}"),
      OrchestratorError::Report(e) => write!(f, "{e}"),
    }
  }
}

impl Error for OrchestratorError {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    match self {
      OrchestratorError::Config(e) => Some(e),
      OrchestratorError::Driver(e) => Some(e),
      OrchestratorError::Report(e) => Some(e),
    }
  }
}

impl From<ConfigError> for OrchestratorError {
  fn from(e: ConfigError) -> Self {
    OrchestratorError::Config(e)
  }
}

impl From<DriverError> for OrchestratorError {
  fn from(e: DriverError) -> Self {
    OrchestratorError::Driver(e)
  }
}

impl From<ReportError> for OrchestratorError {
  fn from(e: ReportError) -> Self {
    OrchestratorError::Report(e)
  }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Summary {
  pub completed: usize,
  pub aborted: usize,
}

pub async fn run(
  config_path: &Path,
  driver: &RunDriver,
  report: &mut Report,
) -> Result<Summary, OrchestratorError> {
  let (template, pairs) = parameter::load(config_path)?;
  info!(path = %config_path.display(), "loaded orchestrator config");

  let mut summary = Summary::default();
  for (n, pair) in pairs.enumerate() {
    let matrix = ScenarioMatrix::new(&template, pair?)?;
    let pair = matrix.pair().clone();
    info!(
      benchmark = n + 1,
      primary = pair.primary.id.as_deref().unwrap_or("-"),
      secondary = pair.secondary.id.as_deref().unwrap_or("-"),
      runs = matrix.len(),
      "starting benchmark"
    );

    let mut aggregation = Aggregation::for_pair(&pair);
    let mut last_config: Option<Mapping> = None;
    let mut aborted = false;
    for scenario in matrix {
      let scenario = scenario?;
      let (p, s) = (scenario.primary_index, scenario.secondary_index);
      info!(scenario = %scenario.label(), "running scenario");
      match driver.execute(scenario).await {
        Ok(result) => {
          if !aggregation.insert(p, s, result.throughput()) {
            warn!(
              benchmark = n + 1,
              primary_index = p,
              secondary_index = s,
              "result has no cell in the table"
            );
          };
          report.add_timeplot(&result)?;
          last_config = Some(result.config);
        }
        Err(err) if err.aborts_matrix() => {
          error!(benchmark = n + 1, error = %err, "benchmark aborted");
          aborted = true;
          break;
        }
        Err(err) => return Err(err.into()),
      };
    }

    match (aborted, last_config) {
      (false, Some(config)) => {
        report.add_aggregation(&aggregation, &config)?;
        summary.completed += 1;
      }
      _ => summary.aborted += 1,
    };
  }
  Ok(summary)
}
