use crate::deploy::DeployError;
use crate::deploy::DeployOptions;
use crate::deploy::Deployment;
use crate::deploy::DEFAULT_READY_TIMEOUT;
use crate::plan::rewrite_addresses;
use crate::plan::DeploymentPlan;
use crate::Launcher;
use benchmark_types::result::parse_result;
use benchmark_types::ConfigError;
use benchmark_types::ResultError;
use benchmark_types::RunResult;
use benchmark_types::Scenario;
use std::error::Error;
use std::fmt::Display;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tracing::info;
use tracing::warn;

#[derive(Debug)]
pub enum DriverError {
  Config(ConfigError),
  Deploy(DeployError),
  /// The benchmarking client could not be started at all.
  ClientInvocation { program: String, source: io::Error },
  Io { path: PathBuf, source: io::Error },
  Result(ResultError),
}

impl DriverError {
  /// Whether the failure only invalidates the current matrix. Anything else stops the whole process.
  pub fn aborts_matrix(&self) -> bool {
    matches!(
      self,
      DriverError::Deploy(DeployError::Timeout { .. })
        | DriverError::Result(
          ResultError::Format(_) | ResultError::Yaml(_) | ResultError::RunFailure { .. }
        )
    )
  }
}

impl Display for DriverError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      DriverError::Config(e) => write!(f, "configuration error: {e}"),
      DriverError::Deploy(e) => write!(f, "deployment failed: {e}"),
      DriverError::ClientInvocation { program, source } => {
        write!(f, "failed to run benchmark client {program}: {source}")
      }
      DriverError::Io { path, source } => write!(f, "failed to access {}: {source}", path.display()),
      DriverError::Result(e) => write!(f, "{e}"),
    }
  }
}

impl Error for DriverError {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    match self {
      DriverError::Config(e) => Some(e),
      DriverError::Deploy(e) => Some(e),
      DriverError::ClientInvocation { source, .. } => Some(source),
      DriverError::Io { source, .. } => Some(source),
      DriverError::Result(e) => Some(e),
    }
  }
}

impl From<ConfigError> for DriverError {
  fn from(e: ConfigError) -> Self {
    DriverError::Config(e)
  }
}

impl From<DeployError> for DriverError {
  fn from(e: DeployError) -> Self {
    DriverError::Deploy(e)
  }
}

impl From<ResultError> for DriverError {
  fn from(e: ResultError) -> Self {
    DriverError::Result(e)
  }
}

#[derive(Clone, Debug)]
pub struct DriverOptions {
  pub client: Launcher,
  /// Where each scenario document is written for the client.
  pub scenario_path: PathBuf,
  /// Where the client writes its results.
  pub result_path: PathBuf,
  pub ready_timeout: Duration,
  pub deploy: DeployOptions,
}

impl Default for DriverOptions {
  fn default() -> Self {
    Self {
      client: Launcher::new("zstorbench"),
      scenario_path: PathBuf::from("scenariosConf.yaml"),
      result_path: PathBuf::from("benchmarkResult.yaml"),
      ready_timeout: DEFAULT_READY_TIMEOUT,
      deploy: DeployOptions::default(),
    }
  }
}

fn remove_stale(path: &Path) -> Result<(), DriverError> {
  match fs::remove_file(path) {
    Err(err) if err.kind() != io::ErrorKind::NotFound => Err(DriverError::Io {
      path: path.to_path_buf(),
      source: err,
    }),
    _ => Ok(()),
  }
}

/// Runs one scenario end to end: deploy, benchmark, tear down, parse.
pub struct RunDriver {
  options: DriverOptions,
}

impl RunDriver {
  pub fn new(options: DriverOptions) -> Self {
    Self { options }
  }

  pub fn options(&self) -> &DriverOptions {
    &self.options
  }

  pub async fn execute(&self, mut scenario: Scenario) -> Result<RunResult, DriverError> {
    let plan = DeploymentPlan::resolve(&scenario.template)?;
    let mut deployment = Deployment::new(self.options.deploy.clone());
    let outcome = self.run(&mut deployment, plan, &mut scenario).await;
    // Teardown happens whatever the outcome; stop warnings are already logged.
    deployment.stop_all().await;
    deployment.cleanup();
    outcome?;

    if !self.options.result_path.exists() {
      return Err(DriverError::Result(ResultError::Format(format!(
        "client wrote no result file at {}",
        self.options.result_path.display()
      ))));
    };
    let result = parse_result(&self.options.result_path)?;
    info!(
      scenario = %result.scenario_id,
      throughput = result.throughput(),
      "scenario finished"
    );
    Ok(result)
  }

  async fn run(
    &self,
    deployment: &mut Deployment,
    plan: DeploymentPlan,
    scenario: &mut Scenario,
  ) -> Result<(), DriverError> {
    let data = deployment.start_data_shards(plan.data_shards, plan.data_base_port)?;
    let meta = deployment.start_metadata_shards(plan.meta_shards, plan.meta_base_port)?;
    deployment.wait_until_ready(self.options.ready_timeout).await?;
    info!(
      data_shards = data.len(),
      meta_shards = meta.len(),
      "deployment is ready"
    );

    rewrite_addresses(&mut scenario.template, &data, &meta)?;
    scenario
      .persist(&self.options.scenario_path)
      .map_err(|err| match err {
        ConfigError::Io { path, source } => DriverError::Io { path, source },
        other => DriverError::Config(other),
      })?;
    remove_stale(&self.options.result_path)?;
    self.invoke_client().await
  }

  async fn invoke_client(&self) -> Result<(), DriverError> {
    let client = &self.options.client;
    let mut cmd = client.command();
    cmd
      .arg("--conf")
      .arg(&self.options.scenario_path)
      .arg("--out-benchmark")
      .arg(&self.options.result_path);
    if let Some(p) = &self.options.deploy.profiling {
      let out = p.dir.join("client");
      fs::create_dir_all(&out).map_err(|source| DriverError::Io {
        path: out.clone(),
        source,
      })?;
      cmd
        .arg("--profile-mode")
        .arg(p.mode.as_str())
        .arg("--out-profile")
        .arg(&out);
    };
    info!(program = %client.program, conf = %self.options.scenario_path.display(), "running benchmark client");
    let status = cmd
      .stdin(Stdio::null())
      .kill_on_drop(true)
      .status()
      .await
      .map_err(|source| DriverError::ClientInvocation {
        program: client.program.clone(),
        source,
      })?;
    if status.success() {
      info!(%status, "benchmark client exited");
    } else {
      // The result document decides whether the run failed.
      warn!(%status, "benchmark client exited unsuccessfully");
    };
    Ok(())
  }
}
