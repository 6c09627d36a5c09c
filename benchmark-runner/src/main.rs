use benchmark_plotter::Report;
use benchmark_runner::deploy::DeployOptions;
use benchmark_runner::driver::DriverOptions;
use benchmark_runner::driver::RunDriver;
use benchmark_runner::orchestrator;
use benchmark_runner::Launcher;
use benchmark_runner::ProfileMode;
use benchmark_runner::Profiling;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::error;
use tracing::info;

/*

# Benchmark runner

Runs every scenario of every benchmark declared in the orchestrator config against a fresh local deployment of storage and metadata servers, then writes a markdown report comparing throughput across each benchmark's parameter values.

*/

#[derive(Parser)]
struct Cli {
  /// Orchestrator config holding the template and the benchmarks.
  #[arg(long, default_value = "orchConfig.yaml")]
  config: PathBuf,

  /// Where each scenario is written for the benchmarking client.
  #[arg(long, default_value = "scenariosConf.yaml")]
  scenario_output: PathBuf,

  /// Where the benchmarking client writes its results.
  #[arg(long, default_value = "benchmarkResult.yaml")]
  result_output: PathBuf,

  #[arg(long, default_value = "report")]
  report_dir: PathBuf,

  /// Benchmarking client binary.
  #[arg(long, default_value = "zstorbench")]
  client: String,

  /// Extra argument placed before the client's own flags (repeatable).
  #[arg(long)]
  client_arg: Vec<String>,

  #[arg(long, default_value = "zstordb")]
  storage_server: String,

  #[arg(long)]
  storage_server_arg: Vec<String>,

  #[arg(long, default_value = "etcd")]
  metadata_server: String,

  #[arg(long)]
  metadata_server_arg: Vec<String>,

  /// Worker count for each storage server.
  #[arg(long, default_value_t = 0)]
  jobs: usize,

  #[arg(long, default_value_t = 20)]
  ready_timeout_secs: u64,

  /// How long a server may take to exit after being asked to stop.
  #[arg(long, default_value_t = 10)]
  stop_grace_secs: u64,

  /// Profile the servers and the client.
  #[arg(long, value_enum)]
  profile_mode: Option<ProfileMode>,

  #[arg(long, default_value = "profile")]
  profile_dir: PathBuf,
}

impl Cli {
  fn driver_options(self) -> DriverOptions {
    let profiling = self.profile_mode.map(|mode| Profiling {
      mode,
      dir: self.profile_dir.clone(),
    });
    DriverOptions {
      client: Launcher::with_args(self.client, self.client_arg),
      scenario_path: self.scenario_output,
      result_path: self.result_output,
      ready_timeout: Duration::from_secs(self.ready_timeout_secs),
      deploy: DeployOptions {
        storage_server: Launcher::with_args(self.storage_server, self.storage_server_arg),
        metadata_server: Launcher::with_args(self.metadata_server, self.metadata_server_arg),
        jobs: self.jobs,
        stop_grace: Duration::from_secs(self.stop_grace_secs),
        profiling,
      },
    }
  }
}

#[tokio::main]
async fn main() -> ExitCode {
  tracing_subscriber::fmt::init();

  let cli = Cli::parse();
  let config_path = cli.config.clone();
  let report_dir = cli.report_dir.clone();
  let driver = RunDriver::new(cli.driver_options());

  let mut report = match Report::create(&report_dir) {
    Ok(r) => r,
    Err(err) => {
      error!(error = %err, "failed to create report");
      return ExitCode::FAILURE;
    }
  };

  match orchestrator::run(&config_path, &driver, &mut report).await {
    Ok(summary) => {
      info!(
        completed = summary.completed,
        aborted = summary.aborted,
        report = %report.main_file().display(),
        "all benchmarks finished"
      );
      if summary.aborted > 0 {
        ExitCode::FAILURE
      } else {
        ExitCode::SUCCESS
      }
    }
    Err(err) => {
      error!(error = %err, "benchmarking stopped");
      ExitCode::FAILURE
    }
  }
}
