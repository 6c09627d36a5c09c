use benchmark_plotter::Aggregation;
use benchmark_plotter::Axis;
use benchmark_plotter::Report;
use benchmark_types::result::parse_results;
use clap::Parser;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing::info;

/// Renders a report from an existing result document without deploying anything.
#[derive(Parser)]
struct Cli {
  /// Result document written by the benchmarking client.
  #[arg(long, default_value = "benchmarkResult.yaml")]
  results: PathBuf,

  /// Directory the report files are written into.
  #[arg(long, default_value = "report")]
  out: PathBuf,
}

fn render(cli: &Cli) -> Result<(), Box<dyn Error>> {
  let results = parse_results(&cli.results)?;
  info!(path = %cli.results.display(), scenarios = results.len(), "loaded results");

  let ids = results.iter().map(|r| r.scenario_id.clone()).collect();
  let mut aggregation = Aggregation::new(Axis::new("scenario", ids), Axis::unvaried());
  let mut report = Report::create(&cli.out)?;
  for (i, result) in results.iter().enumerate() {
    aggregation.insert(i, 0, result.throughput());
    report.add_timeplot(result)?;
  }
  // parse_results never returns an empty list.
  if let Some(last) = results.last() {
    report.add_aggregation(&aggregation, &last.config)?;
  };
  info!(path = %report.main_file().display(), "report written");
  Ok(())
}

fn main() -> ExitCode {
  tracing_subscriber::fmt::init();

  let cli = Cli::parse();
  match render(&cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      error!(error = %err, "failed to render report");
      ExitCode::FAILURE
    }
  }
}
