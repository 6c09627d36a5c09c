use benchmark_plotter::Report;
use benchmark_runner::driver::DriverError;
use benchmark_runner::driver::DriverOptions;
use benchmark_runner::driver::RunDriver;
use benchmark_runner::orchestrator;
use benchmark_runner::orchestrator::OrchestratorError;
use benchmark_runner::orchestrator::Summary;
use benchmark_runner::Launcher;
use benchmark_types::ConfigError;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

// Stands in for the benchmarking client: echoes the scenario back with fixed measurements, or reports an error when asked to.
const FAKE_CLIENT: &str = r#"
conf="$2"
out="$4"
if grep -q 'method: fail' "$conf"; then
  printf 'scenarios:\n  scenario_1:\n    error: disk full\n' > "$out"
  exit 1
fi
id=$(sed -n 's/^  \(scenario_[0-9]*\):.*/\1/p' "$conf" | head -n 1)
value_size=$(sed -n 's/^ *value_size: *\([0-9]*\).*/\1/p' "$conf" | head -n 1)
cat > "$out" <<EOF
scenarios:
  $id:
    results:
      - duration: 2.0
        count: 1000
        per_interval: [500, 500]
    scenario:
      zstor_config:
        namespace: secret-ns
      bench_config:
        value_size: $value_size
        result_output: per_second
EOF
"#;

const TEMPLATE: &str = "
template:
  zstor_config:
    namespace: secret-ns
    distribution_data: 0
    distribution_parity: 0
    meta_shards_nr: 0
  bench_config:
    method: write
    value_size: 256
    result_output: per_second
";

struct Fixture {
  dir: TempDir,
  driver: RunDriver,
}

impl Fixture {
  fn new(client_script: &str) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("client.sh");
    fs::write(&script, client_script).unwrap();
    let driver = RunDriver::new(DriverOptions {
      client: Launcher::with_args("sh", vec![script.display().to_string()]),
      scenario_path: dir.path().join("scenariosConf.yaml"),
      result_path: dir.path().join("benchmarkResult.yaml"),
      ready_timeout: Duration::from_secs(5),
      ..DriverOptions::default()
    });
    Fixture { dir, driver }
  }

  fn config(&self, benchmarks: &str) -> std::path::PathBuf {
    let path = self.dir.path().join("orchConfig.yaml");
    fs::write(&path, format!("{TEMPLATE}{benchmarks}")).unwrap();
    path
  }

  fn report(&self) -> Report {
    Report::create(&self.dir.path().join("report")).unwrap()
  }

  fn read(&self, file: &str) -> String {
    fs::read_to_string(self.dir.path().join("report").join(file)).unwrap()
  }
}

fn exists(dir: &Path, file: &str) -> bool {
  dir.join("report").join(file).exists()
}

#[tokio::test]
async fn test_failed_run_aborts_only_its_matrix() {
  let fx = Fixture::new(FAKE_CLIENT);
  let config = fx.config(
    "
benchmarks:
  - prime_parameter:
      id: value_size
      range: 256, 512
  - prime_parameter:
      id: method
      range: write fail
  - prime_parameter:
      id: value_size
      range: 1024
",
  );
  let mut report = fx.report();
  let summary = orchestrator::run(&config, &fx.driver, &mut report)
    .await
    .unwrap();
  assert_eq!(
    summary,
    Summary {
      completed: 2,
      aborted: 1,
    }
  );

  let main = fx.read("report.md");
  assert!(main.contains("# Report 1\n"));
  assert!(main.contains("<th>value_size</th>"));
  // 1000 * 256 / 2.0 and 1000 * 512 / 2.0
  assert!(main.contains("<tr><th>256</th><td>128000</td></tr>"));
  assert!(main.contains("<tr><th>512</th><td>256000</td></tr>"));
  assert!(main.contains("(fig1.svg)"));
  assert!(exists(fx.dir.path(), "fig1.svg"));
  // The aborted matrix gets no section; the one after it is numbered next.
  assert!(main.contains("# Report 2\n"));
  assert!(main.contains("<tr><th>1024</th><td>512000</td></tr>"));
  assert!(!main.contains("# Report 3"));
  assert!(!exists(fx.dir.path(), "fig2.svg"));
  assert!(!main.contains("secret-ns"));

  let plots = fx.read("timeplots.md");
  assert_eq!(plots.matches("![Fig]").count(), 4);
}

#[tokio::test]
async fn test_scenario_document_points_at_local_deployment() {
  let fx = Fixture::new(FAKE_CLIENT);
  let config = fx.config("");
  let mut report = fx.report();
  orchestrator::run(&config, &fx.driver, &mut report)
    .await
    .unwrap();

  let persisted: serde_yaml::Value =
    serde_yaml::from_str(&fs::read_to_string(fx.dir.path().join("scenariosConf.yaml")).unwrap())
      .unwrap();
  let scenario = &persisted["scenarios"]["scenario_1"];
  assert_eq!(scenario["zstor_config"]["data_shards"], serde_yaml::Value::Sequence(vec![]));
  assert_eq!(scenario["zstor_config"]["meta_shards"], serde_yaml::Value::Sequence(vec![]));
  assert_eq!(scenario["bench_config"]["value_size"], serde_yaml::Value::from(256));
}

#[tokio::test]
async fn test_duplicate_parameter_stops_before_running() {
  let fx = Fixture::new(FAKE_CLIENT);
  let config = fx.config(
    "
benchmarks:
  - prime_parameter:
      id: value_size
      range: 1,2
    second_parameter:
      id: value_size
      range: 3,4
",
  );
  let mut report = fx.report();
  let err = orchestrator::run(&config, &fx.driver, &mut report)
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    OrchestratorError::Config(ConfigError::DuplicateParameter { .. })
  ));
  assert!(!fx.dir.path().join("scenariosConf.yaml").exists());
}

#[tokio::test]
async fn test_bad_range_value_stops_before_running() {
  let fx = Fixture::new(FAKE_CLIENT);
  let config = fx.config(
    "
benchmarks:
  - prime_parameter:
      id: value_size
      range: 256, big
",
  );
  let mut report = fx.report();
  let err = orchestrator::run(&config, &fx.driver, &mut report)
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    OrchestratorError::Config(ConfigError::Coercion { .. })
  ));
  assert!(!fx.dir.path().join("scenariosConf.yaml").exists());
  assert!(!fx.read("timeplots.md").contains("![Fig]"));
}

#[tokio::test]
async fn test_stale_result_is_not_reused() {
  let fx = Fixture::new("exit 0\n");
  fs::write(
    fx.dir.path().join("benchmarkResult.yaml"),
    "scenarios:\n  scenario_1:\n    results: [{duration: 1, count: 1}]\n    scenario: {bench_config: {value_size: 1}}\n",
  )
  .unwrap();
  let config = fx.config("");
  let mut report = fx.report();
  let summary = orchestrator::run(&config, &fx.driver, &mut report)
    .await
    .unwrap();
  assert_eq!(
    summary,
    Summary {
      completed: 0,
      aborted: 1,
    }
  );
  assert!(!fx.read("report.md").contains("# Report"));
}

#[tokio::test]
async fn test_missing_client_is_fatal() {
  let fx = Fixture::new(FAKE_CLIENT);
  let driver = RunDriver::new(DriverOptions {
    client: Launcher::new("/nonexistent/zstorbench"),
    ..fx.driver.options().clone()
  });
  let config = fx.config("");
  let mut report = fx.report();
  let err = orchestrator::run(&config, &driver, &mut report)
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    OrchestratorError::Driver(DriverError::ClientInvocation { .. })
  ));
}
