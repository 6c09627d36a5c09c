use crate::aggregation::Aggregation;
use crate::chart::render_comparison_chart;
use crate::chart::render_timeseries;
use crate::table::render_table;
use benchmark_types::RunResult;
use serde_yaml::Mapping;
use std::error::Error;
use std::fmt::Display;
use std::fs;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use tracing::info;

/*

# Report

Two markdown documents are written into the report directory and linked to each other:

- `report.md` gets one `# Report <n>` section per completed matrix: the config snapshot of its last run, a bar chart `fig<n>.svg` when the matrix had more than one run, and the throughput table.
- `timeplots.md` gets one section per run that recorded per-interval counts, with a chart per sample.

Sections are appended as soon as they are known so that a later abort keeps everything already measured.

*/

pub const MAIN_FILE: &str = "report.md";
pub const TIMEPLOTS_FILE: &str = "timeplots.md";

#[derive(Debug)]
pub enum ReportError {
  Io { path: PathBuf, source: io::Error },
  Yaml(serde_yaml::Error),
  Chart(String),
}

impl Display for ReportError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ReportError::Io { path, source } => {
        write!(f, "failed to write report file {}: {source}", path.display())
      }
      ReportError::Yaml(e) => write!(f, "failed to serialise config snapshot: {e}"),
      ReportError::Chart(msg) => write!(f, "failed to render chart: {msg}"),
    }
  }
}

impl Error for ReportError {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    match self {
      ReportError::Io { source, .. } => Some(source),
      ReportError::Yaml(e) => Some(e),
      ReportError::Chart(_) => None,
    }
  }
}

impl From<serde_yaml::Error> for ReportError {
  fn from(e: serde_yaml::Error) -> Self {
    ReportError::Yaml(e)
  }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> ReportError + '_ {
  move |source| ReportError::Io {
    path: path.to_path_buf(),
    source,
  }
}

fn append(path: &Path, text: &str) -> Result<(), ReportError> {
  let mut file = OpenOptions::new()
    .append(true)
    .create(true)
    .open(path)
    .map_err(io_err(path))?;
  file.write_all(text.as_bytes()).map_err(io_err(path))
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), ReportError> {
  fs::write(path, contents).map_err(io_err(path))
}

fn yaml_block(config: &Mapping) -> Result<String, ReportError> {
  let yaml = serde_yaml::to_string(config)?;
  Ok(format!("```yaml\n{yaml}```\n"))
}

pub struct Report {
  dir: PathBuf,
  reports_added: usize,
  timeplots_added: usize,
}

impl Report {
  /// Creates the report directory and starts both documents afresh.
  pub fn create(dir: &Path) -> Result<Report, ReportError> {
    fs::create_dir_all(dir).map_err(io_err(dir))?;
    write_file(
      &dir.join(MAIN_FILE),
      format!("# Benchmark report\n\n[Timeplot collection is here]({TIMEPLOTS_FILE})\n").as_bytes(),
    )?;
    write_file(
      &dir.join(TIMEPLOTS_FILE),
      format!("# Timeplot collection report\n\n[Main report is here]({MAIN_FILE})\n").as_bytes(),
    )?;
    Ok(Report {
      dir: dir.to_path_buf(),
      reports_added: 0,
      timeplots_added: 0,
    })
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  pub fn main_file(&self) -> PathBuf {
    self.dir.join(MAIN_FILE)
  }

  pub fn timeplots_file(&self) -> PathBuf {
    self.dir.join(TIMEPLOTS_FILE)
  }

  /// Appends the section of one completed matrix. `config` is the sanitised config of its last run.
  pub fn add_aggregation(
    &mut self,
    aggregation: &Aggregation,
    config: &Mapping,
  ) -> Result<(), ReportError> {
    self.reports_added += 1;
    let n = self.reports_added;
    let mut section = format!("\n# Report {n}\n\n**Benchmark config:**\n\n");
    section.push_str(&yaml_block(config)?);

    if aggregation.run_count() > 1 {
      let fig = format!("fig{n}.svg");
      write_file(&self.dir.join(&fig), render_comparison_chart(aggregation)?.as_bytes())?;
      section.push_str(&format!("\n![Fig: throughput vs parameter]({fig})\n"));
    };

    section.push('\n');
    section.push_str(&render_table(aggregation).into_string());
    section.push('\n');
    append(&self.main_file(), &section)?;
    info!(report = n, runs = aggregation.run_count(), "added report section");
    Ok(())
  }

  /// Writes a chart for every sample of `result` with per-interval counts. Returns the chart file names.
  pub fn add_timeplot(&mut self, result: &RunResult) -> Result<Vec<String>, ReportError> {
    let mut files = Vec::new();
    for sample in &result.samples {
      let title = format!("{} #{}", result.scenario_id, self.timeplots_added);
      let Some(svg) = render_timeseries(&title, sample, result.time_unit)? else {
        continue;
      };
      let file = format!(
        "plot_per_interval_{}_{}.svg",
        result.scenario_id, self.timeplots_added
      );
      write_file(&self.dir.join(&file), svg.as_bytes())?;
      self.timeplots_added += 1;
      files.push(file);
    }
    if files.is_empty() {
      return Ok(files);
    };

    let mut section = String::from("\n**Config:**\n\n");
    section.push_str(&yaml_block(&result.config)?);
    section.push_str("\n_____________\n");
    for file in &files {
      section.push_str(&format!("\n![Fig]({file})\n"));
    }
    append(&self.timeplots_file(), &section)?;
    info!(scenario = %result.scenario_id, charts = files.len(), "added timeplots");
    Ok(files)
  }
}
