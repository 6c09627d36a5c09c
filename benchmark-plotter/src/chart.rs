use crate::aggregation::Aggregation;
use crate::report::ReportError;
use benchmark_types::RunSample;
use benchmark_types::TimeUnit;
use charts_rs::BarChart;
use charts_rs::LineChart;
use charts_rs::Series;

const THEME: &str = "light";

/// Grouped bars: one series per secondary value, one group per primary value, each bar labelled with its throughput.
pub fn render_comparison_chart(aggregation: &Aggregation) -> Result<String, ReportError> {
  let primary = aggregation.primary();
  let secondary = aggregation.secondary();
  let series_list = (0..secondary.len())
    .map(|col| {
      let values = aggregation
        .series(col)
        .into_iter()
        .map(|v| v.trunc() as f32)
        .collect();
      let mut series = Series::new(secondary.label(col), values);
      series.label_show = true;
      series
    })
    .collect::<Vec<_>>();

  let mut chart = BarChart::new_with_theme(series_list, primary.values.clone(), THEME);
  chart.title_text = match &primary.id {
    Some(id) => format!("Throughput (byte/s) vs {id}"),
    None => "Throughput (byte/s)".to_string(),
  };
  chart.width = 200.0 + (primary.len() * secondary.len()) as f32 * 60.0;
  chart.height = 600.0;
  chart.legend_show = Some(secondary.id.is_some());
  chart
    .svg()
    .map_err(|e| ReportError::Chart(format!("{e:?}")))
}

/// Buckets recorded within the sample's duration as (elapsed seconds at bucket end, operations).
pub fn timeseries_points(sample: &RunSample, unit: TimeUnit) -> Vec<(u64, u64)> {
  let bucket_secs = unit.seconds();
  let buckets = (sample.duration / bucket_secs as f64).ceil() as usize;
  sample
    .per_interval
    .iter()
    .take(buckets)
    .enumerate()
    .map(|(i, ops)| ((i as u64 + 1) * bucket_secs, *ops))
    .collect()
}

pub fn render_timeseries(
  title: &str,
  sample: &RunSample,
  unit: TimeUnit,
) -> Result<Option<String>, ReportError> {
  let points = timeseries_points(sample, unit);
  if points.is_empty() {
    return Ok(None);
  };
  let x_axis = points.iter().map(|(t, _)| t.to_string()).collect();
  let values = points.iter().map(|(_, ops)| *ops as f32).collect();
  let series = Series::new(format!("operations per {}", unit.unit_name()), values);
  let mut chart = LineChart::new_with_theme(vec![series], x_axis, THEME);
  chart.title_text = format!("{title} (time, s)");
  chart.width = 800.0;
  chart.height = 400.0;
  chart
    .svg()
    .map(Some)
    .map_err(|e| ReportError::Chart(format!("{e:?}")))
}
