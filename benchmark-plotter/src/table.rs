use crate::aggregation::Aggregation;
use maud::html;
use maud::Markup;

const TABLE_STYLE: &str = "table, th, td { border: 1px solid black; border-collapse: collapse; } th, td { text-align: left; }";

/// Renders throughput as an HTML table: one row per primary value, one column per secondary value.
pub fn render_table(aggregation: &Aggregation) -> Markup {
  let primary = aggregation.primary();
  let secondary = aggregation.secondary();
  html! {
    h3 { "Throughput, byte/s:" }
    style { (TABLE_STYLE) }
    table {
      tr {
        th { (primary.id.as_deref().unwrap_or_default()) }
        @for col in 0..secondary.len() {
          th { (secondary.label(col)) }
        }
      }
      @for (row, value) in primary.values.iter().enumerate() {
        tr {
          th { (value) }
          @for col in 0..secondary.len() {
            td {
              @match aggregation.get(row, col) {
                Some(throughput) => { (throughput as u64) }
                None => { "-" }
              }
            }
          }
        }
      }
    }
  }
}
