pub mod aggregation;
pub mod chart;
pub mod report;
pub mod table;

pub use aggregation::Aggregation;
pub use aggregation::Axis;
pub use chart::render_comparison_chart;
pub use chart::render_timeseries;
pub use report::Report;
pub use report::ReportError;
pub use table::render_table;
