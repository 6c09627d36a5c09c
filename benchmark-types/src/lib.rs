pub mod error;
pub mod matrix;
pub mod parameter;
pub mod result;
pub mod template;

pub use error::ConfigError;
pub use error::ResultError;
pub use matrix::Scenario;
pub use matrix::ScenarioMatrix;
pub use parameter::BenchmarkPair;
pub use parameter::BenchmarkPairs;
pub use parameter::ParameterSpec;
pub use result::RunResult;
pub use result::RunSample;
pub use result::TimeUnit;
pub use template::Template;
