//! Options that apply to a whole pipeline run.

use serde::Deserialize;
use serde::Serialize;
use tracing::level_filters::LevelFilter;

use crate::errors::Error;
use crate::errors::Result;

/// Configuration for translating and running a pipeline.
///
/// Every field has a default, so a JSON document only needs to name
/// what it overrides.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Shows up in logs and as the timely dataflow name.
    pub job_name: String,
    /// Number of worker threads [`crate::run::cluster_main`] starts.
    pub workers: usize,
    /// One of `trace`, `debug`, `info`, `warn` or `error`.
    pub log_level: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            job_name: "flowport".to_owned(),
            workers: 1,
            log_level: "error".to_owned(),
        }
    }
}

impl PipelineOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::InvalidOptions(
                "workers must be at least 1".to_owned(),
            ));
        }
        self.level_filter()?;
        Ok(())
    }

    pub fn level_filter(&self) -> Result<LevelFilter> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(LevelFilter::TRACE),
            "debug" => Ok(LevelFilter::DEBUG),
            "info" => Ok(LevelFilter::INFO),
            "warn" => Ok(LevelFilter::WARN),
            "error" => Ok(LevelFilter::ERROR),
            level => Err(Error::InvalidOptions(format!("wrong log level: {level}"))),
        }
    }
}
