//! Structured job logging.

use tracing::{error, info, warn, Span};

/// Lifecycle logger carrying a job id and operation on every line.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: &'static str,
}

impl JobLogger {
    /// `operation` is e.g. "generation", "merge", "recovery".
    pub fn new(job_id: impl std::fmt::Display, operation: &'static str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(job_id = %self.job_id, operation = self.operation, "Job started: {}", message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(job_id = %self.job_id, operation = self.operation, "Job progress: {}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(job_id = %self.job_id, operation = self.operation, "Job warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(job_id = %self.job_id, operation = self.operation, "Job error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(job_id = %self.job_id, operation = self.operation, "Job completed: {}", message);
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        self.operation
    }

    /// Span to instrument the job's background task with.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, operation = self.operation)
    }
}

/// Install the global subscriber: JSON when `LOG_FORMAT=json`, ANSI otherwise.
///
/// `RUST_LOG` directives are honored on top of the `reel=info` default.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    if let Ok(directive) = "reel=info".parse() {
        env_filter = env_filter.add_directive(directive);
    }

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if use_json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry
            .with(fmt::layer().with_ansi(true).with_target(true))
            .try_init()
    };
    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_fields() {
        let logger = JobLogger::new("gen-123", "generation");
        assert_eq!(logger.job_id(), "gen-123");
        assert_eq!(logger.operation(), "generation");
        logger.log_progress("polling");
    }
}
