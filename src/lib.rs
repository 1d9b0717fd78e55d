pub mod error;
pub mod ffi;
pub mod formula;

uniffi::include_scaffolding!("formulary");

pub use error::{FormulaError, FormulaResult};
pub use ffi::Formula;
pub use formula::{supported_keywords, validate, Expression, KeywordInfo, KeywordKind, Value};

#[cfg(test)]
pub mod test_utils {
    /// Route `tracing` output to the test harness; `RUST_LOG` overrides the level.
    pub fn init_test_logging() {
        use tracing_subscriber::{fmt, EnvFilter};

        let _ = fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    }
}
