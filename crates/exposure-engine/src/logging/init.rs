use std::sync::Once;

/// Exposure logs at info; wgpu internals only above warn, since every
/// evaluation creates buffers and pipelines that wgpu would otherwise trace.
pub const DEFAULT_FILTER: &str = "info,wgpu_core=warn,wgpu_hal=warn,naga=warn";

/// How the host wants engine logs emitted.
///
/// Filters use `env_logger` syntax, e.g. "exposure_engine::evaluator=debug"
/// to follow submissions, supersession and delivery.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Overrides `RUST_LOG` when set.
    pub env_filter: Option<String>,
    pub write_style: env_logger::WriteStyle,
    /// Capture output per test instead of writing to stderr.
    pub is_test: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            write_style: env_logger::WriteStyle::Auto,
            is_test: false,
        }
    }
}

impl LoggingConfig {
    /// Debug-level engine logs routed through the test harness.
    pub fn for_tests() -> Self {
        Self {
            env_filter: Some(format!("exposure_engine=debug,{DEFAULT_FILTER}")),
            write_style: env_logger::WriteStyle::Never,
            is_test: true,
        }
    }

    /// Filter in effect: explicit config, then `rust_log`, then [`DEFAULT_FILTER`].
    pub fn filter(&self, rust_log: Option<&str>) -> String {
        self.env_filter
            .as_deref()
            .or(rust_log)
            .unwrap_or(DEFAULT_FILTER)
            .to_owned()
    }
}

static INIT: Once = Once::new();

/// Installs `env_logger` behind the `log` facade.
///
/// Only the first call has any effect. A host that already installed its own
/// logger keeps it.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let rust_log = std::env::var("RUST_LOG").ok();
        let filter = config.filter(rust_log.as_deref());

        let installed = env_logger::Builder::new()
            .parse_filters(&filter)
            .write_style(config.write_style)
            .is_test(config.is_test)
            .try_init()
            .is_ok();
        if installed {
            log::debug!("exposure engine logging: {filter}");
        }
    });
}
