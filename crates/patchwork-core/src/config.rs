//! Runtime configuration.

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// Environment variable that turns on per-list patch tracing.
pub const DEBUG_ENV: &str = "PATCHWORK_DEBUG";

/// Environment variable that turns on component init and render timing.
pub const PERF_ENV: &str = "PATCHWORK_PERF";

/// Loading-indicator delay used when an async component declares a
/// loading view without an explicit delay.
pub const DEFAULT_LOADING_DELAY: Duration = Duration::from_millis(200);

pub type WarnHandler = Rc<dyn Fn(&str)>;
/// Receives a measurement label such as `<list> init` and its duration.
pub type MeasureHandler = Rc<dyn Fn(&str, Duration)>;

#[derive(Clone)]
pub struct Config {
    /// Suppress warnings that would otherwise go to the `log` facade.
    pub silent: bool,
    /// Receives every warning instead of the `log` facade when set.
    pub warn_handler: Option<WarnHandler>,
    pub default_loading_delay: Duration,
    /// Emit a debug record for every reconciled child list.
    pub debug_patches: bool,
    /// Time each component's init, render and first patch.
    pub performance: bool,
    pub measure_handler: Option<MeasureHandler>,
}

impl Config {
    /// Defaults plus whatever the process environment asks for.
    pub fn from_env() -> Self {
        Self {
            debug_patches: std::env::var(DEBUG_ENV).is_ok(),
            performance: std::env::var(PERF_ENV).is_ok(),
            ..Self::default()
        }
    }

    pub fn with_warn_handler(mut self, handler: impl Fn(&str) + 'static) -> Self {
        self.warn_handler = Some(Rc::new(handler));
        self
    }

    /// Turns on timing and routes every measurement to `handler`.
    pub fn with_measure_handler(mut self, handler: impl Fn(&str, Duration) + 'static) -> Self {
        self.performance = true;
        self.measure_handler = Some(Rc::new(handler));
        self
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn measure(&self, label: &str, elapsed: Duration) {
        match &self.measure_handler {
            Some(handler) => handler(label, elapsed),
            None => log::debug!("{label}: {elapsed:?}"),
        }
    }

    pub fn warn(&self, message: &str) {
        if let Some(handler) = &self.warn_handler {
            handler(message);
        } else if !self.silent {
            log::warn!("[patchwork] {message}");
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            silent: false,
            warn_handler: None,
            default_loading_delay: DEFAULT_LOADING_DELAY,
            debug_patches: false,
            performance: false,
            measure_handler: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("silent", &self.silent)
            .field("warn_handler", &self.warn_handler.is_some())
            .field("default_loading_delay", &self.default_loading_delay)
            .field("debug_patches", &self.debug_patches)
            .field("performance", &self.performance)
            .finish()
    }
}
