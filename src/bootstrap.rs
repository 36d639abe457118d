//! One-time process setup
//!
//! Runs before any pipeline component is built and never again: logging,
//! plus the ONNX runtime environment when the neural backend is compiled in.

use log::LevelFilter;
use once_cell::sync::OnceCell;
use serde::Serialize;

static ENVIRONMENT: OnceCell<Environment> = OnceCell::new();

/// What the process was set up with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Environment {
    pub version: &'static str,
    /// Cargo features compiled into this build
    pub features: Vec<&'static str>,
    pub log_level: String,
}

/// Initialise the process environment; later calls return the first report
pub fn initialize(level: LevelFilter) -> &'static Environment {
    ENVIRONMENT.get_or_init(|| {
        // RUST_LOG still wins over the CLI level
        let _ = env_logger::Builder::new()
            .filter_level(level)
            .parse_default_env()
            .format_timestamp(None)
            .try_init();

        #[cfg(feature = "neural")]
        {
            if let Err(err) = ort::init().with_name("downbeat-sync").commit() {
                log::warn!("ONNX runtime initialisation failed: {}", err);
            }
        }

        let environment = Environment {
            version: env!("CARGO_PKG_VERSION"),
            features: compiled_features(),
            log_level: level.to_string(),
        };
        log::debug!("Environment ready: {:?}", environment);
        environment
    })
}

/// The process environment, if [`initialize`] has run
pub fn environment() -> Option<&'static Environment> {
    ENVIRONMENT.get()
}

fn compiled_features() -> Vec<&'static str> {
    let mut features = Vec::new();
    if cfg!(feature = "spectral") {
        features.push("spectral");
    }
    if cfg!(feature = "neural") {
        features.push("neural");
    }
    features
}
