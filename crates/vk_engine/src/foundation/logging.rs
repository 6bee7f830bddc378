//! Logging utilities

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system from `RUST_LOG`, defaulting to `info`
pub fn init() {
    init_with_level(log::LevelFilter::Info);
}

/// Initialize the logging system with an explicit fallback level.
///
/// `RUST_LOG` still wins when it is set. Calling this twice is harmless; the
/// second call is ignored.
pub fn init_with_level(level: log::LevelFilter) {
    let mut builder = env_logger::Builder::from_default_env();
    if std::env::var_os("RUST_LOG").is_none() {
        builder.filter_level(level);
    }
    let _ = builder.try_init();
}
