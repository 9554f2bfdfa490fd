/*!
Logging and profiling setup for the command line.

Log lines go to stderr so that stdout only carries the JSON reports. The filter comes
from `RUST_LOG`; when it is unset a default is applied (`debug` in debug builds, `info`
in release builds).

With the `profiling` feature a `tracing-chrome` layer records every span into a
`trace-*.json` file in the working directory, viewable in Perfetto or
`chrome://tracing`. The file is flushed when the returned [`LoggingGuard`] is dropped.
*/

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Keeps the profiling trace open; hold it until the program exits
pub struct LoggingGuard {
    #[cfg(feature = "profiling")]
    _chrome: tracing_chrome::FlushGuard,
}

/// Initialize logging and, when compiled in, chrome profiling
pub fn setup_logging_and_profiling() -> LoggingGuard {
    if std::env::var("RUST_LOG").is_err() {
        // Safety: single-threaded at startup
        unsafe {
            if cfg!(debug_assertions) {
                std::env::set_var("RUST_LOG", "debug");
            } else {
                std::env::set_var("RUST_LOG", "info");
            }
        }
    }

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_default_env());

    #[cfg(feature = "profiling")]
    {
        let (chrome_layer, guard) = tracing_chrome::ChromeLayerBuilder::new().build();
        tracing_subscriber::registry()
            .with(chrome_layer)
            .with(fmt_layer)
            .init();
        tracing::info!("Tracing initialized with chrome profiling layer");
        LoggingGuard { _chrome: guard }
    }

    #[cfg(not(feature = "profiling"))]
    {
        tracing_subscriber::registry().with(fmt_layer).init();
        tracing::debug!("Logging initialized (profiling disabled in this build)");
        LoggingGuard {}
    }
}
