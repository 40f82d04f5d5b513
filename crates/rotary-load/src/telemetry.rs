//! Console logging for `rotary-load`.
//!
//! Events from the pool (worker lifecycle, recovered panics, abandoned work)
//! and from the load driver go through one `tracing_subscriber::fmt` layer.
//! The filter is read from `RUST_LOG` and defaults to `info`:
//!
//! ```bash
//! RUST_LOG=rotary=trace,rotary_load=debug cargo run -p rotary-load
//! ```

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_telemetry() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_names(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .with_writer(std::io::stderr),
        )
        .try_init()?;
    Ok(())
}
