//! Log output for the binaries.
//!
//! The library itself only emits `log` records. [`init`] routes them into a
//! `tracing` fmt subscriber filtered by `RUST_LOG`; without that variable
//! nothing is printed.

use tracing_subscriber::filter::EnvFilter;

/// Installs the `log` bridge and, when `RUST_LOG` is set, a global fmt
/// subscriber. Calling it again is harmless.
pub fn init() {
    // The bridge goes first so records emitted during setup are not lost.
    let _ = tracing_log::LogTracer::init();

    let Ok(filter) = EnvFilter::try_from_default_env() else {
        return;
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_target(true)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        log::debug!("A global subscriber is already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_is_harmless() {
        init();
        init();
        log::info!("still logging");
    }
}
