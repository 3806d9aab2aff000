#![deny(missing_docs)]
//! Utilities for testing pinhold crates.

pub mod id;
pub mod server;

/// Enable tracing with the RUST_LOG environment variable.
///
/// This is intended to be used in tests, so it defaults to DEBUG level.
pub fn enable_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::Level::DEBUG.into())
                .from_env_lossy(),
        )
        .try_init();
}

/// Poll a block of assertions until it `break`s or a timeout panics.
///
/// The block is re-run every 10 ms. Use this to wait on state that
/// background workers converge on:
///
/// ```ignore
/// iter_check!({
///     if pinner.in_flight_count() == 0 {
///         break;
///     }
/// });
/// ```
///
/// An explicit timeout in milliseconds can be given as a first argument;
/// the default is 5000.
#[macro_export]
macro_rules! iter_check {
    ($timeout_ms:expr, $body:block) => {{
        let deadline = std::time::Instant::now()
            + std::time::Duration::from_millis($timeout_ms);
        loop {
            $body

            if std::time::Instant::now() > deadline {
                panic!("iter_check timed out after {} ms", $timeout_ms);
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
    }};
    ($body:block) => {
        $crate::iter_check!(5000, $body)
    };
}
