//! Subscriber setup for the binary. The library only emits events.

use tracing_subscriber::EnvFilter;

/// Install a stderr subscriber. `RUST_LOG`, when set, wins over `level`.
/// Calling this twice is harmless; the second call is ignored.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("warn,tickloom={level}")))
        .unwrap_or_else(|_| EnvFilter::new("warn,tickloom=info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
