//! Setup tracing subscriber untuk binary

use tracing_subscriber::EnvFilter;

/// Pasang subscriber `fmt` dengan filter dari `RUST_LOG`.
///
/// Tanpa `RUST_LOG`, level default `info` (`debug` jika `verbose`).
/// Aman dipanggil berkali-kali; pemanggilan berikutnya diabaikan.
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .try_init();
}
