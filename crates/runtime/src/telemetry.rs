//! Tracing bootstrap. Called once by whatever embeds the runtime; safe to
//! call again (subsequent installs are ignored).

use tracing_subscriber::EnvFilter;

/// Install the global subscriber, honoring `RUST_LOG` and falling back to
/// the supplied level.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init("info");
        init("debug");
    }
}
