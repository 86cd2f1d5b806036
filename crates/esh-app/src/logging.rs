//! Tracing setup for binaries and long-running services.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the filter directives, e.g.
/// `ESH_LOG=esh_transform=debug,info`.
pub const LOG_ENV: &str = "ESH_LOG";

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install a stderr fmt subscriber filtered by `ESH_LOG` (default `info`).
///
/// Returns `false` when a global subscriber was already installed.
pub fn init() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    #[test]
    fn second_init_is_refused() {
        super::init();
        assert!(!super::init());
    }
}
