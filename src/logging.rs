/// Tracing setup for binaries and tests
///
/// The library itself only emits `tracing` events. Hosts that want them
/// printed call [`init`] (or [`init_with_filter`]) once at startup; repeated
/// calls are ignored so tests can call it freely.

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

static INIT: OnceCell<()> = OnceCell::new();

/// Default directive when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "godo_pathing=info";

/// Install a fmt subscriber honouring `RUST_LOG`, falling back to [`DEFAULT_FILTER`]
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    install(filter);
}

/// Install a fmt subscriber with an explicit filter directive (e.g. `"debug"`)
pub fn init_with_filter(directive: &str) {
    install(EnvFilter::new(directive));
}

fn install(filter: EnvFilter) {
    INIT.get_or_init(|| {
        // Another subscriber may already be set by the host; that's fine.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_thread_names(true)
            .try_init();
    });
}
