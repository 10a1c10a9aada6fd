//! Log routing for the `armportal` CLI.
//!
//! Every command prints its response as JSON on stdout, so logs always go
//! to stderr and never interleave with a response a caller is piping into
//! `jq`. `--json` switches stderr to one JSON object per line for log
//! shippers. `RUST_LOG` replaces the level picked from `--verbose`. The HTTP
//! client stack stays at `warn` unless `RUST_LOG` asks for more.
//!
//! The global subscriber can be set once per process; [`init_tracing`]
//! ignores later calls.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(level: Level) -> String {
    format!("{},hyper=warn,reqwest=warn", level.as_str().to_ascii_lowercase())
}

/// Install the stderr subscriber.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    if json {
        registry.with(layer.json()).try_init().ok();
    } else {
        registry.with(layer).try_init().ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_stack_is_quieter_than_the_portal() {
        assert_eq!(default_directives(Level::DEBUG), "debug,hyper=warn,reqwest=warn");
        assert!(default_directives(Level::ERROR).starts_with("error,"));
    }

    #[test]
    fn init_twice_is_harmless() {
        init_tracing(false, Level::WARN);
        init_tracing(true, Level::DEBUG);
    }
}
