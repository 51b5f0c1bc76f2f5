//! Tracing subscriber setup for the CLI

use tracing_subscriber::EnvFilter;

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "txq_harness=debug"
    } else {
        "txq_harness=info"
    }
}

/// Install the global subscriber. A `RUST_LOG` filter takes precedence
/// over the verbosity picked on the command line.
pub fn init_logger(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_selects_the_directive() {
        assert_eq!(default_directive(false), "txq_harness=info");
        assert_eq!(default_directive(true), "txq_harness=debug");
    }
}
