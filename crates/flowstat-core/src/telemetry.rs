//! Tracing subscriber bootstrap

use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber.
///
/// A non-empty, valid `RUST_LOG` replaces `default_directive`
/// (e.g. `"flowstat=info"`) entirely. Returns false if a subscriber was
/// already installed.
pub fn init_tracing(default_directive: &str, json: bool) -> bool {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = layered_filter(env.as_deref(), default_directive);

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}

fn layered_filter(env: Option<&str>, default_directive: &str) -> EnvFilter {
    env.filter(|value| !value.trim().is_empty())
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(default_directive))
}

/// Subscriber for tests: output is captured by the test harness
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_replaces_default_directive() {
        use tracing_subscriber::filter::LevelFilter;

        let hint = |env| layered_filter(env, "flowstat=debug").max_level_hint();
        assert_eq!(hint(Some("warn")), Some(LevelFilter::WARN));
        assert_eq!(hint(None), Some(LevelFilter::DEBUG));
        assert_eq!(hint(Some("  ")), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn test_second_init_is_refused() {
        init_test_tracing();
        assert!(!init_tracing("flowstat_core=debug", false));
    }
}
