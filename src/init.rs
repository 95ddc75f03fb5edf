//! Initialization helpers for the application startup.

use crate::config::Config;

/// Sets up the tracing subscriber with the configured filters.
pub fn setup_logging(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(build_filter(config)));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

/// Configured level, with transport crates silenced unless named explicitly.
fn build_filter(config: &Config) -> String {
    let mut filter = config.logging.level.clone();
    for noisy in ["tungstenite", "tokio_tungstenite", "hyper", "reqwest"] {
        if !filter.contains(noisy) {
            filter.push_str(&format!(",{noisy}=warn"));
        }
    }
    filter
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_silences_transport_crates() {
        let config = Config::default();
        let filter = build_filter(&config);
        assert!(filter.starts_with("info,"));
        assert!(filter.contains("hyper=warn"));
        assert!(filter.contains("tungstenite=warn"));
    }

    #[test]
    fn test_filter_keeps_explicit_overrides() {
        let mut config = Config::default();
        config.logging.level = "debug,reqwest=trace".to_string();
        let filter = build_filter(&config);
        assert!(filter.contains("reqwest=trace"));
        assert!(!filter.contains("reqwest=warn"));
    }
}
