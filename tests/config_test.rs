//! Configuration loading. Env mutation makes these inherently racy with
//! each other, so everything runs in one test.

use std::time::Duration;

use maintq::config::Config;
use secrecy::ExposeSecret;

#[test]
fn config_from_env() {
    // SAFETY: single-threaded test binary section; no other thread reads
    // the environment concurrently.
    unsafe {
        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("OTEL_ENDPOINT");
        std::env::remove_var("LOG_LEVEL");
        std::env::remove_var("ANALYTICS_REFRESH_SECS");
    }

    // DATABASE_URL is the only required variable.
    assert!(Config::from_env().is_err());

    unsafe {
        std::env::set_var("DATABASE_URL", "postgres://localhost/maintq");
    }
    let config = Config::from_env().unwrap();
    assert_eq!(
        config.database_url.expose_secret(),
        "postgres://localhost/maintq"
    );
    assert_eq!(config.otel_endpoint, None);
    assert_eq!(config.log_level, "info");
    assert_eq!(config.analytics_refresh, Duration::from_secs(60));

    unsafe {
        std::env::set_var("OTEL_ENDPOINT", "http://localhost:4317");
        std::env::set_var("LOG_LEVEL", "debug");
        std::env::set_var("ANALYTICS_REFRESH_SECS", "15");
    }
    let config = Config::from_env().unwrap();
    assert_eq!(
        config.otel_endpoint.as_deref(),
        Some("http://localhost:4317")
    );
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.analytics_refresh, Duration::from_secs(15));

    unsafe {
        std::env::set_var("ANALYTICS_REFRESH_SECS", "often");
    }
    assert!(Config::from_env().is_err());

    unsafe {
        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("OTEL_ENDPOINT");
        std::env::remove_var("LOG_LEVEL");
        std::env::remove_var("ANALYTICS_REFRESH_SECS");
    }
}
