use customer_api::{
    AppConfig,
    config::{ConfigError, Env, JwtSettings, LOCAL_JWT_SECRET},
};
use serial_test::serial;
use std::{env, panic};

const VARS: &[&str] = &[
    "APP_ENV",
    "DATABASE_URL",
    "DATABASE_MAX_CONNECTIONS",
    "BIND_ADDR",
    "JWT_SECRET",
    "JWT_ISSUER",
    "JWT_AUDIENCE",
    "PROTECT_UPDATES",
];

// --- Setup/Teardown Utilities ---

/// Runs `test` with exactly `vars` set (every other config variable cleared)
/// and restores the previous environment afterwards, even on panic.
fn run_with_env<T, R>(vars: &[(&str, &str)], test: T) -> R
where
    T: FnOnce() -> R + panic::UnwindSafe,
{
    let originals: Vec<(&str, Option<String>)> =
        VARS.iter().map(|&var| (var, env::var(var).ok())).collect();

    unsafe {
        for var in VARS {
            env::remove_var(var);
        }
        for (key, value) in vars {
            env::set_var(key, value);
        }
    }

    let result = panic::catch_unwind(test);

    unsafe {
        for (key, original) in originals {
            match original {
                Some(value) => env::set_var(key, value),
                None => env::remove_var(key),
            }
        }
    }

    match result {
        Ok(value) => value,
        Err(e) => panic::resume_unwind(e),
    }
}

// --- Tests ---

#[test]
#[serial]
fn local_env_falls_back_to_defaults() {
    let config = run_with_env(&[("DATABASE_URL", "postgres://u:p@host/db")], AppConfig::load)
        .expect("local config should load");

    assert_eq!(config.env, Env::Local);
    assert_eq!(config.db_url, "postgres://u:p@host/db");
    assert_eq!(config.db_max_connections, 5);
    assert_eq!(config.bind_addr.to_string(), "0.0.0.0:3000");
    assert_eq!(config.jwt.secret, LOCAL_JWT_SECRET);
    assert_eq!(config.jwt.issuer, None);
    assert!(!config.protect_updates);
}

#[test]
#[serial]
fn production_requires_a_jwt_secret() {
    let result = run_with_env(
        &[
            ("APP_ENV", "production"),
            ("DATABASE_URL", "postgres://u:p@host/db"),
        ],
        AppConfig::load,
    );

    assert_eq!(result.err(), Some(ConfigError::Missing("JWT_SECRET")));
}

#[test]
#[serial]
fn database_url_is_always_required() {
    let result = run_with_env(&[("JWT_SECRET", "s3cret")], AppConfig::load);
    assert_eq!(result.err(), Some(ConfigError::Missing("DATABASE_URL")));
}

#[test]
#[serial]
fn explicit_values_override_defaults() {
    let config = run_with_env(
        &[
            ("APP_ENV", "production"),
            ("DATABASE_URL", "postgres://u:p@db/customers"),
            ("DATABASE_MAX_CONNECTIONS", "12"),
            ("BIND_ADDR", "127.0.0.1:8080"),
            ("JWT_SECRET", "prod-secret"),
            ("JWT_ISSUER", "https://issuer.test"),
            ("JWT_AUDIENCE", "customers"),
            ("PROTECT_UPDATES", "true"),
        ],
        AppConfig::load,
    )
    .expect("full production config should load");

    assert_eq!(config.env, Env::Production);
    assert_eq!(config.db_max_connections, 12);
    assert_eq!(config.bind_addr.port(), 8080);
    assert_eq!(config.jwt.secret, "prod-secret");
    assert_eq!(config.jwt.issuer.as_deref(), Some("https://issuer.test"));
    assert_eq!(config.jwt.audience.as_deref(), Some("customers"));
    assert!(config.protect_updates);
}

#[test]
#[serial]
fn malformed_values_are_reported_by_name() {
    let result = run_with_env(
        &[
            ("DATABASE_URL", "postgres://u:p@host/db"),
            ("DATABASE_MAX_CONNECTIONS", "lots"),
        ],
        AppConfig::load,
    );
    assert!(matches!(
        result,
        Err(ConfigError::Invalid { var: "DATABASE_MAX_CONNECTIONS", .. })
    ));

    let result = run_with_env(
        &[
            ("DATABASE_URL", "postgres://u:p@host/db"),
            ("PROTECT_UPDATES", "sometimes"),
        ],
        AppConfig::load,
    );
    assert!(matches!(
        result,
        Err(ConfigError::Invalid { var: "PROTECT_UPDATES", .. })
    ));
}

#[test]
#[serial]
fn blank_secret_counts_as_missing() {
    let local = run_with_env(&[("JWT_SECRET", "   ")], || JwtSettings::from_env(Env::Local))
        .expect("local falls back");
    assert_eq!(local.secret, LOCAL_JWT_SECRET);

    let production = run_with_env(&[("JWT_SECRET", "")], || {
        JwtSettings::from_env(Env::Production)
    });
    assert!(production.is_err());
}
