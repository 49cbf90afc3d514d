//! Tests for PostgreSQL pool sizing.
//!
//! These mutate process environment variables, which is unsafe in Rust 2024,
//! so every test is `#[serial]`.

use serial_test::serial;
use server::db::get_max_connections;

const VAR: &str = "TASKDESK_PG_MAX_CONNECTIONS";

/// # Safety
/// Callers run under `#[serial]`, so no other test touches the environment.
unsafe fn set_env(key: &str, value: &str) {
    // SAFETY: The caller guarantees single-threaded access to the environment.
    unsafe { std::env::set_var(key, value) };
}

/// # Safety
/// Callers run under `#[serial]`, so no other test touches the environment.
unsafe fn remove_env(key: &str) {
    // SAFETY: The caller guarantees single-threaded access to the environment.
    unsafe { std::env::remove_var(key) };
}

/// Runs `check` with the variable set to `value` (or unset) and restores it afterwards.
fn with_max_connections(value: Option<&str>, check: impl FnOnce()) {
    let original = std::env::var(VAR).ok();

    // SAFETY: serialized test.
    unsafe {
        match value {
            Some(value) => set_env(VAR, value),
            None => remove_env(VAR),
        }
    }

    check();

    // SAFETY: serialized test.
    unsafe {
        match original {
            Some(value) => set_env(VAR, &value),
            None => remove_env(VAR),
        }
    }
}

#[test]
#[serial]
fn test_pool_respects_env_var() {
    with_max_connections(Some("25"), || {
        assert_eq!(get_max_connections(), 25);
    });
}

#[test]
#[serial]
fn test_pool_default_when_no_env() {
    with_max_connections(None, || {
        assert_eq!(get_max_connections(), 20);
    });
}

#[test]
#[serial]
fn test_pool_invalid_values_use_default() {
    for value in ["not_a_number", "-5", "0", ""] {
        with_max_connections(Some(value), || {
            assert_eq!(get_max_connections(), 20, "value {value:?} should fall back");
        });
    }
}
