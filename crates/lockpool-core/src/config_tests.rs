//! Config module tests

use crate::config::{Config, MAX_EVENT_CAPACITY, MAX_LOCK_COUNT, PhilosophersConfig, PoolConfig};
use crate::locking::LockPool;

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.pool.lock_count, 5);
    assert_eq!(config.pool.event_capacity, 256);
    assert_eq!(config.philosophers.seats, 6);
    assert_eq!(config.philosophers.rounds, 3);
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_toml_keeps_defaults() {
    let config = Config::from_toml(
        r#"
        [pool]
        lock_count = 8
        "#,
    )
    .expect("Should parse");

    assert_eq!(config.pool.lock_count, 8);
    assert_eq!(config.pool.event_capacity, 256);
    assert_eq!(config.philosophers, PhilosophersConfig::default());
}

#[test]
fn test_zero_locks_rejected() {
    let err = Config::from_toml("[pool]\nlock_count = 0\n").unwrap_err();
    assert!(err.to_string().contains("lock_count"));

    let pool = PoolConfig {
        lock_count: 0,
        event_capacity: 16,
    };
    assert!(pool.validate().is_err());
}

#[test]
fn test_oversized_pool_rejected() {
    let too_big = [
        ("pool.event_capacity", usize::MAX),
        ("pool.event_capacity", MAX_EVENT_CAPACITY + 1),
        ("pool.lock_count", MAX_LOCK_COUNT + 1),
        ("philosophers.seats", usize::MAX),
    ];
    for (key, value) in too_big {
        let mut config = Config::default();
        let err = config.set(key, &value.to_string()).unwrap_err();
        assert!(err.to_string().contains("must be between"), "{key} = {value}");
    }

    let mut config = Config::default();
    config.set("pool.event_capacity", &MAX_EVENT_CAPACITY.to_string()).expect("Should set");
    config.set("pool.lock_count", &MAX_LOCK_COUNT.to_string()).expect("Should set");
}

#[test]
fn test_from_config_refuses_oversized_pool() {
    let huge_channel = PoolConfig {
        lock_count: 4,
        event_capacity: usize::MAX,
    };
    let err = LockPool::from_config(&huge_channel).unwrap_err();
    assert_eq!(err.code(), "E600");
    assert!(err.to_string().contains("event_capacity"));

    let huge_pool = PoolConfig {
        lock_count: usize::MAX,
        event_capacity: 16,
    };
    let err = LockPool::from_config(&huge_pool).unwrap_err();
    assert_eq!(err.code(), "E600");
    assert!(err.to_string().contains("lock_count"));
}

#[test]
fn test_toml_round_trip() {
    let mut config = Config::default();
    config.pool.lock_count = 12;
    config.philosophers.rounds = 10;

    let text = toml::to_string_pretty(&config).expect("Should serialize");
    let parsed = Config::from_toml(&text).expect("Should parse");
    assert_eq!(parsed, config);
}

#[test]
fn test_get_and_set() {
    let mut config = Config::default();

    config.set("pool.lock_count", "9").expect("Should set");
    assert_eq!(config.get("pool.lock_count").unwrap(), "9");

    config.set("philosophers.max_eat_ms", "50").expect("Should set");
    assert_eq!(config.philosophers.max_eat_ms, 50);
}

#[test]
fn test_set_rejects_bad_values() {
    let mut config = Config::default();

    assert!(config.set("pool.lock_count", "many").is_err());
    assert!(config.set("philosophers.seats", "1").is_err());
    assert!(config.set("pool.unknown", "1").is_err());
    assert!(config.get("nope").is_err());
}

#[test]
fn test_list_covers_all_keys() {
    let config = Config::default();
    let entries = config.list().expect("Should list");

    assert_eq!(entries.len(), 6);
    assert!(entries.iter().any(|(k, v)| k == "pool.lock_count" && v == "5"));
}
