// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use camera_session::constants::timing;
use camera_session::{Config, Geometry};
use std::path::PathBuf;
use std::time::Duration;

fn scratch_path(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("camera-session-test-{}", uuid::Uuid::new_v4()))
        .join(name)
}

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.backend, "simulated");
    assert!(config.auto_play, "Auto play should be enabled by default");
    assert_eq!(config.initial_geometry, None);
    assert_eq!(
        config.error_stop_timeout(),
        Duration::from_millis(timing::ERROR_STOP_TIMEOUT_MS)
    );
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_missing_file_yields_defaults() {
    let config = Config::load(&scratch_path("absent.json")).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_config_save_and_load() {
    let path = scratch_path("config.json");
    let config = Config {
        backend: "gstreamer".to_string(),
        initial_geometry: Some(Geometry {
            width: 1280,
            height: 720,
        }),
        auto_play: false,
        ..Default::default()
    };

    config.save(&path).unwrap();
    assert_eq!(Config::load(&path).unwrap(), config);

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn test_config_partial_file_uses_defaults_for_the_rest() {
    let path = scratch_path("partial.json");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, r#"{ "error_stop_timeout_ms": 50 }"#).unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.error_stop_timeout_ms, 50);
    assert_eq!(config.backend, "simulated");

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn test_config_rejects_invalid_values() {
    let zero_geometry = Config {
        initial_geometry: Some(Geometry {
            width: 0,
            height: 480,
        }),
        ..Default::default()
    };
    assert!(zero_geometry.validate().is_err());

    let no_backend = Config {
        backend: String::new(),
        ..Default::default()
    };
    assert!(no_backend.validate().is_err());

    let path = scratch_path("broken.json");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "{ not json").unwrap();
    assert!(Config::load(&path).is_err());

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}
