use cohortbeam::config::{EngineConfig, SortMode};
use cohortbeam::error::EngineError;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_partial_json_keeps_defaults() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("engine.json");
    fs::write(&path, r#"{"memory_budget_mb": 64, "sort_mode": "unsorted"}"#)?;

    let config = EngineConfig::from_json_file(&path)?;
    assert_eq!(config.memory_budget_mb, 64.0);
    assert_eq!(config.sort_mode, SortMode::Unsorted);
    assert_eq!(config.size_check_interval, 1000);
    assert_eq!(config.string_delimiter, "|~|");
    assert_eq!(config.memory_budget_bytes(), 64 * 1024 * 1024);
    Ok(())
}

#[test]
fn test_invalid_values_are_rejected_on_load() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("engine.json");
    fs::write(&path, r#"{"size_check_interval": 0}"#)?;

    let err = EngineConfig::from_json_file(&path)
        .err()
        .ok_or_else(|| anyhow::anyhow!("zero interval accepted"))?;
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::InvalidConfig(_))
    ));
    Ok(())
}

#[test]
fn test_malformed_json_names_the_file() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ not json")?;

    let err = EngineConfig::from_json_file(&path)
        .err()
        .ok_or_else(|| anyhow::anyhow!("broken json accepted"))?;
    assert!(format!("{err:#}").contains("broken.json"));
    Ok(())
}

#[test]
fn test_round_trips_through_json() -> anyhow::Result<()> {
    let config = EngineConfig {
        max_output_file_mb: 0.5,
        default_subset: "cohort".into(),
        ..EngineConfig::default()
    };
    let json = serde_json::to_string(&config)?;
    let back: EngineConfig = serde_json::from_str(&json)?;
    assert_eq!(back, config);
    Ok(())
}
