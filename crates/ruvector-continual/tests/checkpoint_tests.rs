//! Checkpoint persistence tests

use ruvector_continual::{
    Checkpoint, ContinualConfig, ContinualEngine, ContinualError, Task, TaskGenerator,
    FORMAT_VERSION,
};
use std::fs;
use tempfile::tempdir;

fn create_test_config() -> ContinualConfig {
    ContinualConfig::builder()
        .embedding_dim(24)
        .rank(3)
        .min_trajectories_for_extraction(4)
        .seed(99)
        .build()
        .unwrap()
}

fn trained_engine(epochs: usize) -> ContinualEngine {
    let mut engine = ContinualEngine::new(create_test_config()).unwrap();
    let mut generator = TaskGenerator::standard(24, 12);
    for _ in 0..epochs {
        let batch = generator.generate(25, engine.curriculum_level());
        engine.run_epoch(&batch);
    }
    engine
}

#[test]
fn test_save_load_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("engine.json");

    let engine = trained_engine(4);
    let saved = engine.checkpoint().unwrap();
    saved.save(&path).unwrap();

    let loaded = Checkpoint::load(&path).unwrap();
    assert_eq!(loaded.format_version, FORMAT_VERSION);
    assert_eq!(loaded.integrity_hash().unwrap(), saved.integrity_hash);
    assert_eq!(loaded.integrity_hash, saved.integrity_hash);
    assert_eq!(loaded.metrics, saved.metrics);
    assert_eq!(loaded.buffer, saved.buffer);

    // no temporary file left behind
    let names: Vec<_> = fs::read_dir(path.parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(names.len(), 1);
}

#[test]
fn test_restore_reproduces_state() {
    let engine = trained_engine(5);
    let checkpoint = engine.checkpoint().unwrap();

    let restored = ContinualEngine::restore(create_test_config(), &checkpoint).unwrap();
    assert_eq!(restored.epoch(), 5);
    assert_eq!(restored.temperature(), engine.temperature());
    assert_eq!(restored.curriculum_level(), engine.curriculum_level());
    assert_eq!(restored.metrics_history(), engine.metrics_history());
    assert_eq!(restored.adapter().snapshot(), engine.adapter().snapshot());
    assert_eq!(restored.guard().snapshot(), engine.guard().snapshot());
    assert_eq!(restored.patterns().centroids(), engine.patterns().centroids());
    assert!(restored.buffer().is_empty());
    assert_eq!(restored.buffer().stats().total, engine.buffer().stats().total);

    let x = vec![0.3f32; 24];
    assert_eq!(restored.adapter().forward(&x), engine.adapter().forward(&x));

    // the recaptured state hashes identically
    let recaptured = restored.checkpoint().unwrap();
    assert_eq!(recaptured.integrity_hash, checkpoint.integrity_hash);
}

#[test]
fn test_restored_engine_keeps_training() {
    let engine = trained_engine(2);
    let checkpoint = engine.checkpoint().unwrap();
    let mut restored = ContinualEngine::restore(create_test_config(), &checkpoint).unwrap();

    let mut generator = TaskGenerator::standard(24, 13);
    let report = restored.run_epoch(&generator.generate(10, restored.curriculum_level()));
    assert_eq!(report.metrics.epoch, 3);
    assert_eq!(restored.metrics_history().len(), 3);
    assert!(report.metrics.temperature <= checkpoint.metrics[1].temperature);
}

#[test]
fn test_tampered_file_fails_verification() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("engine.json");
    trained_engine(3).checkpoint().unwrap().save(&path).unwrap();

    let mut value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    value["consolidation"]["lambda"] = serde_json::json!(1.5);
    fs::write(&path, serde_json::to_string(&value).unwrap()).unwrap();

    let err = Checkpoint::load(&path).unwrap_err();
    assert!(matches!(err, ContinualError::Integrity { .. }));
    assert!(err.is_recoverable());
}

#[test]
fn test_edited_metrics_still_verify() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("engine.json");
    trained_engine(2).checkpoint().unwrap().save(&path).unwrap();

    let mut value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    value["metrics"] = serde_json::json!([]);
    fs::write(&path, serde_json::to_string(&value).unwrap()).unwrap();

    assert!(Checkpoint::load(&path).is_ok());
}

#[test]
fn test_load_or_cold_start() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing.json");
    let cold = ContinualEngine::load_or_cold_start(create_test_config(), &missing).unwrap();
    assert_eq!(cold.epoch(), 0);

    let garbage = dir.path().join("garbage.json");
    fs::write(&garbage, "{ not json").unwrap();
    let cold = ContinualEngine::load_or_cold_start(create_test_config(), &garbage).unwrap();
    assert_eq!(cold.epoch(), 0);

    let good = dir.path().join("good.json");
    trained_engine(3).checkpoint().unwrap().save(&good).unwrap();
    let warm = ContinualEngine::load_or_cold_start(create_test_config(), &good).unwrap();
    assert_eq!(warm.epoch(), 3);
}

#[test]
fn test_restore_rejects_dimension_change() {
    let checkpoint = trained_engine(1).checkpoint().unwrap();
    let other = ContinualConfig::builder()
        .embedding_dim(48)
        .rank(3)
        .build()
        .unwrap();
    assert!(matches!(
        ContinualEngine::restore(other, &checkpoint),
        Err(ContinualError::DimensionMismatch { .. })
    ));
}

#[test]
fn test_unsupported_version_on_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("future.json");
    let mut checkpoint = trained_engine(1).checkpoint().unwrap();
    checkpoint.format_version = FORMAT_VERSION + 1;
    fs::write(&path, checkpoint.to_json().unwrap()).unwrap();

    assert!(matches!(
        Checkpoint::load(&path),
        Err(ContinualError::UnsupportedFormat { .. })
    ));
}

#[test]
fn test_non_finite_task_leaves_state_serializable() {
    let mut engine = ContinualEngine::new(create_test_config()).unwrap();
    let mut generator = TaskGenerator::standard(24, 21);

    let mut batch = generator.generate(19, engine.curriculum_level());
    batch.insert(7, Task::new("nan-features", "review", vec![f32::NAN; 24], 0.5));
    let mut bad_difficulty = Task::new("nan-difficulty", "review", vec![0.2; 24], 0.5);
    bad_difficulty.difficulty = f32::NAN;
    batch.push(bad_difficulty);

    let mut reports = vec![engine.run_epoch(&batch)];
    for _ in 0..2 {
        let clean = generator.generate(20, engine.curriculum_level());
        reports.push(engine.run_epoch(&clean));
    }

    for report in &reports {
        assert!(report
            .results
            .iter()
            .all(|r| (0.0..=1.0).contains(&r.confidence)));
    }
    assert!(engine
        .buffer()
        .entries()
        .iter()
        .all(|t| t.final_quality.is_finite()));

    let x = vec![0.3f32; 24];
    assert!(engine.adapter().forward(&x).iter().all(|v| v.is_finite()));

    let checkpoint = engine.checkpoint().unwrap();
    let reloaded = Checkpoint::from_json(&checkpoint.to_json().unwrap()).unwrap();
    assert_eq!(reloaded.integrity_hash, checkpoint.integrity_hash);
    assert!(ContinualEngine::restore(create_test_config(), &reloaded).is_ok());
}

#[test]
fn test_restore_uses_config_lambda() {
    let engine = trained_engine(2);
    let checkpoint = engine.checkpoint().unwrap();
    let config = ContinualConfig::builder()
        .embedding_dim(24)
        .rank(3)
        .lambda(250.0)
        .min_trajectories_for_extraction(4)
        .seed(99)
        .build()
        .unwrap();
    assert_ne!(engine.guard().lambda(), 250.0);

    let restored = ContinualEngine::restore(config, &checkpoint).unwrap();
    assert_eq!(restored.guard().lambda(), 250.0);
    assert_eq!(restored.adapter().snapshot(), engine.adapter().snapshot());
    assert_eq!(restored.epoch(), engine.epoch());
}
