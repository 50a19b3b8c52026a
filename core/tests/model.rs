//! Training, prediction and artifact persistence.

use sente_core::{
    config::{EngineConfig, TrainingConfig},
    error::ScoreError,
    features::FeatureVector,
    model::{ModelArtifact, ModelHandle},
    synthetic::{self, CreditClass},
};
use std::sync::Arc;

fn small_config() -> TrainingConfig {
    EngineConfig::default_test().training
}

fn trained() -> ModelArtifact {
    let cfg = small_config();
    let (x, y) = synthetic::generate(cfg.n_samples, cfg.seed);
    ModelArtifact::train(&x, &y, &cfg).expect("train")
}

fn sample_wallet() -> FeatureVector {
    FeatureVector {
        transaction_count: 150,
        avg_transaction_value: 0.5,
        total_volume: 75.0,
        unique_counterparties: 80,
        wallet_age_days: 400,
        defi_interactions: 15,
        nft_holdings: 8,
    }
}

/// The archetypes barely overlap, so even a small forest separates them.
#[test]
fn training_reports_high_accuracy() {
    let artifact = trained();
    let report = artifact.report;
    assert_eq!(report.n_train + report.n_test, 400);
    assert_eq!(report.n_test, 80, "test split is ceil(0.2 * n)");
    assert!(report.train_accuracy > 0.9, "train accuracy {}", report.train_accuracy);
    assert!(report.test_accuracy > 0.9, "test accuracy {}", report.test_accuracy);
}

#[test]
fn training_is_reproducible() {
    let a = trained();
    let b = trained();
    assert_eq!(a.predict(&sample_wallet()).unwrap(), b.predict(&sample_wallet()).unwrap());
    assert_eq!(a.report, b.report);
}

#[test]
fn probabilities_sum_to_one() {
    let artifact = trained();
    let (x, _) = synthetic::generate(100, 77);
    for fv in x.iter().chain(std::iter::once(&FeatureVector::default())) {
        let p = artifact.predict(fv).unwrap().as_array();
        let sum: f64 = p.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9, "probabilities sum to {sum}");
        assert!(p.iter().all(|v| (0.0..=1.0).contains(v)));
    }
}

#[test]
fn good_wallet_predicts_good() {
    let artifact = trained();
    let (x, y) = synthetic::generate(50, 1234);
    let good = x.iter().zip(&y).find(|(_, l)| **l == CreditClass::Good).unwrap().0;
    assert_eq!(artifact.predict(good).unwrap().predicted_class(), CreditClass::Good);
}

#[test]
fn mismatched_training_input_rejected() {
    let (x, y) = synthetic::generate(10, 1);
    let err = ModelArtifact::train(&x, &y[..5], &small_config()).unwrap_err();
    assert!(matches!(err, ScoreError::InvalidTrainingData(_)));
}

/// save → load reproduces the exact probabilities.
#[test]
fn save_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("models").join("credit.json");
    let artifact = trained();
    artifact.save(&path).unwrap();

    let loaded = ModelArtifact::load(&path).unwrap();
    assert_eq!(loaded, artifact);
    assert_eq!(loaded.predict(&sample_wallet()).unwrap(), artifact.predict(&sample_wallet()).unwrap());

    // No temp files left behind.
    let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "temp files left: {leftovers:?}");
}

#[test]
fn load_missing_artifact_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = ModelArtifact::load(&dir.path().join("nope.json")).unwrap_err();
    assert!(matches!(err, ScoreError::ArtifactNotFound { .. }), "got {err:?}");
    assert!(err.is_model_failure());
}

#[test]
fn load_garbage_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, b"{\"format_version\": 1, \"truncated").unwrap();
    let err = ModelArtifact::load(&path).unwrap_err();
    assert!(matches!(err, ScoreError::ArtifactCorrupt(_)), "got {err:?}");
}

/// An artifact fitted for a different feature layout never loads.
#[test]
fn load_rejects_stale_feature_layout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stale.json");
    trained().save(&path).unwrap();

    let mut doc: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    doc["feature_names"].as_array_mut().unwrap().pop();
    std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

    let err = ModelArtifact::load(&path).unwrap_err();
    assert!(matches!(err, ScoreError::ArtifactCorrupt(_)), "got {err:?}");
}

// ── Handle ───────────────────────────────────────────────────────────────────

#[test]
fn handle_loads_lazily() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credit.json");
    let artifact = trained();
    let expected = artifact.predict(&sample_wallet()).unwrap();
    artifact.save(&path).unwrap();

    let handle = ModelHandle::new(&path);
    assert!(!handle.is_loaded());
    assert_eq!(handle.predict(&sample_wallet()).unwrap(), expected);
    assert!(handle.is_loaded());
    assert!(handle.status().loaded);
}

#[test]
fn handle_without_artifact_fails_every_call() {
    let dir = tempfile::tempdir().unwrap();
    let handle = ModelHandle::new(dir.path().join("missing.json"));
    for _ in 0..2 {
        let err = handle.predict(&sample_wallet()).unwrap_err();
        assert!(matches!(err, ScoreError::ArtifactNotFound { .. }));
    }
    assert!(!handle.is_loaded());
}

#[test]
fn handle_train_persists_and_installs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credit.json");
    let handle = ModelHandle::new(&path);
    let cfg = small_config();
    let (x, y) = synthetic::generate(cfg.n_samples, cfg.seed);

    let report = handle.train(&x, &y, &cfg).unwrap();
    assert!(path.exists());
    assert!(handle.is_loaded());
    assert_eq!(handle.status().report, Some(report));

    // A fresh handle on the same path sees the same model.
    let fresh = ModelHandle::new(&path);
    assert_eq!(fresh.predict(&sample_wallet()).unwrap(), handle.predict(&sample_wallet()).unwrap());
}

#[test]
fn reload_picks_up_new_artifact_and_keeps_old_on_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credit.json");
    trained().save(&path).unwrap();
    let handle = ModelHandle::new(&path);
    let before = handle.predict(&sample_wallet()).unwrap();

    let mut cfg = small_config();
    cfg.seed = 7;
    cfg.n_trees = 3;
    let (x, y) = synthetic::generate(cfg.n_samples, cfg.seed);
    let other = ModelArtifact::train(&x, &y, &cfg).unwrap();
    let other_p = other.predict(&sample_wallet()).unwrap();
    other.save(&path).unwrap();

    // Still the resident copy until reload.
    assert_eq!(handle.predict(&sample_wallet()).unwrap(), before);
    handle.reload().unwrap();
    assert_eq!(handle.predict(&sample_wallet()).unwrap(), other_p);

    std::fs::remove_file(&path).unwrap();
    assert!(handle.reload().is_err());
    assert_eq!(handle.predict(&sample_wallet()).unwrap(), other_p);
}

/// Many threads racing the first load all see a complete model.
#[test]
fn concurrent_first_load_is_safe() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credit.json");
    let artifact = trained();
    let expected = artifact.predict(&sample_wallet()).unwrap();
    artifact.save(&path).unwrap();

    let handle = ModelHandle::shared(&path);
    let threads: Vec<_> = (0..8)
        .map(|_| {
            let h = Arc::clone(&handle);
            std::thread::spawn(move || h.predict(&sample_wallet()).unwrap())
        })
        .collect();
    for t in threads {
        assert_eq!(t.join().unwrap(), expected);
    }
}

/// Readers racing repeated installs only ever see one of the two complete
/// artifacts, whether they load through a fresh handle or reload a shared one.
#[test]
fn installs_never_expose_partial_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credit.json");

    let first = trained();
    let mut cfg = small_config();
    cfg.seed = 99;
    cfg.n_trees = 4;
    let (x, y) = synthetic::generate(cfg.n_samples, cfg.seed);
    let second = ModelArtifact::train(&x, &y, &cfg).unwrap();

    assert_ne!(first, second, "artifacts must be distinguishable");
    let expected = [first.clone(), second.clone()];

    let handle = ModelHandle::shared(&path);
    handle.install(first.clone()).unwrap();

    std::thread::scope(|s| {
        let writer = {
            let handle = Arc::clone(&handle);
            let (first, second) = (&first, &second);
            s.spawn(move || {
                for i in 0..40 {
                    let next = if i % 2 == 0 { second } else { first };
                    handle.install(next.clone()).unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|r| {
                let handle = Arc::clone(&handle);
                let path = path.clone();
                let expected = &expected;
                s.spawn(move || {
                    for _ in 0..40 {
                        let seen = if r % 2 == 0 {
                            ModelHandle::new(&path).artifact()
                        } else {
                            handle.reload().and_then(|_| handle.artifact())
                        };
                        let seen = seen.expect("reader saw a broken artifact");
                        assert!(expected.contains(&*seen), "reader saw an unknown artifact");
                        let p = seen.predict(&sample_wallet()).unwrap();
                        assert!((p.as_array().iter().sum::<f64>() - 1.0).abs() < 1e-9);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
    });

    let leftovers = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .count();
    assert_eq!(leftovers, 0);
}
