//! The trained scoring model: standardiser + random forest as one artifact.
//!
//! RULES:
//!   - The forest is never usable without the scaler fitted alongside it.
//!     Both live in ModelArtifact and are saved and loaded together.
//!   - Saves write a temp file and rename it, so readers observe either
//!     the old artifact or the new one, never a partial file.
//!   - ModelHandle is the only owner of the in-memory artifact. It is
//!     passed to the engine explicitly; there is no global model.

pub mod forest;
pub mod scaler;

use crate::{
    config::TrainingConfig,
    error::{ScoreError, ScoreResult},
    features::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES},
    rng::{RngBank, RngSlot},
    synthetic::{CreditClass, CLASS_COUNT},
};
use chrono::{DateTime, Utc};
use forest::RandomForest;
use parking_lot::{Mutex, RwLock};
use scaler::StandardScaler;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Posterior over the model classes, indexed by `CreditClass`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities(pub [f64; CLASS_COUNT]);

impl ClassProbabilities {
    pub fn get(&self, class: CreditClass) -> f64 {
        self.0[class.index()]
    }

    pub fn as_array(&self) -> [f64; CLASS_COUNT] {
        self.0
    }

    /// Most likely class. Ties go to the lower class.
    pub fn predicted_class(&self) -> CreditClass {
        let mut best = CreditClass::Bad;
        for class in CreditClass::ALL {
            if self.get(class) > self.get(best) {
                best = class;
            }
        }
        best
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub train_accuracy: f64,
    pub test_accuracy: f64,
    pub n_train: usize,
    pub n_test: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub feature_names: Vec<String>,
    pub trained_at: DateTime<Utc>,
    pub report: TrainingReport,
    scaler: StandardScaler,
    forest: RandomForest,
}

impl ModelArtifact {
    /// Split, standardise, fit the forest and score both halves.
    /// Does not touch disk; see `ModelHandle::train` for that.
    pub fn train(
        features: &[FeatureVector],
        labels: &[CreditClass],
        config: &TrainingConfig,
    ) -> ScoreResult<Self> {
        if features.len() != labels.len() {
            return Err(ScoreError::InvalidTrainingData(format!(
                "{} feature rows vs {} labels",
                features.len(),
                labels.len()
            )));
        }
        if !(config.test_fraction > 0.0 && config.test_fraction < 1.0) {
            return Err(ScoreError::InvalidTrainingData(format!(
                "test_fraction must be in (0, 1), got {}",
                config.test_fraction
            )));
        }
        for fv in features {
            fv.validate()?;
        }

        let n = features.len();
        let n_test = (config.test_fraction * n as f64).ceil() as usize;
        if n_test == 0 || n_test >= n {
            return Err(ScoreError::InvalidTrainingData(format!(
                "{n} samples cannot be split with test_fraction {}",
                config.test_fraction
            )));
        }

        let mut order: Vec<usize> = (0..n).collect();
        RngBank::new(config.seed)
            .for_slot(RngSlot::TrainTestSplit)
            .shuffle(&mut order);
        let (test_idx, train_idx) = order.split_at(n_test);

        let raw = |idx: &[usize]| -> Vec<[f64; FEATURE_COUNT]> {
            idx.iter().map(|&i| features[i].to_array()).collect()
        };
        let y = |idx: &[usize]| -> Vec<usize> { idx.iter().map(|&i| labels[i].index()).collect() };

        let x_train_raw = raw(train_idx);
        let x_test_raw = raw(test_idx);
        let y_train = y(train_idx);
        let y_test = y(test_idx);

        let scaler = StandardScaler::fit(&x_train_raw)?;
        let x_train = standardise_all(&scaler, &x_train_raw)?;
        let x_test = standardise_all(&scaler, &x_test_raw)?;

        let forest = RandomForest::fit(&x_train, &y_train, config.forest_params(), config.seed)?;

        let report = TrainingReport {
            train_accuracy: accuracy(&forest, &x_train, &y_train)?,
            test_accuracy: accuracy(&forest, &x_test, &y_test)?,
            n_train: train_idx.len(),
            n_test,
        };
        log::info!(
            "trained forest: {} trees, train accuracy {:.2}, test accuracy {:.2}",
            forest.n_trees(),
            report.train_accuracy,
            report.test_accuracy
        );

        Ok(Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            trained_at: Utc::now(),
            report,
            scaler,
            forest,
        })
    }

    pub fn predict(&self, features: &FeatureVector) -> ScoreResult<ClassProbabilities> {
        let scaled = self.scaler.transform(&features.to_array())?;
        let probabilities = self.forest.predict_proba(&scaled)?;
        Ok(ClassProbabilities(probabilities))
    }

    pub fn n_trees(&self) -> usize {
        self.forest.n_trees()
    }

    /// Reject artifacts that were trained for a different feature layout.
    pub fn validate(&self) -> ScoreResult<()> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(ScoreError::ArtifactCorrupt(format!(
                "unsupported format version {}",
                self.format_version
            )));
        }
        if self.feature_names.iter().map(String::as_str).ne(FEATURE_NAMES.iter().copied()) {
            return Err(ScoreError::ArtifactCorrupt(format!(
                "feature layout {:?} does not match {:?}",
                self.feature_names, FEATURE_NAMES
            )));
        }
        if self.scaler.n_features() != FEATURE_COUNT || self.forest.n_features() != FEATURE_COUNT {
            return Err(ScoreError::ArtifactCorrupt(format!(
                "artifact fitted on {} / {} features, expected {FEATURE_COUNT}",
                self.scaler.n_features(),
                self.forest.n_features()
            )));
        }
        self.forest.validate()
    }

    /// Write atomically: temp file in the same directory, fsync, rename.
    pub fn save(&self, path: &Path) -> ScoreResult<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("artifact");
        let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

        let json = serde_json::to_vec(self)?;
        let written = (|| -> std::io::Result<()> {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(&json)?;
            f.sync_all()?;
            fs::rename(&tmp, path)
        })();
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        log::info!("model saved to {}", path.display());
        Ok(())
    }

    /// Load and validate. Either the whole artifact comes back or an error.
    pub fn load(path: &Path) -> ScoreResult<Self> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ScoreError::ArtifactNotFound { path: path.display().to_string() });
            }
            Err(e) => return Err(e.into()),
        };
        let artifact: ModelArtifact = serde_json::from_slice(&bytes)
            .map_err(|e| ScoreError::ArtifactCorrupt(format!("{}: {e}", path.display())))?;
        artifact.validate()?;
        log::info!("model loaded from {}", path.display());
        Ok(artifact)
    }
}

fn standardise_all(
    scaler: &StandardScaler,
    rows: &[[f64; FEATURE_COUNT]],
) -> ScoreResult<Vec<Vec<f64>>> {
    rows.iter().map(|r| scaler.transform(r)).collect()
}

/// Fraction of rows whose most likely class equals the label.
fn accuracy(forest: &RandomForest, rows: &[Vec<f64>], labels: &[usize]) -> ScoreResult<f64> {
    if rows.is_empty() {
        return Ok(0.0);
    }
    let mut hits = 0usize;
    for (row, &label) in rows.iter().zip(labels) {
        let p = ClassProbabilities(forest.predict_proba(row)?);
        if p.predicted_class().index() == label {
            hits += 1;
        }
    }
    Ok(hits as f64 / rows.len() as f64)
}

// ── Shared handle ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStatus {
    pub loaded: bool,
    pub artifact_path: String,
    pub trained_at: Option<DateTime<Utc>>,
    pub report: Option<TrainingReport>,
}

/// Owner of the in-memory artifact for one artifact path.
///
/// Loading is lazy and idempotent: concurrent first calls may each read
/// the file, but every caller sees a complete artifact or an error.
/// Writers (`install`, `train`) serialise on `save_lock`.
pub struct ModelHandle {
    path: PathBuf,
    artifact: RwLock<Option<Arc<ModelArtifact>>>,
    save_lock: Mutex<()>,
}

impl ModelHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            artifact: RwLock::new(None),
            save_lock: Mutex::new(()),
        }
    }

    pub fn shared(path: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self::new(path))
    }

    pub fn is_loaded(&self) -> bool {
        self.artifact.read().is_some()
    }

    /// The resident artifact, loading it from disk on first use.
    pub fn artifact(&self) -> ScoreResult<Arc<ModelArtifact>> {
        if let Some(a) = self.artifact.read().as_ref() {
            return Ok(Arc::clone(a));
        }
        let loaded = Arc::new(ModelArtifact::load(&self.path)?);
        let mut slot = self.artifact.write();
        // Another caller may have won the race; keep whichever landed first.
        Ok(Arc::clone(slot.get_or_insert(loaded)))
    }

    pub fn predict(&self, features: &FeatureVector) -> ScoreResult<ClassProbabilities> {
        self.artifact()?.predict(features)
    }

    /// Re-read the artifact from disk, replacing the resident copy.
    /// On failure the previous artifact stays in place.
    pub fn reload(&self) -> ScoreResult<()> {
        let loaded = Arc::new(ModelArtifact::load(&self.path)?);
        *self.artifact.write() = Some(loaded);
        Ok(())
    }

    /// Persist `artifact` and make it the resident model.
    pub fn install(&self, artifact: ModelArtifact) -> ScoreResult<Arc<ModelArtifact>> {
        artifact.validate()?;
        let _guard = self.save_lock.lock();
        artifact.save(&self.path)?;
        let artifact = Arc::new(artifact);
        *self.artifact.write() = Some(Arc::clone(&artifact));
        Ok(artifact)
    }

    /// Train on the given samples, persist, and swap in the new model.
    pub fn train(
        &self,
        features: &[FeatureVector],
        labels: &[CreditClass],
        config: &TrainingConfig,
    ) -> ScoreResult<TrainingReport> {
        let artifact = ModelArtifact::train(features, labels, config)?;
        let report = artifact.report;
        self.install(artifact)?;
        Ok(report)
    }

    pub fn status(&self) -> ModelStatus {
        let guard = self.artifact.read();
        ModelStatus {
            loaded: guard.is_some(),
            artifact_path: self.path.display().to_string(),
            trained_at: guard.as_ref().map(|a| a.trained_at),
            report: guard.as_ref().map(|a| a.report),
        }
    }
}
