//! Per-feature standardisation: (x - mean) / std.

use crate::error::{ScoreError, ScoreResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    /// Fit on the training rows only. Uses the population standard
    /// deviation; a constant column gets a scale of 1.
    pub fn fit<R: AsRef<[f64]>>(rows: &[R]) -> ScoreResult<Self> {
        let first = rows
            .first()
            .ok_or_else(|| {
                ScoreError::InvalidTrainingData("cannot fit scaler on zero rows".into())
            })?;
        let width = first.as_ref().len();
        let n = rows.len() as f64;

        let mut mean = vec![0.0; width];
        for row in rows {
            let row = row.as_ref();
            if row.len() != width {
                return Err(ScoreError::InvalidTrainingData(format!(
                    "ragged rows: expected {width} columns, got {}",
                    row.len()
                )));
            }
            for (m, x) in mean.iter_mut().zip(row) {
                *m += x;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut var = vec![0.0; width];
        for row in rows {
            for ((v, x), m) in var.iter_mut().zip(row.as_ref()).zip(&mean) {
                *v += (x - m).powi(2);
            }
        }
        let scale = var
            .into_iter()
            .map(|v| {
                let std = (v / n).sqrt();
                if std == 0.0 { 1.0 } else { std }
            })
            .collect();

        Ok(Self { mean, scale })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, row: &[f64]) -> ScoreResult<Vec<f64>> {
        if row.len() != self.n_features() || self.scale.len() != self.n_features() {
            return Err(ScoreError::ModelPrediction(format!(
                "scaler expects {} features, got {}",
                self.n_features(),
                row.len()
            )));
        }
        Ok(row
            .iter()
            .zip(&self.mean)
            .zip(&self.scale)
            .map(|((x, m), s)| (x - m) / s)
            .collect())
    }
}
