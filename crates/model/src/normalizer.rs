//! Per-column standardization adapted on the training matrix.

use ndarray::{Array1, Array2, Axis};
use ranker_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Columns with a smaller standard deviation are only centered.
const MIN_STD: f32 = 1e-7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Normalizer {
    mean: Array1<f32>,
    std: Array1<f32>,
}

impl Normalizer {
    /// Leaves values unchanged.
    pub fn identity(width: usize) -> Self {
        Self {
            mean: Array1::zeros(width),
            std: Array1::ones(width),
        }
    }

    /// Population mean and standard deviation of every column.
    pub fn adapt(values: &Array2<f32>) -> Self {
        if values.nrows() == 0 {
            return Self::identity(values.ncols());
        }

        let mean = values.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(values.ncols()));
        let std = values
            .var_axis(Axis(0), 0.0)
            .mapv(|v| {
                let s = v.sqrt();
                if s.is_finite() && s > MIN_STD {
                    s
                } else {
                    1.0
                }
            });
        Self { mean, std }
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, values: &Array2<f32>) -> Result<Array2<f32>> {
        if values.ncols() != self.width() {
            return Err(Error::model(format!(
                "normalizer expects {} columns, got {}",
                self.width(),
                values.ncols()
            )));
        }
        Ok((values - &self.mean) / &self.std)
    }
}
