//! Diffusion-tensor statistics for similarity predicates.
//!
//! Each voxel of a diffusion volume carries a symmetric 3x3 tensor stored as
//! its 6 unique components `[xx, xy, xz, yy, yz, zz]`. Scalar indexes are
//! derived from the eigenvalues sorted in descending order (l1 >= l2 >= l3).

use crate::predicate::{Memoized, NeighborhoodPredicate, ScalarField, ScalarThreshold};
use nalgebra::{Matrix3, SymmetricEigen};
use std::f64::consts::PI;
use std::sync::Arc;
use volseg_core::{Error, Point, Result, Shape, Volume};

/// Precision of the toroidal-curvature angle search.
const TC_ANGLE_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DiffusionTensor(pub [f64; 6]);

impl DiffusionTensor {
    pub fn new(xx: f64, xy: f64, xz: f64, yy: f64, yz: f64, zz: f64) -> Self {
        Self([xx, xy, xz, yy, yz, zz])
    }

    pub fn diagonal(l1: f64, l2: f64, l3: f64) -> Self {
        Self::new(l1, 0.0, 0.0, l2, 0.0, l3)
    }

    pub fn matrix(&self) -> Matrix3<f64> {
        let [xx, xy, xz, yy, yz, zz] = self.0;
        Matrix3::new(xx, xy, xz, xy, yy, yz, xz, yz, zz)
    }

    /// Eigenvalues in descending order.
    pub fn eigenvalues(&self) -> [f64; 3] {
        let eig = SymmetricEigen::new(self.matrix());
        let mut values = [eig.eigenvalues[0], eig.eigenvalues[1], eig.eigenvalues[2]];
        values.sort_by(|a, b| b.total_cmp(a));
        values
    }

    pub fn trace(&self) -> f64 {
        self.0[0] + self.0[3] + self.0[5]
    }

    pub fn mean_diffusivity(&self) -> f64 {
        self.trace() / 3.0
    }

    /// FA in [0, 1]; degenerate tensors (zero norm, or numerically above 1)
    /// report 0.
    pub fn fractional_anisotropy(&self) -> f64 {
        let md = self.mean_diffusivity();
        let l = self.eigenvalues();
        let numerator = l.iter().map(|v| (v - md).powi(2)).sum::<f64>().sqrt();
        let denominator = l.iter().map(|v| v * v).sum::<f64>().sqrt();
        if denominator > 0.0 {
            let fa = (1.5f64).sqrt() * numerator / denominator;
            if fa > 1.0 {
                0.0
            } else {
                fa
            }
        } else {
            0.0
        }
    }

    pub fn axial_diffusivity(&self) -> f64 {
        self.eigenvalues()[0]
    }

    pub fn radial_diffusivity(&self) -> f64 {
        let l = self.eigenvalues();
        (l[1] + l[2]) / 2.0
    }

    pub fn toroidal_volume(&self) -> f64 {
        let [l1, l2, l3] = self.eigenvalues();
        (PI / 3.0) * l1 * (l2 * l3 + l3 * l3 / 2.0)
    }

    /// Gaussian curvature of the tensor's torus at the angle maximizing it.
    pub fn toroidal_curvature(&self) -> f64 {
        let [l1, l2, l3] = self.eigenvalues();
        let phi = argmax_torus_curvature(l2, l3);

        let alpha = if l1 != 0.0 { (2.0 * l2 + l3) / (4.0 * l1) } else { 0.0 };
        let beta = l3 * (4.0 * l1);
        let gamma = 0.5;
        let beta2 = beta * beta;
        let gamma2 = gamma * gamma;
        let cos_phi = phi.cos();

        let numerator = 4.0 * beta * gamma2 * cos_phi;
        let denominator =
            (alpha + beta * cos_phi) * (beta2 + gamma2 + (gamma2 - beta2) * (2.0 * phi).cos()).powi(2);
        if denominator != 0.0 {
            numerator / denominator
        } else {
            0.0
        }
    }

    /// Matrix logarithm; `None` unless the tensor is positive definite.
    pub fn log_matrix(&self) -> Option<Matrix3<f64>> {
        let eig = SymmetricEigen::new(self.matrix());
        if eig.eigenvalues.iter().any(|&v| !(v > 0.0) || !v.is_finite()) {
            return None;
        }
        let log_values = eig.eigenvalues.map(f64::ln);
        Some(eig.eigenvectors * Matrix3::from_diagonal(&log_values) * eig.eigenvectors.transpose())
    }

    /// Frobenius distance between matrix logarithms.
    pub fn log_euclidean_distance(&self, other: &DiffusionTensor) -> Option<f64> {
        let a = self.log_matrix()?;
        let b = other.log_matrix()?;
        Some((a - b).norm())
    }
}

fn torus_curvature_at(l2: f64, l3: f64, angle: f64) -> f64 {
    let radius = (2.0 * l2 + l3) / 4.0;
    let tube = l3 / 4.0;
    let denominator = tube * (radius + tube * angle.cos());
    if denominator != 0.0 {
        angle.cos() / denominator
    } else {
        0.0
    }
}

fn argmax_torus_curvature(l2: f64, l3: f64) -> f64 {
    let mut start = 0.0;
    let mut end = PI;
    while end - start > TC_ANGLE_TOLERANCE {
        let mid = (start + end) / 2.0;
        if torus_curvature_at(l2, l3, start) >= torus_curvature_at(l2, l3, end) {
            end = mid;
        } else {
            start = mid;
        }
    }
    (start + end) / 2.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TensorStatistic {
    FractionalAnisotropy,
    MeanDiffusivity,
    AxialDiffusivity,
    RadialDiffusivity,
    ToroidalVolume,
    ToroidalCurvature,
}

impl TensorStatistic {
    pub fn evaluate(self, tensor: &DiffusionTensor) -> f64 {
        match self {
            TensorStatistic::FractionalAnisotropy => tensor.fractional_anisotropy(),
            TensorStatistic::MeanDiffusivity => tensor.mean_diffusivity(),
            TensorStatistic::AxialDiffusivity => tensor.axial_diffusivity(),
            TensorStatistic::RadialDiffusivity => tensor.radial_diffusivity(),
            TensorStatistic::ToroidalVolume => tensor.toroidal_volume(),
            TensorStatistic::ToroidalCurvature => tensor.toroidal_curvature(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TensorStatistic::FractionalAnisotropy => "fa",
            TensorStatistic::MeanDiffusivity => "md",
            TensorStatistic::AxialDiffusivity => "ad",
            TensorStatistic::RadialDiffusivity => "rd",
            TensorStatistic::ToroidalVolume => "tv",
            TensorStatistic::ToroidalCurvature => "tc",
        }
    }
}

/// Evaluate `statistic` at every voxel in parallel.
pub fn statistic_map(tensors: &Volume<DiffusionTensor>, statistic: TensorStatistic) -> Volume<f64> {
    tensors.par_map(|_, t| statistic.evaluate(t))
}

/// A [`ScalarField`] reading one statistic off a diffusion volume.
#[derive(Debug, Clone)]
pub struct TensorField {
    tensors: Arc<Volume<DiffusionTensor>>,
    statistic: TensorStatistic,
}

impl TensorField {
    pub fn new(tensors: Arc<Volume<DiffusionTensor>>, statistic: TensorStatistic) -> Self {
        Self { tensors, statistic }
    }

    pub fn statistic(&self) -> TensorStatistic {
        self.statistic
    }

    /// Memoized threshold predicate over this statistic, e.g. an FA
    /// difference bound.
    pub fn threshold(self, max_difference: f64) -> Result<ScalarThreshold<Memoized<TensorField>>> {
        ScalarThreshold::new(Memoized::new(self), max_difference)
    }
}

impl ScalarField for TensorField {
    fn value(&self, p: Point) -> Result<f64> {
        let tensor = self.tensors.get(p).ok_or_else(|| {
            Error::predicate_failure(p, format!("outside tensor volume {}", self.tensors.shape()))
        })?;
        let value = self.statistic.evaluate(tensor);
        if value.is_finite() {
            Ok(value)
        } else {
            Err(Error::predicate_failure(
                p,
                format!("{} is not finite ({})", self.statistic.name(), value),
            ))
        }
    }

    fn shape(&self) -> Option<Shape> {
        Some(self.tensors.shape())
    }
}

/// Neighbors whose tensors lie within `max_distance` of the center's tensor
/// in the log-Euclidean metric.
#[derive(Debug, Clone)]
pub struct LogEuclidean {
    tensors: Arc<Volume<DiffusionTensor>>,
    max_distance: f64,
}

impl LogEuclidean {
    pub fn new(tensors: Arc<Volume<DiffusionTensor>>, max_distance: f64) -> Result<Self> {
        if !(max_distance >= 0.0) {
            return Err(Error::invalid_parameter(format!(
                "max_distance must be a non-negative number, got {}",
                max_distance
            )));
        }
        Ok(Self {
            tensors,
            max_distance,
        })
    }

    fn tensor(&self, p: Point) -> Result<&DiffusionTensor> {
        self.tensors.get(p).ok_or_else(|| {
            Error::predicate_failure(p, format!("outside tensor volume {}", self.tensors.shape()))
        })
    }
}

impl NeighborhoodPredicate for LogEuclidean {
    fn test(&self, center: Point, candidate: Point) -> Result<bool> {
        let a = self.tensor(center)?;
        let b = self.tensor(candidate)?;
        let distance = a.log_euclidean_distance(b).ok_or_else(|| {
            Error::predicate_failure(center, format!("tensor at {} or {} is not positive definite", center, candidate))
        })?;
        Ok(distance <= self.max_distance)
    }

    fn validate(&self, shape: Shape) -> Result<()> {
        if self.tensors.shape() != shape {
            return Err(Error::invalid_parameter(format!(
                "tensor volume shape {} does not match grid shape {}",
                self.tensors.shape(),
                shape
            )));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log-euclidean"
    }
}
