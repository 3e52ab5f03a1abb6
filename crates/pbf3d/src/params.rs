//! Solver configuration, loadable from JSON.

use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{PbfError, Result};
use crate::geometry::Aabb;
use crate::injection::SplashInjection;
use crate::kernels::KernelCoefficients;
use crate::serde_utils::{deserialize_vec3, serialize_vec3};

/// Preset fluid particle counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticleCountMode {
    #[default]
    Num1K,
    Num4K,
    Num8K,
    Num16K,
    Num32K,
    Num65K,
    Num130K,
    Num260K,
}

impl ParticleCountMode {
    pub fn count(self) -> usize {
        match self {
            ParticleCountMode::Num1K => 1024,
            ParticleCountMode::Num4K => 4096,
            ParticleCountMode::Num8K => 8192,
            ParticleCountMode::Num16K => 16384,
            ParticleCountMode::Num32K => 32768,
            ParticleCountMode::Num65K => 65530,
            ParticleCountMode::Num130K => 131072,
            ParticleCountMode::Num260K => 262144,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PbfParams {
    #[serde(
        default = "default_domain_min",
        serialize_with = "serialize_vec3",
        deserialize_with = "deserialize_vec3"
    )]
    pub domain_min: Vec3,
    #[serde(
        default = "default_domain_max",
        serialize_with = "serialize_vec3",
        deserialize_with = "deserialize_vec3"
    )]
    pub domain_max: Vec3,
    #[serde(
        default = "default_gravity",
        serialize_with = "serialize_vec3",
        deserialize_with = "deserialize_vec3"
    )]
    pub gravity: Vec3,
    #[serde(default = "default_dt")]
    pub dt: f32,
    /// Constraint projection iterations per step
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default = "default_rest_density")]
    pub rest_density: f32,
    #[serde(default = "default_smoothing_radius")]
    pub smoothing_radius: f32,
    #[serde(default = "default_tensile_k")]
    pub tensile_k: f32,
    #[serde(default = "default_tensile_n")]
    pub tensile_n: i32,
    /// Tensile reference distance as a fraction of the smoothing radius
    #[serde(default = "default_tensile_dq")]
    pub tensile_dq: f32,
    #[serde(default = "default_epsilon_lambda")]
    pub epsilon_lambda: f32,
    #[serde(default = "default_epsilon_vorticity")]
    pub epsilon_vorticity: f32,
    #[serde(default = "default_xsph_viscosity")]
    pub xsph_viscosity: f32,
    #[serde(default = "default_surface_neighbor_threshold")]
    pub surface_neighbor_threshold: u32,
    /// Used when the caller asks the solver to seed fluid itself
    #[serde(default)]
    pub particle_count: ParticleCountMode,
    #[serde(default)]
    pub injection: Option<SplashInjection>,
}

fn default_domain_min() -> Vec3 {
    Vec3::ZERO
}
fn default_domain_max() -> Vec3 {
    Vec3::splat(32.0)
}
fn default_gravity() -> Vec3 {
    Vec3::new(0.0, GRAVITY, 0.0)
}
fn default_dt() -> f32 {
    DEFAULT_DT
}
fn default_iterations() -> u32 {
    DEFAULT_ITERATIONS
}
fn default_rest_density() -> f32 {
    DEFAULT_REST_DENSITY
}
fn default_smoothing_radius() -> f32 {
    DEFAULT_SMOOTHING_RADIUS
}
fn default_tensile_k() -> f32 {
    DEFAULT_TENSILE_K
}
fn default_tensile_n() -> i32 {
    DEFAULT_TENSILE_N
}
fn default_tensile_dq() -> f32 {
    DEFAULT_TENSILE_DQ
}
fn default_epsilon_lambda() -> f32 {
    DEFAULT_EPSILON_LAMBDA
}
fn default_epsilon_vorticity() -> f32 {
    DEFAULT_EPSILON_VORTICITY
}
fn default_xsph_viscosity() -> f32 {
    DEFAULT_XSPH_VISCOSITY
}
fn default_surface_neighbor_threshold() -> u32 {
    DEFAULT_SURFACE_NEIGHBOR_THRESHOLD
}

impl Default for PbfParams {
    fn default() -> Self {
        Self {
            domain_min: default_domain_min(),
            domain_max: default_domain_max(),
            gravity: default_gravity(),
            dt: DEFAULT_DT,
            iterations: DEFAULT_ITERATIONS,
            rest_density: DEFAULT_REST_DENSITY,
            smoothing_radius: DEFAULT_SMOOTHING_RADIUS,
            tensile_k: DEFAULT_TENSILE_K,
            tensile_n: DEFAULT_TENSILE_N,
            tensile_dq: DEFAULT_TENSILE_DQ,
            epsilon_lambda: DEFAULT_EPSILON_LAMBDA,
            epsilon_vorticity: DEFAULT_EPSILON_VORTICITY,
            xsph_viscosity: DEFAULT_XSPH_VISCOSITY,
            surface_neighbor_threshold: DEFAULT_SURFACE_NEIGHBOR_THRESHOLD,
            particle_count: ParticleCountMode::default(),
            injection: None,
        }
    }
}

impl PbfParams {
    pub fn domain(&self) -> Aabb {
        Aabb::new(self.domain_min, self.domain_max)
    }

    pub fn kernel_coefficients(&self) -> KernelCoefficients {
        KernelCoefficients::new(self.smoothing_radius, self.tensile_dq)
    }

    /// Grid cells are twice the smoothing radius wide.
    pub fn grid_cell_width(&self) -> f32 {
        2.0 * self.smoothing_radius
    }

    pub fn validate(&self) -> Result<()> {
        let positive = |name: &'static str, value: f32| {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(PbfError::InvalidParam {
                    name,
                    reason: format!("must be positive and finite, got {value}"),
                })
            }
        };
        positive("dt", self.dt)?;
        positive("smoothing_radius", self.smoothing_radius)?;
        positive("rest_density", self.rest_density)?;

        if !(self.domain_min.is_finite() && self.domain_max.is_finite())
            || self.domain_max.cmple(self.domain_min).any()
        {
            return Err(PbfError::InvalidParam {
                name: "domain",
                reason: format!("max {} must exceed min {} on every axis", self.domain_max, self.domain_min),
            });
        }
        if !(self.epsilon_lambda >= 0.0) {
            return Err(PbfError::InvalidParam {
                name: "epsilon_lambda",
                reason: format!("must be non-negative, got {}", self.epsilon_lambda),
            });
        }
        if let Some(injection) = &self.injection {
            positive("injection.interval", injection.interval)?;
        }
        Ok(())
    }

    /// Save parameters to a JSON file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load and validate parameters from a JSON file. Missing fields take
    /// their defaults.
    pub fn load_json(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let params: Self = serde_json::from_str(&json)?;
        params.validate()?;
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let params = PbfParams::default();
        params.validate().unwrap();
        assert!((params.grid_cell_width() - 2.4).abs() < 1e-6);
        assert_eq!(params.particle_count.count(), 1024);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let params: PbfParams =
            serde_json::from_str(r#"{ "iterations": 4, "particle_count": "Num65K" }"#).unwrap();
        assert_eq!(params.iterations, 4);
        assert_eq!(params.particle_count.count(), 65530);
        assert_eq!(params.dt, DEFAULT_DT);
        assert_eq!(params.gravity, Vec3::new(0.0, GRAVITY, 0.0));
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad_h = PbfParams {
            smoothing_radius: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            bad_h.validate(),
            Err(PbfError::InvalidParam { name: "smoothing_radius", .. })
        ));

        let flat = PbfParams {
            domain_max: Vec3::new(10.0, 0.0, 10.0),
            ..Default::default()
        };
        assert!(flat.validate().is_err());
    }

    #[test]
    fn test_json_file_round_trip() {
        let path = std::env::temp_dir().join(format!("pbf3d_params_{}.json", std::process::id()));
        let params = PbfParams {
            injection: Some(SplashInjection {
                batch_size: 256,
                interval: 0.25,
            }),
            ..Default::default()
        };
        params.save_json(&path).unwrap();
        let loaded = PbfParams::load_json(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, params);
    }
}
