//! Scenario files for the headless runner.
//!
//! A scenario combines solver parameters, the initial fluid placement and a
//! list of primitive rigid bodies, plus how long to run.

use std::path::Path;

use glam::{Quat, Vec3};
use pbf3d::serde_utils::{deserialize_quat, deserialize_vec3, serialize_quat, serialize_vec3};
use pbf3d::{seed, PbfParams, PbfSolver, RigidBodyDesc, RigidBodyManager, TriMesh};
use serde::{Deserialize, Serialize};

/// How the fluid is placed at frame 0.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FluidSetup {
    /// Regular lattice filling a box
    Block {
        #[serde(serialize_with = "serialize_vec3", deserialize_with = "deserialize_vec3")]
        min: Vec3,
        #[serde(serialize_with = "serialize_vec3", deserialize_with = "deserialize_vec3")]
        max: Vec3,
        spacing: f32,
    },
    /// `params.particle_count` random particles in the domain shrunk by 10%
    Random { seed: u64 },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    Sphere {
        radius: f32,
        #[serde(default = "default_segments")]
        segments: u32,
        #[serde(default = "default_rings")]
        rings: u32,
    },
    Box {
        #[serde(serialize_with = "serialize_vec3", deserialize_with = "deserialize_vec3")]
        half_extents: Vec3,
    },
}

fn default_segments() -> u32 {
    24
}
fn default_rings() -> u32 {
    12
}

impl Shape {
    /// Mesh centered on the body origin.
    pub fn mesh(&self) -> TriMesh {
        match *self {
            Shape::Sphere {
                radius,
                segments,
                rings,
            } => TriMesh::uv_sphere(Vec3::ZERO, radius, segments, rings),
            Shape::Box { half_extents } => TriMesh::cuboid(Vec3::ZERO, half_extents),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BodySetup {
    pub shape: Shape,
    pub voxel_size: f32,
    #[serde(serialize_with = "serialize_vec3", deserialize_with = "deserialize_vec3")]
    pub translation: Vec3,
    #[serde(
        default = "default_rotation",
        serialize_with = "serialize_quat",
        deserialize_with = "deserialize_quat"
    )]
    pub rotation: Quat,
    #[serde(default = "default_unit")]
    pub scale: f32,
    #[serde(default = "default_unit")]
    pub particle_mass: f32,
    #[serde(default)]
    pub is_static: bool,
}

fn default_rotation() -> Quat {
    Quat::IDENTITY
}
fn default_unit() -> f32 {
    1.0
}

impl BodySetup {
    pub fn desc(&self) -> RigidBodyDesc {
        RigidBodyDesc {
            mesh: Some(self.shape.mesh()),
            voxel_size: self.voxel_size,
            translation: self.translation,
            rotation: self.rotation,
            scale: self.scale,
            particle_mass: self.particle_mass,
            is_static: self.is_static,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub params: PbfParams,
    pub fluid: FluidSetup,
    #[serde(default)]
    pub bodies: Vec<BodySetup>,
    pub steps: u64,
    /// Frames between progress log lines; 0 logs only the summary
    #[serde(default = "default_log_interval")]
    pub log_interval: u64,
}

fn default_log_interval() -> u64 {
    50
}

impl Scenario {
    /// Small dam break used when no scenario file is given.
    pub fn dam_break() -> Self {
        Self {
            name: "dam_break".to_string(),
            description: "Fluid column collapsing in a closed box".to_string(),
            params: PbfParams {
                domain_max: Vec3::new(24.0, 16.0, 12.0),
                ..Default::default()
            },
            fluid: FluidSetup::Block {
                min: Vec3::splat(1.0),
                max: Vec3::new(8.0, 12.0, 8.0),
                spacing: 1.0,
            },
            bodies: Vec::new(),
            steps: 300,
            log_interval: default_log_interval(),
        }
    }

    /// Save scenario to a JSON file.
    pub fn save_json(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load scenario from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let json = std::fs::read_to_string(path)?;
        let scenario = serde_json::from_str(&json)?;
        Ok(scenario)
    }

    /// Voxelize the bodies and build a ready-to-step solver.
    pub fn build_solver(&self) -> pbf3d::Result<PbfSolver> {
        let mut bodies = RigidBodyManager::from_descs(self.bodies.iter().map(BodySetup::desc));
        bodies.init();
        let rigid = bodies.build_global_arrays();

        match self.fluid {
            FluidSetup::Block { min, max, spacing } => {
                let fluid = seed::lattice_block(min, max, spacing);
                PbfSolver::new(self.params.clone(), &fluid, rigid)
            }
            FluidSetup::Random { seed } => {
                PbfSolver::with_random_fluid(self.params.clone(), rigid, seed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_scenarios_parse() {
        for json in [
            include_str!("../scenarios/dam_break.json"),
            include_str!("../scenarios/sphere_in_pool.json"),
            include_str!("../scenarios/falling_box.json"),
            include_str!("../scenarios/splash.json"),
        ] {
            let scenario: Scenario = serde_json::from_str(json).unwrap();
            assert!(scenario.steps > 0);
            scenario.params.validate().unwrap();
        }
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let json = r#"{
            "name": "minimal",
            "fluid": { "kind": "random", "seed": 3 },
            "bodies": [
                { "shape": { "kind": "sphere", "radius": 2.0 },
                  "voxel_size": 0.5,
                  "translation": { "x": 1.0, "y": 2.0, "z": 3.0 } }
            ],
            "steps": 10
        }"#;
        let scenario: Scenario = serde_json::from_str(json).unwrap();
        assert_eq!(scenario.params, PbfParams::default());
        assert_eq!(scenario.log_interval, 50);
        let body = &scenario.bodies[0];
        assert_eq!(body.rotation, Quat::IDENTITY);
        assert_eq!(body.scale, 1.0);
        assert!(!body.is_static);
        assert_eq!(
            body.shape,
            Shape::Sphere {
                radius: 2.0,
                segments: 24,
                rings: 12
            }
        );
    }

    #[test]
    fn test_json_roundtrip() {
        let dir = std::env::temp_dir().join("pbf_runner_scenario_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("dam_break.json");

        let scenario = Scenario::dam_break();
        scenario.save_json(&path).unwrap();
        let loaded = Scenario::load_json(&path).unwrap();
        assert_eq!(loaded, scenario);
    }

    #[test]
    fn test_build_solver_places_fluid_and_bodies() {
        let scenario = Scenario {
            params: PbfParams {
                domain_max: Vec3::splat(16.0),
                ..Default::default()
            },
            fluid: FluidSetup::Block {
                min: Vec3::splat(1.0),
                max: Vec3::splat(4.0),
                spacing: 1.0,
            },
            bodies: vec![BodySetup {
                shape: Shape::Box {
                    half_extents: Vec3::ONE,
                },
                voxel_size: 0.5,
                translation: Vec3::splat(10.0),
                rotation: Quat::IDENTITY,
                scale: 1.0,
                particle_mass: 1.0,
                is_static: true,
            }],
            ..Scenario::dam_break()
        };
        let solver = scenario.build_solver().unwrap();
        assert_eq!(solver.fluid_count(), 64);
        assert!(solver.rigid_particle_count() > 0);
        assert_eq!(solver.rigid_bodies().len(), 1);
        assert!(solver.rigid_bodies()[0].is_static);
    }
}
