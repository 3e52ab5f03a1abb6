//! Serde helpers for the glam types that appear in configuration.
//!
//! Used with `#[serde(serialize_with = ..., deserialize_with = ...)]` so that
//! params and scenario files read as plain `{ "x": .., "y": .., "z": .. }`.

use glam::{Quat, Vec3};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Serde proxy for Vec3
#[derive(Serialize, Deserialize)]
pub struct Vec3Def {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl From<Vec3> for Vec3Def {
    fn from(v: Vec3) -> Self {
        Self { x: v.x, y: v.y, z: v.z }
    }
}

impl From<Vec3Def> for Vec3 {
    fn from(def: Vec3Def) -> Self {
        Vec3::new(def.x, def.y, def.z)
    }
}

pub fn serialize_vec3<S>(v: &Vec3, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    Vec3Def::from(*v).serialize(s)
}

pub fn deserialize_vec3<'de, D>(d: D) -> Result<Vec3, D::Error>
where
    D: Deserializer<'de>,
{
    Vec3Def::deserialize(d).map(Vec3::from)
}

/// Serde proxy for Quat, stored as `[x, y, z, w]` fields.
#[derive(Serialize, Deserialize)]
pub struct QuatDef {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl From<Quat> for QuatDef {
    fn from(q: Quat) -> Self {
        let [x, y, z, w] = q.to_array();
        Self { x, y, z, w }
    }
}

impl From<QuatDef> for Quat {
    fn from(def: QuatDef) -> Self {
        // Hand-edited files rarely carry unit quaternions.
        Quat::from_array([def.x, def.y, def.z, def.w]).normalize()
    }
}

pub fn serialize_quat<S>(q: &Quat, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    QuatDef::from(*q).serialize(s)
}

pub fn deserialize_quat<'de, D>(d: D) -> Result<Quat, D::Error>
where
    D: Deserializer<'de>,
{
    QuatDef::deserialize(d).map(Quat::from)
}
