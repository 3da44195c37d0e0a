//! Directional lights.
//!
//! Lights may be added from any thread and are read once per frame by the
//! lighting passes, so the table sits behind a mutex. Only directional
//! lights are supported: the homogeneous position must have w = 0, making
//! the position equal to the direction towards the light source.

use std::collections::BTreeMap;

use glam::{Vec3, Vec4};
use parking_lot::Mutex;

use crate::error::{Result, VizError};

pub type LightName = u16;

#[derive(Debug, Clone, Copy)]
pub struct Light {
    /// Light color, linear RGB.
    pub color: Vec3,
    /// Homogeneous position. w must be 0; the xyz part points towards the
    /// light source.
    pub position: Vec4,
    /// How much this light contributes to the single ambient pass.
    pub ambient_factor: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            position: Vec4::ZERO,
            ambient_factor: 0.0,
        }
    }
}

/// Mutex-guarded, name-ordered light table.
#[derive(Debug, Default)]
pub struct LightTable {
    lights: Mutex<BTreeMap<LightName, Light>>,
}

impl LightTable {
    pub fn add(&self, name: LightName, light: Light) -> Result<()> {
        if light.position.w.abs() > 1e-3 {
            return Err(VizError::ContractViolation(format!(
                "only directional lights are supported: position w must be 0, got {}",
                light.position.w
            )));
        }
        self.lights.lock().insert(name, light);
        Ok(())
    }

    /// Snapshot of all lights, taken once per frame by the render thread.
    pub fn snapshot(&self) -> Vec<Light> {
        self.lights.lock().values().copied().collect()
    }

    /// Sum of `ambient_factor * color` over all lights, the input to the
    /// ambient lighting pass.
    pub fn ambient_color(&self) -> Vec3 {
        self.lights
            .lock()
            .values()
            .map(|l| l.ambient_factor * l.color)
            .fold(Vec3::ZERO, |acc, c| acc + c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_directional_lights() {
        let table = LightTable::default();
        let bad = Light {
            position: Vec4::new(1.0, 0.0, 0.0, 1.0),
            ..Default::default()
        };
        assert!(matches!(
            table.add(0, bad),
            Err(VizError::ContractViolation(_))
        ));
    }

    #[test]
    fn ambient_color_sums_contributions() {
        let table = LightTable::default();
        table
            .add(
                0,
                Light {
                    color: Vec3::new(1.0, 0.0, 0.0),
                    position: Vec4::new(1.0, 1.0, 1.0, 0.0),
                    ambient_factor: 0.5,
                },
            )
            .unwrap();
        table
            .add(
                1,
                Light {
                    color: Vec3::new(0.0, 1.0, 0.0),
                    position: Vec4::new(0.0, 1.0, 0.0, 0.0),
                    ambient_factor: 0.25,
                },
            )
            .unwrap();

        let ambient = table.ambient_color();
        assert!((ambient - Vec3::new(0.5, 0.25, 0.0)).length() < 1e-6);
    }
}
