//! Volumetric data descriptor, validation and hand-off to the render thread.
//!
//! A single volume is active at a time, stored as one 3D texture. Producers
//! replace it wholesale through [`PendingVolume`]; the render thread uploads
//! the latest pending payload at the start of a frame.

use glam::{Mat4, Vec3};
use parking_lot::Mutex;

use crate::error::{Result, VizError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeSampleType {
    Grayscale,
    Rgb,
}

impl VolumeSampleType {
    pub fn channels(self) -> usize {
        match self {
            VolumeSampleType::Grayscale => 1,
            VolumeSampleType::Rgb => 3,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VolumeDescriptor {
    /// Voxel counts per axis.
    pub size: [u32; 3],
    /// Physical edge length of one voxel per axis, metres.
    pub voxel_size_m: [f32; 3],
    pub sample_type: VolumeSampleType,
}

impl Default for VolumeDescriptor {
    fn default() -> Self {
        Self {
            size: [0; 3],
            voxel_size_m: [1e-3; 3],
            sample_type: VolumeSampleType::Grayscale,
        }
    }
}

impl VolumeDescriptor {
    pub fn voxel_count(&self) -> usize {
        self.size.iter().map(|&s| s as usize).product()
    }

    pub fn is_empty(&self) -> bool {
        self.size.iter().any(|&s| s == 0)
    }

    /// Physical extent per axis in metres.
    pub fn extent_m(&self) -> Vec3 {
        Vec3::new(
            self.size[0] as f32 * self.voxel_size_m[0],
            self.size[1] as f32 * self.voxel_size_m[1],
            self.size[2] as f32 * self.voxel_size_m[2],
        )
    }

    /// Half extent in render-space units for the given world scale (metres
    /// per render unit). Planes and the bounding box are sized from this.
    pub fn half_extent_render(&self, world_scale_m: f32) -> Vec3 {
        self.extent_m() / (2.0 * world_scale_m)
    }

    /// Matrix mapping render-space positions (volume centred on the origin)
    /// into [0, 1]^3 texture coordinates.
    pub fn texture_transform(&self, world_scale_m: f32) -> Mat4 {
        if self.is_empty() {
            return Mat4::IDENTITY;
        }
        let extent = self.extent_m() / world_scale_m;
        Mat4::from_translation(Vec3::splat(0.5)) * Mat4::from_scale(extent.recip())
    }
}

/// Volume payload repacked for upload: grayscale stays one float per voxel
/// (`R32Float`), RGB is padded to four (`Rgba32Float`, alpha 1).
#[derive(Debug, Clone)]
pub struct VolumeData {
    pub descriptor: VolumeDescriptor,
    pub texels: Vec<f32>,
}

impl VolumeData {
    /// Validates the raw payload length against the descriptor and repacks
    /// it for the GPU texture format.
    pub fn pack(descriptor: VolumeDescriptor, data: &[f32]) -> Result<Self> {
        if descriptor.is_empty() {
            return Err(VizError::ContractViolation(
                "volume size must be non-zero on every axis".into(),
            ));
        }
        if descriptor.voxel_size_m.iter().any(|&v| v <= 0.0) {
            return Err(VizError::ContractViolation(
                "voxel size must be positive on every axis".into(),
            ));
        }

        let voxels = descriptor.voxel_count();
        let expected = voxels * descriptor.sample_type.channels();
        if data.len() != expected {
            return Err(VizError::ContractViolation(format!(
                "volume payload has {} samples, expected {} ({} voxels x {} channels)",
                data.len(),
                expected,
                voxels,
                descriptor.sample_type.channels()
            )));
        }

        let texels = match descriptor.sample_type {
            VolumeSampleType::Grayscale => data.to_vec(),
            VolumeSampleType::Rgb => {
                let mut packed = Vec::with_capacity(4 * voxels);
                for rgb in data.chunks_exact(3) {
                    packed.extend_from_slice(rgb);
                    packed.push(1.0);
                }
                packed
            }
        };

        Ok(Self { descriptor, texels })
    }

    /// Convenience overload for color-typed voxel data.
    pub fn pack_colors(descriptor: VolumeDescriptor, data: &[Vec3]) -> Result<Self> {
        if descriptor.sample_type != VolumeSampleType::Rgb {
            return Err(VizError::ContractViolation(
                "color voxel data requires an RGB volume descriptor".into(),
            ));
        }
        if data.len() != descriptor.voxel_count() {
            return Err(VizError::ContractViolation(format!(
                "volume payload has {} voxels, expected {}",
                data.len(),
                descriptor.voxel_count()
            )));
        }
        let mut texels = Vec::with_capacity(4 * data.len());
        for c in data {
            texels.extend_from_slice(&[c.x, c.y, c.z, 1.0]);
        }
        Ok(Self { descriptor, texels })
    }
}

/// Producer → render-thread hand-off slot. Replacing an unconsumed pending
/// volume discards the older one; only the latest matters.
#[derive(Debug, Default)]
pub struct PendingVolume(Mutex<Option<VolumeData>>);

impl PendingVolume {
    pub fn replace(&self, data: VolumeData) {
        *self.0.lock() = Some(data);
    }

    pub fn take(&self) -> Option<VolumeData> {
        self.0.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(sample_type: VolumeSampleType) -> VolumeDescriptor {
        VolumeDescriptor {
            size: [2, 3, 4],
            voxel_size_m: [1e-3, 1e-3, 2e-3],
            sample_type,
        }
    }

    #[test]
    fn payload_length_must_match_descriptor() {
        let desc = descriptor(VolumeSampleType::Grayscale);
        assert!(VolumeData::pack(desc, &vec![0.0; 24]).is_ok());
        assert!(matches!(
            VolumeData::pack(desc, &vec![0.0; 23]),
            Err(VizError::ContractViolation(_))
        ));

        let desc = descriptor(VolumeSampleType::Rgb);
        assert!(VolumeData::pack(desc, &vec![0.0; 72]).is_ok());
        assert!(VolumeData::pack(desc, &vec![0.0; 24]).is_err());
    }

    #[test]
    fn rgb_is_padded_to_rgba() {
        let desc = VolumeDescriptor {
            size: [1, 1, 1],
            voxel_size_m: [1.0; 3],
            sample_type: VolumeSampleType::Rgb,
        };
        let packed = VolumeData::pack(desc, &[0.25, 0.5, 0.75]).unwrap();
        assert_eq!(packed.texels, vec![0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn texture_transform_maps_volume_corners_to_unit_cube() {
        let desc = descriptor(VolumeSampleType::Grayscale);
        let scale = 1e-3;
        let t = desc.texture_transform(scale);
        let half = desc.half_extent_render(scale);

        let lo = t.transform_point3(-half);
        let hi = t.transform_point3(half);
        assert!((lo - Vec3::ZERO).length() < 1e-5);
        assert!((hi - Vec3::ONE).length() < 1e-5);
    }

    #[test]
    fn pending_volume_keeps_only_latest() {
        let pending = PendingVolume::default();
        let desc = VolumeDescriptor {
            size: [1, 1, 1],
            voxel_size_m: [1.0; 3],
            sample_type: VolumeSampleType::Grayscale,
        };
        pending.replace(VolumeData::pack(desc, &[0.1]).unwrap());
        pending.replace(VolumeData::pack(desc, &[0.9]).unwrap());

        let got = pending.take().unwrap();
        assert_eq!(got.texels, vec![0.9]);
        assert!(pending.take().is_none());
    }
}
