//! Thread-safe geometry registration and update protocol.
//!
//! Producers enqueue `(name, descriptor)` pairs; the render thread — the
//! only GPU-context owner — drains at most one init entry per frame, builds
//! the GPU instance, and commits the name to the live table. Updates flow
//! through a per-slot channel whose receiving end lives with the render
//! thread; the table mutex only guards name lookup, never the queues.
//!
//! The live table is an insertion-ordered vector, never a hash map: picking
//! resolves a selection index by slot position, so iteration order must be
//! stable across frames.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::error::{Result, VizError};
use crate::geometry::{GeometryDescriptor, GeometryKind};

pub type GeometryName = String;

/// Producer-visible half of a live slot.
struct SlotMeta {
    name: GeometryName,
    kind: GeometryKind,
    update_tx: Sender<GeometryDescriptor>,
}

#[derive(Default)]
struct TableState {
    live: Vec<SlotMeta>,
    /// Names added but not yet drained; guards against duplicate adds.
    pending: HashSet<GeometryName>,
}

pub struct GeometryRegistry {
    init_tx: Sender<(GeometryName, GeometryDescriptor)>,
    /// Render-thread-only consumer; the mutex exists to keep the registry
    /// `Sync`, not for contention.
    init_rx: Mutex<Receiver<(GeometryName, GeometryDescriptor)>>,
    table: Mutex<TableState>,
    multithreaded: AtomicBool,
}

impl Default for GeometryRegistry {
    fn default() -> Self {
        let (init_tx, init_rx) = unbounded();
        Self {
            init_tx,
            init_rx: Mutex::new(init_rx),
            table: Mutex::new(TableState::default()),
            multithreaded: AtomicBool::new(false),
        }
    }
}

impl GeometryRegistry {
    /// Switches `update` from "hard error on unknown name" to "soft failure,
    /// retry later". Must be called before producer threads race the render
    /// thread's init drain.
    pub fn enable_multithreading(&self) {
        self.multithreaded.store(true, Ordering::Release);
    }

    pub fn multithreading_enabled(&self) -> bool {
        self.multithreaded.load(Ordering::Acquire)
    }

    /// Queues a new geometry for GPU-side initialization. Returns
    /// immediately; no GPU work happens on the calling thread.
    pub fn add(&self, name: impl Into<GeometryName>, descriptor: GeometryDescriptor) -> Result<()> {
        let name = name.into();
        descriptor.validate()?;

        let mut table = self.table.lock();
        if table.pending.contains(&name) || table.live.iter().any(|s| s.name == name) {
            return Err(VizError::ContractViolation(format!(
                "geometry '{name}' is already registered"
            )));
        }
        table.pending.insert(name.clone());
        drop(table);

        // The receiver lives as long as the registry, so this cannot fail.
        let _ = self.init_tx.send((name, descriptor));
        Ok(())
    }

    /// Forwards a descriptor update to a live instance's queue.
    ///
    /// Returns `Ok(true)` on success and `Ok(false)` when the name has been
    /// added but not yet drained (multithreaded mode; retry next frame).
    /// Unknown names are a usage error in single-threaded mode.
    pub fn update(&self, name: &str, descriptor: GeometryDescriptor) -> Result<bool> {
        descriptor.validate()?;

        let table = self.table.lock();
        let Some(slot) = table.live.iter().find(|s| s.name == name) else {
            if self.multithreading_enabled() {
                return Ok(false);
            }
            return Err(VizError::UnknownGeometry(name.to_owned()));
        };

        if slot.kind != descriptor.kind() {
            return Err(VizError::GeometryTypeMismatch {
                name: name.to_owned(),
                expected: slot.kind.name(),
                got: descriptor.kind().name(),
            });
        }

        let _ = slot.update_tx.send(descriptor);
        Ok(true)
    }

    /// Pops at most one queued init entry. Render thread only. The entry is
    /// not live yet; call [`Self::commit_live`] once its GPU resources are
    /// initialized.
    pub fn pop_init(&self) -> Option<(GeometryName, GeometryDescriptor)> {
        self.init_rx.lock().try_recv().ok()
    }

    /// Commits an initialized geometry to the live table and returns the
    /// consumer end of its update queue. Slot indices are assigned in commit
    /// order and never change afterwards.
    pub fn commit_live(
        &self,
        name: GeometryName,
        kind: GeometryKind,
    ) -> Receiver<GeometryDescriptor> {
        let (update_tx, update_rx) = unbounded();
        let mut table = self.table.lock();
        table.pending.remove(&name);
        table.live.push(SlotMeta {
            name,
            kind,
            update_tx,
        });
        update_rx
    }

    /// Number of live instances.
    pub fn live_count(&self) -> usize {
        self.table.lock().live.len()
    }

    /// Resolves a selection index to a geometry name: 0 means "no object",
    /// index *i* is the *i*-th committed slot (1-based).
    pub fn resolve_index(&self, index: u32) -> Option<GeometryName> {
        if index == 0 {
            return None;
        }
        self.table
            .lock()
            .live
            .get(index as usize - 1)
            .map(|s| s.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{CubeDescriptor, MeshDescriptor, PlaneDescriptor};
    use glam::Vec3;

    fn cube() -> GeometryDescriptor {
        GeometryDescriptor::Cube(CubeDescriptor::default())
    }

    fn plane() -> GeometryDescriptor {
        GeometryDescriptor::Plane(PlaneDescriptor::default())
    }

    /// Simulates the render thread's per-frame init drain.
    fn drain_one(registry: &GeometryRegistry) -> Option<Receiver<GeometryDescriptor>> {
        registry
            .pop_init()
            .map(|(name, desc)| registry.commit_live(name, desc.kind()))
    }

    #[test]
    fn update_before_init_is_soft_failure_when_multithreaded() {
        let registry = GeometryRegistry::default();
        registry.enable_multithreading();

        registry.add("cube", cube()).unwrap();
        // Queued but not drained: soft failure, no error.
        assert_eq!(registry.update("cube", cube()).unwrap(), false);

        drain_one(&registry).unwrap();
        assert_eq!(registry.update("cube", cube()).unwrap(), true);
    }

    #[test]
    fn update_of_unknown_name_is_usage_error_when_single_threaded() {
        let registry = GeometryRegistry::default();
        assert!(matches!(
            registry.update("nope", cube()),
            Err(VizError::UnknownGeometry(_))
        ));
    }

    #[test]
    fn descriptor_kind_is_immutable_after_registration() {
        let registry = GeometryRegistry::default();
        registry.add("g", cube()).unwrap();
        drain_one(&registry).unwrap();

        assert!(matches!(
            registry.update("g", plane()),
            Err(VizError::GeometryTypeMismatch { .. })
        ));
    }

    #[test]
    fn updates_reach_the_instance_queue_in_order() {
        let registry = GeometryRegistry::default();
        registry.add("cube", cube()).unwrap();
        let rx = drain_one(&registry).unwrap();

        for x in [1.0f32, 2.0, 3.0] {
            let desc = GeometryDescriptor::Cube(CubeDescriptor {
                position: Vec3::new(x, 0.0, 0.0),
                ..Default::default()
            });
            assert!(registry.update("cube", desc).unwrap());
        }

        let mut seen = Vec::new();
        while let Ok(GeometryDescriptor::Cube(c)) = rx.try_recv() {
            seen.push(c.position.x);
        }
        assert_eq!(seen, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn selection_indices_follow_commit_order() {
        let registry = GeometryRegistry::default();
        registry.add("first", plane()).unwrap();
        registry.add("second", cube()).unwrap();

        // One init per frame: "second" is not live after the first drain.
        drain_one(&registry).unwrap();
        assert_eq!(registry.live_count(), 1);
        drain_one(&registry).unwrap();

        assert_eq!(registry.resolve_index(0), None);
        assert_eq!(registry.resolve_index(1).as_deref(), Some("first"));
        assert_eq!(registry.resolve_index(2).as_deref(), Some("second"));
        assert_eq!(registry.resolve_index(3), None);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let registry = GeometryRegistry::default();
        registry.add("g", cube()).unwrap();
        assert!(registry.add("g", cube()).is_err());

        drain_one(&registry).unwrap();
        assert!(registry.add("g", cube()).is_err());
    }

    #[test]
    fn adds_from_many_threads_all_drain() {
        let registry = std::sync::Arc::new(GeometryRegistry::default());
        registry.enable_multithreading();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = std::sync::Arc::clone(&registry);
                std::thread::spawn(move || registry.add(format!("g{i}"), cube()).unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut drained = 0;
        while drain_one(&registry).is_some() {
            drained += 1;
        }
        assert_eq!(drained, 8);
        assert_eq!(registry.live_count(), 8);
    }

    #[test]
    fn invalid_mesh_descriptor_is_rejected_at_add_time() {
        let registry = GeometryRegistry::default();
        let bad = GeometryDescriptor::Mesh(MeshDescriptor {
            vertices: vec![Vec3::ZERO],
            indices: vec![[0, 0, 5]],
            scale_m: 1.0,
            ..Default::default()
        });
        assert!(matches!(
            registry.add("mesh", bad),
            Err(VizError::InvalidGeometryData(_))
        ));
    }
}
