//! Demo scene: a procedural RGB gradient volume sliced by three movable
//! planes, an icosahedron mesh, a draggable marker cube and three
//! directional lights. With `--multithreaded`, a worker thread animates the
//! cube while the main thread renders.

use anyhow::Result;
use clap::Parser;
use glam::Vec3;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};
use volviz::{
    Axis, CubeDescriptor, GeometryDescriptor, Light, MeshDescriptor, MoveMask, PlaneDescriptor,
    VolumeDescriptor, VolumeSampleType, Visualizer,
};

#[derive(Parser, Debug)]
#[command(about = "volviz demo scene")]
struct Args {
    /// Frame rate cap; 0 renders as fast as possible.
    #[arg(long, default_value_t = 60.0)]
    fps: f64,

    /// Volume resolution along x, y, z.
    #[arg(long, default_value_t = 256)]
    nx: u32,
    #[arg(long, default_value_t = 256)]
    ny: u32,
    #[arg(long, default_value_t = 128)]
    nz: u32,

    /// Animate the marker cube from a worker thread.
    #[arg(long)]
    multithreaded: bool,
}

/// RGB gradient across the volume: each axis drives one channel.
fn gradient_volume(size: [u32; 3]) -> Vec<Vec3> {
    let [nx, ny, nz] = size;
    let mut voxels = Vec::with_capacity((nx * ny * nz) as usize);
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                voxels.push(Vec3::new(
                    x as f32 / (nx - 1).max(1) as f32,
                    y as f32 / (ny - 1).max(1) as f32,
                    z as f32 / (nz - 1).max(1) as f32,
                ));
            }
        }
    }
    voxels
}

/// Unit icosahedron: 12 vertices, 20 faces.
fn icosahedron() -> (Vec<Vec3>, Vec<[u32; 3]>) {
    let phi = (1.0 + 5.0f32.sqrt()) / 2.0;
    let vertices: Vec<Vec3> = [
        [-1.0, phi, 0.0],
        [1.0, phi, 0.0],
        [-1.0, -phi, 0.0],
        [1.0, -phi, 0.0],
        [0.0, -1.0, phi],
        [0.0, 1.0, phi],
        [0.0, -1.0, -phi],
        [0.0, 1.0, -phi],
        [phi, 0.0, -1.0],
        [phi, 0.0, 1.0],
        [-phi, 0.0, -1.0],
        [-phi, 0.0, 1.0],
    ]
    .iter()
    .map(|v| Vec3::from_slice(v).normalize())
    .collect();

    let indices = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];
    (vertices, indices)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut viz = Visualizer::with_title_and_size("volviz demo", 1280, 720)?;
    viz.set_background_color(Vec3::splat(0.05));
    viz.show_bounding_box(true);

    // One render unit per millimetre; the volume uses 1 mm voxels, so it
    // spans nx x ny x nz render units.
    viz.set_scale_m(1e-3)?;
    let descriptor = VolumeDescriptor {
        size: [args.nx, args.ny, args.nz],
        voxel_size_m: [1e-3; 3],
        sample_type: VolumeSampleType::Rgb,
    };
    viz.set_volume_colors(descriptor, &gradient_volume(descriptor.size))?;

    // Step the camera back far enough to see the whole volume.
    let extent = descriptor.extent_m();
    viz.camera()
        .set_position_m(Vec3::new(0.0, 0.0, 1.2 * extent.x.max(extent.y)));

    // One slicing plane per axis, through the origin.
    for (name, axis) in [("plane-x", Axis::X), ("plane-y", Axis::Y), ("plane-z", Axis::Z)] {
        viz.add_geometry(
            name,
            GeometryDescriptor::Plane(PlaneDescriptor {
                axis,
                intercept_m: 0.0,
                color: Vec3::ONE,
                movable: true,
            }),
        )?;
    }

    let (vertices, indices) = icosahedron();
    viz.add_geometry(
        "mesh",
        GeometryDescriptor::Mesh(MeshDescriptor {
            vertices,
            indices,
            position: Vec3::new(-0.25 * extent.x / 1e-3, 0.0, 0.0),
            scale_m: 0.15 * extent.x,
            color: Vec3::new(0.8, 0.8, 0.2),
            move_mask: MoveMask::ALL,
        }),
    )?;

    let cube_orbit = 0.35 * extent.x / 1e-3;
    viz.add_geometry(
        "cube",
        GeometryDescriptor::Cube(CubeDescriptor {
            position: Vec3::new(cube_orbit, 0.0, 0.0),
            radius: 1.0,
            scale_m: 0.05 * extent.x,
            color: Vec3::new(0.2, 0.6, 1.0),
            move_mask: MoveMask::ALL,
        }),
    )?;

    for (name, direction, color) in [
        (0u16, Vec3::new(1.0, 1.0, 1.0), Vec3::ONE),
        (1, Vec3::new(-1.0, 0.5, 0.5), Vec3::new(1.0, 0.9, 0.8)),
        (2, Vec3::new(0.0, -1.0, 0.25), Vec3::new(0.5, 0.5, 0.7)),
    ] {
        viz.add_light(
            name,
            Light {
                color,
                position: direction.normalize().extend(0.0),
                ambient_factor: 0.15,
            },
        )?;
    }

    let running = Arc::new(AtomicBool::new(true));
    let worker = if args.multithreaded {
        viz.enable_multithreading();
        let handle = viz.handle();
        let running = Arc::clone(&running);
        Some(std::thread::spawn(move || {
            let start = Instant::now();
            while running.load(Ordering::Relaxed) {
                let t = start.elapsed().as_secs_f32();
                let position =
                    Vec3::new(cube_orbit * t.cos(), cube_orbit * t.sin(), 0.0);
                let update = handle.update_geometry(
                    "cube",
                    GeometryDescriptor::Cube(CubeDescriptor {
                        position,
                        radius: 1.0,
                        scale_m: 0.05 * extent.x,
                        color: Vec3::new(0.2, 0.6, 1.0),
                        move_mask: MoveMask::ALL,
                    }),
                );
                match update {
                    // Not initialized yet; retry next tick.
                    Ok(false) => {}
                    Ok(true) => {}
                    Err(e) => {
                        log::error!("cube update failed: {e}");
                        break;
                    }
                }
                std::thread::sleep(Duration::from_millis(33));
            }
        }))
    } else {
        None
    };

    log::info!(
        "controls: drag = rotate camera or move object, wheel = zoom, \
         g = grid, b = bounding box, 1/2/3 = scene/G-buffer/selection view, \
         esc = quit"
    );
    let result = viz.render_at_fps(args.fps);

    running.store(false, Ordering::Relaxed);
    if let Some(worker) = worker {
        let _ = worker.join();
    }
    result?;
    Ok(())
}
