//! Synthetic frames and counting adapters shared by unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use nalgebra::{UnitQuaternion, Vector3};
use parking_lot::{Condvar, Mutex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::camera::{CameraModel, PinholeModel};
use crate::error::{KeyframeError, Result};
use crate::features::{Descriptor, FeatureAdapter, FeatureSet, KeyPoint, DESCRIPTOR_BYTES};
use crate::frame::{Frame, FrameSource, ImagePlane, Point3D, PointCloud};
use crate::geometry::SE3;
use crate::vocabulary::{BowVector, FeatureVector, VocabularyAdapter};

pub const WIDTH: usize = 64;
pub const HEIGHT: usize = 48;
pub const DEPTH: f32 = 2.0;

pub fn pinhole() -> PinholeModel {
    PinholeModel::new(50.0, 50.0, 32.0, 24.0, WIDTH, HEIGHT)
}

pub fn shared_camera() -> Arc<dyn CameraModel> {
    Arc::new(pinhole())
}

pub fn translated_pose(x: f64, y: f64, z: f64) -> SE3 {
    SE3 {
        rotation: UnitQuaternion::identity(),
        translation: Vector3::new(x, y, z),
    }
}

/// Point on the fronto-parallel plane at `DEPTH` that projects to the center
/// of pixel (`row`, `col`).
pub fn pixel_point(cam: &PinholeModel, row: usize, col: usize) -> Point3D {
    let x = ((col as f64 + 0.5 - cam.cx) * DEPTH as f64 / cam.fx) as f32;
    let y = ((row as f64 + 0.5 - cam.cy) * DEPTH as f64 / cam.fy) as f32;
    Point3D::valid(x, y, DEPTH)
}

fn half_resolution(image: &ImagePlane) -> ImagePlane {
    ImagePlane::from_fn(image.cols() / 2, image.rows() / 2, |row, col| {
        let (r, c) = (row * 2, col * 2);
        0.25 * (image.at(r, c) + image.at(r, c + 1) + image.at(r + 1, c) + image.at(r + 1, c + 1))
    })
}

fn frame_with(pose: SE3, image: ImagePlane, cloud: Vec<Point3D>) -> Arc<dyn FrameSource> {
    let level1 = half_resolution(&image);
    Frame::new(0, pose, shared_camera(), vec![image, level1], cloud).into_shared()
}

fn per_pixel_cloud(cam: &PinholeModel) -> PointCloud {
    (0..cam.height)
        .flat_map(|row| (0..cam.width).map(move |col| (row, col)))
        .map(|(row, col)| pixel_point(cam, row, col))
        .collect()
}

/// Random texture with a point behind every pixel.
pub fn dense_frame(pose: SE3, seed: u64) -> Arc<dyn FrameSource> {
    let cam = pinhole();
    let mut rng = StdRng::seed_from_u64(seed);
    let image = ImagePlane::from_fn(WIDTH, HEIGHT, |_, _| rng.gen_range(0.0..1.0));
    frame_with(pose, image, per_pixel_cloud(&cam))
}

/// Constant image: every bucket falls below the gradient threshold.
pub fn flat_frame(pose: SE3) -> Arc<dyn FrameSource> {
    let cam = pinhole();
    frame_with(pose, ImagePlane::from_fn(WIDTH, HEIGHT, |_, _| 0.5), per_pixel_cloud(&cam))
}

/// Cloud restricted to the pixels inside the 4 px sampling margin.
pub fn interior_frame(pose: SE3) -> Arc<dyn FrameSource> {
    let cam = pinhole();
    let mut rng = StdRng::seed_from_u64(11);
    let image = ImagePlane::from_fn(WIDTH, HEIGHT, |_, _| rng.gen_range(0.0..1.0));
    let cloud = (4..HEIGHT - 4)
        .flat_map(|row| (4..WIDTH - 4).map(move |col| (row, col)))
        .map(|(row, col)| pixel_point(&cam, row, col))
        .collect();
    frame_with(pose, image, cloud)
}

/// Returns one keypoint per image row, counting calls.
#[derive(Default)]
pub struct CountingExtractor {
    pub calls: AtomicUsize,
}

impl FeatureAdapter for CountingExtractor {
    fn extract(&self, image: &ImagePlane, _mask: Option<&ImagePlane>) -> Result<FeatureSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Widen the race window for concurrent callers.
        thread::sleep(Duration::from_millis(20));

        let mut features = FeatureSet::default();
        for row in 0..image.rows() {
            features.keypoints.push(KeyPoint {
                x: 0.0,
                y: row as f32,
                octave: 0,
                angle: -1.0,
                response: 1.0,
            });
            let mut d: Descriptor = [0; DESCRIPTOR_BYTES];
            d[0] = (row % 4) as u8;
            features.descriptors.push(d);
        }
        Ok(features)
    }
}

#[derive(Default)]
struct Gate {
    started: bool,
    open: bool,
}

/// Blocks inside `extract` until [`release`](Self::release) is called.
#[derive(Default)]
pub struct GatedExtractor {
    gate: Mutex<Gate>,
    signal: Condvar,
}

impl GatedExtractor {
    pub fn wait_started(&self) {
        let mut gate = self.gate.lock();
        while !gate.started {
            self.signal.wait(&mut gate);
        }
    }

    pub fn release(&self) {
        self.gate.lock().open = true;
        self.signal.notify_all();
    }
}

impl FeatureAdapter for GatedExtractor {
    fn extract(&self, _image: &ImagePlane, _mask: Option<&ImagePlane>) -> Result<FeatureSet> {
        let mut gate = self.gate.lock();
        gate.started = true;
        self.signal.notify_all();
        while !gate.open {
            self.signal.wait(&mut gate);
        }

        Ok(FeatureSet {
            keypoints: vec![KeyPoint {
                x: 0.0,
                y: 0.0,
                octave: 0,
                angle: -1.0,
                response: 1.0,
            }],
            descriptors: vec![[0; DESCRIPTOR_BYTES]],
        })
    }
}

pub struct FailingExtractor;

impl FeatureAdapter for FailingExtractor {
    fn extract(&self, _image: &ImagePlane, _mask: Option<&ImagePlane>) -> Result<FeatureSet> {
        Err(KeyframeError::FeatureExtraction("detector unavailable".to_string()))
    }
}

/// Maps each descriptor to the word given by its first byte.
#[derive(Default)]
pub struct CountingVocabulary {
    pub calls: AtomicUsize,
    pub last_levels_up: Mutex<Option<usize>>,
}

impl VocabularyAdapter for CountingVocabulary {
    fn transform(&self, descriptors: &[Descriptor], levels_up: usize) -> (BowVector, FeatureVector) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_levels_up.lock() = Some(levels_up);

        let mut bow = BowVector::new();
        let mut fv = FeatureVector::new();
        for (i, d) in descriptors.iter().enumerate() {
            let word = d[0] as u32;
            *bow.entry(word).or_insert(0.0) += 1.0;
            fv.entry(word).or_default().push(i);
        }
        (bow, fv)
    }
}
