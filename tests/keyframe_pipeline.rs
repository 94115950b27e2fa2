//! End-to-end: calibration and vocabulary from disk, dense frames in,
//! registered keyframes with covisibility and place recognition out.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use approx::assert_relative_eq;
use nalgebra::{UnitQuaternion, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use dvo_keyframe::features::{KeyPoint, DESCRIPTOR_BYTES};
use dvo_keyframe::vocabulary::VocabularyError;
use dvo_keyframe::{
    CameraModel, FeatureAdapter, FeatureSet, Frame, FrameSource, ImagePlane, KeyframeConfig, KeyframeError,
    KeyframeMap, KeyframeRecord, OrbVocabulary, PinholeModel, Point3D, Result, SE3,
};

fn write_temp(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", contents).unwrap();
    file
}

fn load_camera() -> Arc<dyn CameraModel> {
    let file = write_temp("resolution: [64, 48]\nintrinsics: [50.0, 50.0, 32.0, 24.0]\n");
    Arc::new(PinholeModel::from_euroc_yaml(file.path()).unwrap())
}

fn node_line(parent: u32, leaf: bool, fill: u8, weight: f64) -> String {
    let bytes: Vec<String> = (0..DESCRIPTOR_BYTES).map(|_| fill.to_string()).collect();
    format!("{} {} {} {}", parent, if leaf { 1 } else { 0 }, bytes.join(" "), weight)
}

fn load_vocabulary_from(path: &Path) -> Result<Arc<OrbVocabulary>> {
    Ok(Arc::new(OrbVocabulary::load_from_text(path)?))
}

fn load_vocabulary() -> Arc<OrbVocabulary> {
    let text = [
        "2 2 0 0".to_string(),
        node_line(0, false, 0x00, 0.0),
        node_line(0, false, 0xFF, 0.0),
        node_line(1, true, 0x00, 1.0),
        node_line(1, true, 0x0F, 1.0),
        node_line(2, true, 0xF0, 2.0),
        node_line(2, true, 0xFF, 2.0),
    ]
    .join("\n");
    let file = write_temp(&text);
    load_vocabulary_from(file.path()).unwrap()
}

/// Textured plane 2 m in front of the camera, one point per pixel.
fn dense_frame(camera: &Arc<dyn CameraModel>, pose: SE3, seed: u64) -> Arc<dyn FrameSource> {
    let pinhole = *camera.pinhole().unwrap();
    let mut rng = StdRng::seed_from_u64(seed);
    let image = ImagePlane::from_fn(pinhole.width, pinhole.height, |_, _| rng.gen_range(0.0..1.0));

    let depth = 2.0;
    let mut cloud = Vec::with_capacity(pinhole.width * pinhole.height);
    for row in 0..pinhole.height {
        for col in 0..pinhole.width {
            let x = (col as f64 + 0.5 - pinhole.cx) * depth / pinhole.fx;
            let y = (row as f64 + 0.5 - pinhole.cy) * depth / pinhole.fy;
            cloud.push(Point3D::valid(x as f32, y as f32, depth as f32));
        }
    }

    Frame::new(seed, pose, Arc::clone(camera), vec![image], cloud).into_shared()
}

fn translated(x: f64) -> SE3 {
    SE3 {
        rotation: UnitQuaternion::identity(),
        translation: Vector3::new(x, 0.0, 0.0),
    }
}

/// Dark rows produce 0x00 descriptors, bright rows 0xFF.
struct RowExtractor;

impl FeatureAdapter for RowExtractor {
    fn extract(&self, image: &ImagePlane, _mask: Option<&ImagePlane>) -> Result<FeatureSet> {
        let mut features = FeatureSet::default();
        for row in 0..image.rows() {
            let fill = if row % 2 == 0 { 0x00 } else { 0xFF };
            features.keypoints.push(KeyPoint {
                x: 0.0,
                y: row as f32,
                octave: 0,
                angle: -1.0,
                response: 1.0,
            });
            features.descriptors.push([fill; DESCRIPTOR_BYTES]);
        }
        Ok(features)
    }
}

#[test]
fn test_keyframe_pipeline() {
    let camera = load_camera();
    let vocabulary = load_vocabulary();
    let config_file = write_temp("sampling:\n  bucket_size: 10\nbow:\n  levels_up: 1\n");
    let config = KeyframeConfig::from_yaml_file(config_file.path()).unwrap();

    let mut map = KeyframeMap::new();

    // Built outside the map, then admitted.
    let frame_a = dense_frame(&camera, SE3::identity(), 1);
    let cloud_len = frame_a.pointcloud().len();
    let record = KeyframeRecord::new(frame_a, Arc::clone(&camera), vocabulary.clone(), config.clone()).unwrap();
    assert!(record.id().is_provisional());
    assert!(record.num_points() <= cloud_len / 10);
    let a = map.admit(record).unwrap();

    let b = map
        .create_keyframe(
            dense_frame(&camera, translated(0.2), 2),
            Arc::clone(&camera),
            vocabulary.clone(),
            config.clone(),
        )
        .unwrap();
    assert!(b > a);

    let kf_a = Arc::clone(map.get(a).unwrap());
    let kf_b = Arc::clone(map.get(b).unwrap());
    assert_eq!(kf_a.timestamp_ns(), 1);

    assert_relative_eq!(kf_a.visible_ratio(&kf_a).unwrap(), 1.0);
    let ab = kf_a.visible_ratio(&kf_b).unwrap();
    assert!(ab > 0.3 && ab < 1.0);

    let covisible = map.connect(a).unwrap();
    assert_eq!(covisible.len(), 1);
    assert_eq!(covisible[0].keyframe_id, b);
    assert_relative_eq!(covisible[0].ratio, ab);
    assert!(!kf_a.is_first_connection());
    assert!(kf_b.is_first_connection());

    let bow_a = kf_a.ensure_bag_of_words(&RowExtractor).unwrap();
    kf_b.ensure_bag_of_words(&RowExtractor).unwrap();
    assert_relative_eq!(bow_a.bow_vector.values().sum::<f64>(), 1.0);

    let candidates = map.detect_candidates(&bow_a.bow_vector, Some(a), 5);
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].keyframe_id, b);
    assert_relative_eq!(candidates[0].score, 1.0);

    map.remove(a).unwrap();
    assert!(matches!(map.covisible_keyframes(a), Err(KeyframeError::UnknownKeyframe(_))));
    // The record outlives its removal from the map.
    assert_eq!(kf_a.visible_ratio(&kf_b).unwrap(), ab);
}

#[test]
fn test_sparse_cloud_is_rejected() {
    let camera = load_camera();
    let vocabulary = load_vocabulary();

    // A single point well inside the image: nothing lies outside the margin.
    let frame = Frame::new(
        0,
        SE3::identity(),
        Arc::clone(&camera),
        vec![ImagePlane::new(64, 48)],
        vec![Point3D::valid(0.0, 0.0, 2.0)],
    )
    .into_shared();

    let result = KeyframeRecord::new(frame, camera, vocabulary, KeyframeConfig::default());
    assert!(matches!(result, Err(KeyframeError::CloudNotDense { total: 1 })));
}

#[test]
fn test_vocabulary_errors_convert_to_keyframe_errors() {
    let missing = load_vocabulary_from(Path::new("/nonexistent/ORBvoc.txt"));
    assert!(matches!(missing, Err(KeyframeError::Vocabulary(VocabularyError::Io(_)))));

    let garbage = write_temp("not a vocabulary\n");
    let parsed = load_vocabulary_from(garbage.path());
    assert!(matches!(parsed, Err(KeyframeError::Vocabulary(VocabularyError::Parse(_)))));
}
