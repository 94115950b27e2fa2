//! ORB extraction through OpenCV.

use opencv::core::{KeyPoint as CvKeyPoint, Mat, Ptr, Scalar, Vector, CV_8UC1};
use opencv::features2d;
use opencv::prelude::*;
use parking_lot::Mutex;

use crate::error::{KeyframeError, Result};
use crate::frame::ImagePlane;

use super::{Descriptor, FeatureAdapter, FeatureSet, KeyPoint, DESCRIPTOR_BYTES};

/// ORB detector configured like the keyframe front end: 2000 features,
/// scale factor 1.2 over 8 levels, FAST threshold 20.
pub struct OrbExtractor {
    orb: Mutex<Ptr<features2d::ORB>>,
}

impl OrbExtractor {
    pub fn new(n_features: i32) -> Result<Self> {
        let orb = features2d::ORB::create(
            n_features,
            1.2,
            8,
            31,
            0,
            2,
            features2d::ORB_ScoreType::HARRIS_SCORE,
            31,
            20,
        )
        .map_err(cv_error)?;
        Ok(Self {
            orb: Mutex::new(orb),
        })
    }
}

impl FeatureAdapter for OrbExtractor {
    fn extract(&self, image: &ImagePlane, mask: Option<&ImagePlane>) -> Result<FeatureSet> {
        let gray = plane_to_mat(image)?;
        let mask = match mask {
            Some(m) => plane_to_mask(m)?,
            None => Mat::default(),
        };

        let mut cv_keypoints = Vector::<CvKeyPoint>::new();
        let mut cv_descriptors = Mat::default();
        self.orb
            .lock()
            .detect_and_compute(&gray, &mask, &mut cv_keypoints, &mut cv_descriptors, false)
            .map_err(cv_error)?;

        let keypoints = cv_keypoints
            .iter()
            .map(|kp| KeyPoint {
                x: kp.pt().x,
                y: kp.pt().y,
                octave: kp.octave(),
                angle: kp.angle(),
                response: kp.response(),
            })
            .collect();

        let mut descriptors = Vec::with_capacity(cv_descriptors.rows().max(0) as usize);
        let cols = cv_descriptors.cols().min(DESCRIPTOR_BYTES as i32);
        for row in 0..cv_descriptors.rows() {
            let mut desc: Descriptor = [0u8; DESCRIPTOR_BYTES];
            for col in 0..cols {
                desc[col as usize] = *cv_descriptors.at_2d::<u8>(row, col).map_err(cv_error)?;
            }
            descriptors.push(desc);
        }

        Ok(FeatureSet {
            keypoints,
            descriptors,
        })
    }
}

fn plane_to_mat(image: &ImagePlane) -> Result<Mat> {
    let mut mat = Mat::new_rows_cols_with_default(
        image.rows() as i32,
        image.cols() as i32,
        CV_8UC1,
        Scalar::all(0.0),
    )
    .map_err(cv_error)?;

    let bytes = image.to_u8();
    for row in 0..image.rows() {
        for col in 0..image.cols() {
            *mat.at_2d_mut::<u8>(row as i32, col as i32).map_err(cv_error)? =
                bytes[row * image.cols() + col];
        }
    }
    Ok(mat)
}

fn plane_to_mask(mask: &ImagePlane) -> Result<Mat> {
    let mut mat = Mat::new_rows_cols_with_default(
        mask.rows() as i32,
        mask.cols() as i32,
        CV_8UC1,
        Scalar::all(0.0),
    )
    .map_err(cv_error)?;

    for row in 0..mask.rows() {
        for col in 0..mask.cols() {
            if mask.at(row, col) != 0.0 {
                *mat.at_2d_mut::<u8>(row as i32, col as i32).map_err(cv_error)? = 255;
            }
        }
    }
    Ok(mat)
}

fn cv_error(e: opencv::Error) -> KeyframeError {
    KeyframeError::FeatureExtraction(e.to_string())
}
