//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes an RGB frame to 640×640, decodes the anchor-free score, box
//! and keypoint heads of the three strides, and suppresses overlaps with NMS.

use facematch_core::BoundingBox;
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: u32 = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;
/// Score, box and keypoint heads for each of the three strides.
const SCRFD_MIN_OUTPUTS: usize = 9;

/// Output positions of the (score, box, keypoint) heads of one stride.
type StrideOutputs = (usize, usize, usize);

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Mapping from letterboxed model space back to frame pixels.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn to_frame(self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

pub struct FaceDetector {
    session: Session,
    confidence_threshold: f32,
    heads: [StrideOutputs; 3],
}

impl FaceDetector {
    pub fn load(model_path: &Path, confidence_threshold: f32) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        tracing::info!(
            path = %model_path.display(),
            outputs = ?names,
            confidence_threshold,
            "loaded SCRFD model"
        );

        if names.len() < SCRFD_MIN_OUTPUTS {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model needs {SCRFD_MIN_OUTPUTS} outputs (score/box/keypoints per stride), got {}",
                names.len()
            )));
        }

        let heads = output_heads(&names);
        tracing::debug!(?heads, "SCRFD output mapping");

        Ok(Self {
            session,
            confidence_threshold,
            heads,
        })
    }

    /// Detect faces in an RGB frame, most confident first.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        let (input, letterbox) = preprocess(image, SCRFD_INPUT_SIZE);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (&stride, &(score_at, box_at, kps_at)) in SCRFD_STRIDES.iter().zip(&self.heads) {
            let (_, scores) = outputs[score_at]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, boxes) = outputs[box_at]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("boxes stride {stride}: {e}")))?;
            let (_, keypoints) = outputs[kps_at]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("keypoints stride {stride}: {e}")))?;

            candidates.extend(decode_stride(
                StrideHeads {
                    scores,
                    boxes,
                    keypoints,
                },
                stride,
                SCRFD_INPUT_SIZE as usize,
                letterbox,
                self.confidence_threshold,
            ));
        }

        let faces = nms(candidates, SCRFD_NMS_THRESHOLD);
        tracing::debug!(faces = faces.len(), "SCRFD detection");
        Ok(faces)
    }
}

/// Letterbox `image` into a `size`×`size` NCHW tensor.
///
/// Padding is filled with the mean, which normalises to 0.0.
fn preprocess(image: &RgbImage, size: u32) -> (Array4<f32>, Letterbox) {
    let (width, height) = image.dimensions();
    let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
    let new_w = ((width as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((height as f32 * scale).round() as u32).clamp(1, size);
    let pad_x = (size - new_w) / 2;
    let pad_y = (size - new_h) / 2;

    let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let side = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let tx = (x + pad_x) as usize;
        let ty = (y + pad_y) as usize;
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = (pixel.0[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }

    let letterbox = Letterbox {
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
    };
    (tensor, letterbox)
}

/// Map each stride to its (score, box, keypoint) output positions.
///
/// Exports that name their heads `score_8`, `bbox_8`, `kps_8`, ... are
/// mapped by name; anything else is assumed to use the reference export
/// order: scores 8/16/32, then boxes, then keypoints.
fn output_heads(names: &[String]) -> [StrideOutputs; 3] {
    let position = |head: &str, stride: usize| {
        let wanted = format!("{head}_{stride}");
        names.iter().position(|n| *n == wanted)
    };
    let named: Option<Vec<StrideOutputs>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| {
            Some((
                position("score", stride)?,
                position("bbox", stride)?,
                position("kps", stride)?,
            ))
        })
        .collect();

    match named.as_deref() {
        Some(&[s8, s16, s32]) => [s8, s16, s32],
        _ => {
            tracing::debug!(?names, "SCRFD output names not recognised, using export order");
            [(0, 3, 6), (1, 4, 7), (2, 5, 8)]
        }
    }
}

/// Raw head tensors of one stride.
struct StrideHeads<'a> {
    scores: &'a [f32],
    boxes: &'a [f32],
    keypoints: &'a [f32],
}

/// Decode the score, distance and keypoint heads of one stride into
/// frame-space boxes.
fn decode_stride(
    heads: StrideHeads<'_>,
    stride: usize,
    input_size: usize,
    letterbox: Letterbox,
    threshold: f32,
) -> Vec<BoundingBox> {
    let grid = input_size / stride;
    let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let step = stride as f32;
    let StrideHeads {
        scores,
        boxes,
        keypoints,
    } = heads;

    (0..anchors.min(scores.len()))
        .filter(|&idx| scores[idx] >= threshold)
        .filter_map(|idx| {
            let d = boxes.get(idx * 4..idx * 4 + 4)?;
            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let cx = (cell % grid) as f32 * step;
            let cy = (cell / grid) as f32 * step;

            let (x1, y1) = letterbox.to_frame(cx - d[0] * step, cy - d[1] * step);
            let (x2, y2) = letterbox.to_frame(cx + d[2] * step, cy + d[3] * step);
            let landmarks = keypoints.get(idx * 10..idx * 10 + 10).map(|k| {
                std::array::from_fn(|i| letterbox.to_frame(cx + k[2 * i] * step, cy + k[2 * i + 1] * step))
            });
            Some(BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: scores[idx],
                landmarks,
            })
        })
        .collect()
}

/// Greedy non-maximum suppression; output is sorted by confidence.
fn nms(mut candidates: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<BoundingBox> = Vec::new();
    for candidate in candidates {
        if kept.iter().all(|k| iou(k, &candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let overlap_w = ((a.x + a.width).min(b.x + b.width) - a.x.max(b.x)).max(0.0);
    let overlap_h = ((a.y + a.height).min(b.y + b.height) - a.y.max(b.y)).max(0.0);
    let inter = overlap_w * overlap_h;
    let union = a.width * a.height + b.width * b.height - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
