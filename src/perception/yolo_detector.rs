/// ONNX YOLOv8 inference over captured window frames.
///
/// Loads a YOLOv8 ONNX export and maps its classes onto arbiter categories.
/// Falls back to `UnloadedDetector` if the model file is missing.
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::{Array4, ArrayViewD};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;

use crate::errors::{GrabError, GrabResult};
use crate::perception::classes::CategoryMap;
use crate::perception::traits::Detector;
use crate::perception::types::{BBox, Detection, Frame};

/// Letterbox grey, as used by the YOLO training pipeline.
const PAD_GREY: u8 = 114;

/// Candidate box in frame pixels, before NMS and category mapping.
#[derive(Debug, Clone)]
struct Candidate {
    bbox: [f32; 4],
    score: f32,
    class_id: usize,
}

/// How a frame was fitted into the square model input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
    frame_w: f32,
    frame_h: f32,
}

impl Letterbox {
    fn fit(frame_w: u32, frame_h: u32, input: u32) -> Self {
        let (fw, fh) = (frame_w as f32, frame_h as f32);
        let scale = (input as f32 / fw).min(input as f32 / fh);
        let scaled_w = ((fw * scale).round() as u32).clamp(1, input);
        let scaled_h = ((fh * scale).round() as u32).clamp(1, input);
        Self {
            scale,
            pad_x: (input - scaled_w) as f32 / 2.0,
            pad_y: (input - scaled_h) as f32 / 2.0,
            frame_w: fw,
            frame_h: fh,
        }
    }

    fn scaled_size(&self) -> (u32, u32) {
        (
            ((self.frame_w * self.scale).round() as u32).max(1),
            ((self.frame_h * self.scale).round() as u32).max(1),
        )
    }

    /// Model-space centre box back to clamped frame-space corners.
    fn unmap(&self, cx: f32, cy: f32, w: f32, h: f32) -> [f32; 4] {
        let x = |v: f32| ((v - self.pad_x) / self.scale).clamp(0.0, self.frame_w);
        let y = |v: f32| ((v - self.pad_y) / self.scale).clamp(0.0, self.frame_h);
        [x(cx - w / 2.0), y(cy - h / 2.0), x(cx + w / 2.0), y(cy + h / 2.0)]
    }
}

struct YoloModel {
    session: Mutex<Session>,
    input_size: u32,
    iou_threshold: f32,
    class_names: Vec<String>,
    categories: CategoryMap,
}

/// Handle to a loaded model. Cloning shares the same session.
#[derive(Clone)]
pub struct YoloDetector {
    model: Arc<YoloModel>,
}

impl YoloDetector {
    /// `None` if the model file does not exist or cannot be loaded.
    pub fn try_new(
        model_path: &str,
        input_size: u32,
        iou_threshold: f32,
        class_names: Vec<String>,
        categories: CategoryMap,
    ) -> Option<Self> {
        if !Path::new(model_path).exists() {
            tracing::warn!(path = %model_path, "YOLO model not found, detection disabled");
            return None;
        }
        let session = match load_session(model_path) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(path = %model_path, error = %e, "failed to load YOLO model");
                return None;
            }
        };
        tracing::info!(path = %model_path, classes = class_names.len(), input_size, "YOLO detector loaded");
        Some(Self {
            model: Arc::new(YoloModel {
                session: Mutex::new(session),
                input_size,
                iou_threshold,
                class_names,
                categories,
            }),
        })
    }
}

fn ort_err(stage: &str, e: impl std::fmt::Display) -> GrabError {
    GrabError::Detection(format!("ort {stage}: {e}"))
}

fn load_session(model_path: &str) -> GrabResult<Session> {
    Session::builder()
        .map_err(|e| ort_err("session builder", e))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| ort_err("opt-level", e))?
        .commit_from_file(model_path)
        .map_err(|e| ort_err("load model", e))
}

#[async_trait]
impl Detector for YoloDetector {
    async fn detect(&self, frame: &Frame, confidence_threshold: f32) -> GrabResult<Vec<Detection>> {
        let model = self.model.clone();
        let frame = frame.clone();
        // CPU-bound; a panic here surfaces as a join error.
        tokio::task::spawn_blocking(move || model.infer(&frame, confidence_threshold))
            .await
            .map_err(|e| GrabError::Detection(format!("inference task: {e}")))?
    }
}

impl YoloModel {
    fn infer(&self, frame: &Frame, threshold: f32) -> GrabResult<Vec<Detection>> {
        let letterbox = Letterbox::fit(frame.width(), frame.height(), self.input_size);
        let input =
            Tensor::from_array(self.to_input(frame.image(), &letterbox)).map_err(|e| ort_err("tensor", e))?;

        let output = {
            let mut session = self
                .session
                .lock()
                .map_err(|_| GrabError::Detection("ort session poisoned".into()))?;
            let outputs = session
                .run(ort::inputs![input])
                .map_err(|e| ort_err("run", e))?;
            outputs[0]
                .try_extract_array::<f32>()
                .map_err(|e| ort_err("extract", e))?
                .to_owned()
        };

        let candidates = decode(&output.view(), &letterbox, threshold)?;
        let kept = suppress(candidates, self.iou_threshold);
        Ok(kept.into_iter().map(|c| self.to_detection(c)).collect())
    }

    /// Letterboxed, normalised NCHW tensor of the frame.
    fn to_input(&self, img: &image::RgbaImage, letterbox: &Letterbox) -> Array4<f32> {
        let size = self.input_size;
        let (w, h) = letterbox.scaled_size();
        let resized = image::imageops::resize(img, w.min(size), h.min(size), image::imageops::FilterType::CatmullRom);
        let mut canvas = image::RgbaImage::from_pixel(size, size, image::Rgba([PAD_GREY, PAD_GREY, PAD_GREY, 255]));
        image::imageops::overlay(
            &mut canvas,
            &resized,
            letterbox.pad_x.round() as i64,
            letterbox.pad_y.round() as i64,
        );

        let mut tensor = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
        for (x, y, p) in canvas.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = f32::from(p[c]) / 255.0;
            }
        }
        tensor
    }

    fn to_detection(&self, c: Candidate) -> Detection {
        let class_name = self
            .class_names
            .get(c.class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", c.class_id));
        let [x1, y1, x2, y2] = c.bbox;
        Detection {
            bbox: BBox::new(x1 as i32, y1 as i32, x2 as i32, y2 as i32),
            confidence: c.score,
            category: self.categories.category_of(&class_name),
            class_name,
        }
    }
}

/// YOLOv8 head: `[1, 4 + classes, proposals]`, centre boxes then scores.
fn decode(output: &ArrayViewD<f32>, letterbox: &Letterbox, threshold: f32) -> GrabResult<Vec<Candidate>> {
    let shape = output.shape();
    if shape.len() != 3 || shape[1] < 5 {
        return Err(GrabError::Detection(format!("unexpected output shape: {shape:?}")));
    }
    let classes = shape[1] - 4;

    let candidates = (0..shape[2])
        .filter_map(|i| {
            let (class_id, score) = (0..classes)
                .map(|c| (c, output[[0, 4 + c, i]]))
                .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
            if score < threshold {
                return None;
            }
            let bbox = letterbox.unmap(
                output[[0, 0, i]],
                output[[0, 1, i]],
                output[[0, 2, i]],
                output[[0, 3, i]],
            );
            Some(Candidate { bbox, score, class_id })
        })
        .collect();
    Ok(candidates)
}

/// Greedy per-class non-maximum suppression, best score first.
fn suppress(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    let mut kept: Vec<Candidate> = Vec::new();
    for c in candidates {
        let overlaps = kept
            .iter()
            .any(|k| k.class_id == c.class_id && iou(&k.bbox, &c.bbox) > iou_threshold);
        if !overlaps {
            kept.push(c);
        }
    }
    kept
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = inter_w * inter_h;
    let union = (a[2] - a[0]) * (a[3] - a[1]) + (b[2] - b[0]) * (b[3] - b[1]) - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Stand-in used when no model could be loaded. Monitoring refuses to start
/// while this is installed.
pub struct UnloadedDetector;

#[async_trait]
impl Detector for UnloadedDetector {
    async fn detect(&self, _frame: &Frame, _confidence_threshold: f32) -> GrabResult<Vec<Detection>> {
        Err(GrabError::Detection("no model loaded".into()))
    }

    fn is_loaded(&self) -> bool {
        false
    }
}
