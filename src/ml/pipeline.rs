use ndarray::{Array, Array4, ArrayView2};
use image::{DynamicImage, GenericImageView};
use anyhow::Result;

use crate::ml::classes::COCO_CLASSES;
use crate::ml::Detection;

/// Square input edge expected by YOLOv8 exports.
pub const INPUT_SIZE: u32 = 640;

/// Boxes of the same class overlapping more than this are suppressed.
pub const IOU_THRESHOLD: f32 = 0.7;

pub fn normalize_for_yolo(image: &DynamicImage) -> Result<Array4<f32>> {
    // Plain resize, RGB scaled to [0, 1], NCHW.
    let resized = image.resize_exact(INPUT_SIZE, INPUT_SIZE, image::imageops::FilterType::Triangle);
    let size = INPUT_SIZE as usize;
    let mut array = Array::zeros((1, 3, size, size));

    for (x, y, pixel) in resized.pixels() {
        let r = pixel[0] as f32 / 255.0;
        let g = pixel[1] as f32 / 255.0;
        let b = pixel[2] as f32 / 255.0;

        array[[0, 0, y as usize, x as usize]] = r;
        array[[0, 1, y as usize, x as usize]] = g;
        array[[0, 2, y as usize, x as usize]] = b;
    }

    Ok(array)
}

/// Decodes a `[4 + classes, anchors]` YOLOv8 head into detections, highest
/// confidence first, with per-class non-maximum suppression applied.
/// `scale_x`/`scale_y` map model-space coordinates back to the source image.
pub fn decode_output(
    output: ArrayView2<'_, f32>,
    scale_x: f32,
    scale_y: f32,
    min_confidence: f32,
) -> Vec<Detection> {
    if output.nrows() <= 4 {
        return Vec::new();
    }

    let mut candidates: Vec<(usize, f32, [f32; 4])> = Vec::new();
    for column in output.columns() {
        let (class_idx, confidence) = column
            .iter()
            .skip(4)
            .copied()
            .enumerate()
            .fold((0, f32::MIN), |best, (idx, score)| if score > best.1 { (idx, score) } else { best });

        if confidence < min_confidence {
            continue;
        }

        let (cx, cy, w, h) = (column[0], column[1], column[2], column[3]);
        let bbox = [
            (cx - w / 2.0) * scale_x,
            (cy - h / 2.0) * scale_y,
            (cx + w / 2.0) * scale_x,
            (cy + h / 2.0) * scale_y,
        ];
        candidates.push((class_idx, confidence, bbox));
    }

    candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut kept: Vec<(usize, f32, [f32; 4])> = Vec::new();
    for candidate in candidates {
        let suppressed = kept
            .iter()
            .any(|k| k.0 == candidate.0 && iou(&k.2, &candidate.2) > IOU_THRESHOLD);
        if !suppressed {
            kept.push(candidate);
        }
    }

    kept.into_iter()
        .map(|(class_idx, confidence, bbox)| Detection {
            class_name: class_name(class_idx),
            confidence,
            bbox,
        })
        .collect()
}

fn class_name(idx: usize) -> String {
    COCO_CLASSES
        .get(idx)
        .map(|name| name.to_string())
        .unwrap_or_else(|| format!("class_{}", idx))
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let iy = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let intersection = ix * iy;
    let area = |r: &[f32; 4]| (r[2] - r[0]).max(0.0) * (r[3] - r[1]).max(0.0);
    let union = area(a) + area(b) - intersection;
    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}
