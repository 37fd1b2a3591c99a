pub mod classes;
pub mod engine;
pub mod pipeline;

use std::path::Path;

use anyhow::Result;

/// One object found in an image.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_name: String,
    pub confidence: f32,
    /// `[x1, y1, x2, y2]` in source-image pixels.
    pub bbox: [f32; 4],
}

pub trait Detector {
    fn detect(&self, image_path: &Path) -> Result<Vec<Detection>>;
}
