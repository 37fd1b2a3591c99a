use std::fs::{self, File};
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use image::GenericImageView;
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{s, Ix3};
use ort::session::Session;
use tracing::info;

use crate::ml::pipeline::{decode_output, normalize_for_yolo, INPUT_SIZE};
use crate::ml::{Detection, Detector};

/// YOLOv8 ONNX export running on ONNX Runtime.
pub struct YoloDetector {
    session: Session,
    min_confidence: f32,
}

impl YoloDetector {
    pub fn load(model_path: &Path, min_confidence: f32) -> Result<Self> {
        // Errors only when an environment was already committed.
        let _ = ort::init()
            .with_name("channel-lake-detection")
            .commit();

        let session = Session::builder()?
            .with_intra_threads(1)?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load detection model {:?}", model_path))?;

        info!("Detection model loaded from {:?}", model_path);
        Ok(Self {
            session,
            min_confidence,
        })
    }
}

impl Detector for YoloDetector {
    fn detect(&self, image_path: &Path) -> Result<Vec<Detection>> {
        let image = image::open(image_path)
            .with_context(|| format!("Failed to decode image {:?}", image_path))?;
        let (width, height) = image.dimensions();
        let input = normalize_for_yolo(&image)?;

        let outputs = self.session.run(ort::inputs!["images" => input.view()]?)?;
        let output = outputs["output0"]
            .try_extract_tensor::<f32>()?
            .into_dimensionality::<Ix3>()
            .context("Unexpected detection output shape")?;

        Ok(decode_output(
            output.slice(s![0, .., ..]),
            width as f32 / INPUT_SIZE as f32,
            height as f32 / INPUT_SIZE as f32,
            self.min_confidence,
        ))
    }
}

/// Makes sure the weights file exists, downloading it from `url` only when absent.
pub fn ensure_weights(model_path: &Path, url: Option<&str>) -> Result<()> {
    if model_path.exists() {
        info!("Model weights already exist at {:?}", model_path);
        return Ok(());
    }

    let url = url.ok_or_else(|| {
        anyhow!(
            "Model weights not found at {:?} and YOLO_MODEL_URL is not set. \
             Provide a YOLOv8 ONNX export there (`yolo export model=yolov8m.pt format=onnx`) \
             or point YOLO_MODEL_URL at one",
            model_path
        )
    })?;

    if let Some(parent) = model_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create model directory {:?}", parent))?;
    }

    info!("Downloading model weights from {} to {:?}", url, model_path);
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(30 * 60))
        .build()?;
    let mut response = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .with_context(|| format!("Failed to download model weights from {}", url))?;

    let progress = match response.content_length() {
        Some(len) => ProgressBar::new(len).with_style(
            ProgressStyle::with_template("{bar:40} {bytes}/{total_bytes} ({eta})")?,
        ),
        None => ProgressBar::new_spinner(),
    };

    let partial = model_path.with_extension("part");
    let file = File::create(&partial).with_context(|| format!("Failed to create {:?}", partial))?;
    let mut writer = progress.wrap_write(file);
    if let Err(e) = response.copy_to(&mut writer) {
        drop(writer);
        let _ = fs::remove_file(&partial);
        return Err(e).context("Model weights download interrupted");
    }
    progress.finish_and_clear();
    drop(writer);

    fs::rename(&partial, model_path)
        .with_context(|| format!("Failed to move weights into {:?}", model_path))?;
    info!("Model weights downloaded successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existing_weights_skip_download() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("yolov8m.onnx");
        fs::write(&path, b"weights")?;

        ensure_weights(&path, None)?;
        assert_eq!(fs::read(&path)?, b"weights");
        Ok(())
    }

    #[test]
    fn test_missing_weights_without_url() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let err = ensure_weights(&dir.path().join("models/yolov8m.onnx"), None).unwrap_err();
        assert!(err.to_string().contains("YOLO_MODEL_URL"));
        assert!(err.to_string().contains("format=onnx"));
        Ok(())
    }
}
