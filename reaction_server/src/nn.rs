//! Image classification with exported Teachable Machine models.
//!
use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, bail, Context, Result};
use common::protocol::{ClassProbability, Prediction};
use image::{imageops::FilterType, RgbImage};
use serde::Deserialize;
use tract_onnx::prelude::*;

use crate::utils::download_file;

type NnModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// File holding the network inside a model directory.
pub const MODEL_FILE: &str = "model.onnx";

/// File holding labels and input size inside a model directory.
pub const METADATA_FILE: &str = "metadata.json";

const DEFAULT_IMAGE_SIZE: u32 = 224;

/// Model that assigns a probability to each of a fixed set of classes.
pub trait Classifier: Send + Sync + 'static {
    fn class_count(&self) -> usize;

    fn predict(&self, frame: &RgbImage) -> Result<Prediction>;
}

/// Where to find a model directory.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ModelLocation {
    Local(PathBuf),
    /// Base URL, the model files are appended to it.
    Remote(String),
}

impl ModelLocation {
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            let mut url = location.to_owned();
            if !url.ends_with('/') {
                url.push('/');
            }
            ModelLocation::Remote(url)
        } else {
            ModelLocation::Local(PathBuf::from(location))
        }
    }

    /// Directory remote models are cached in.
    fn cache_dir(url: &str) -> Result<PathBuf> {
        let base = dirs::cache_dir().ok_or_else(|| anyhow!("no cache directory available"))?;
        let key: String = url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();

        Ok(base.join("reaction_server").join(key.trim_matches('_')))
    }

    /// Local directory with the model files, downloading them first if needed.
    pub async fn fetch(&self) -> Result<PathBuf> {
        match self {
            ModelLocation::Local(dir) => Ok(dir.clone()),
            ModelLocation::Remote(url) => {
                let dir = Self::cache_dir(url)?;
                fs::create_dir_all(&dir)
                    .with_context(|| format!("failed to create {}", dir.display()))?;

                let client = reqwest::Client::new();
                for file in [MODEL_FILE, METADATA_FILE] {
                    let file_url = format!("{url}{file}");
                    log::info!("Downloading {}", &file_url);
                    download_file(&client, &file_url, dir.join(file))
                        .await
                        .with_context(|| format!("failed to download {file_url}"))?;
                }

                Ok(dir)
            }
        }
    }
}

/// Content of `metadata.json` next to an exported model.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetadata {
    pub labels: Vec<String>,
    #[serde(default = "default_image_size")]
    pub image_size: u32,
}

fn default_image_size() -> u32 {
    DEFAULT_IMAGE_SIZE
}

impl ModelMetadata {
    pub fn from_json(json: &str) -> Result<Self> {
        let metadata: ModelMetadata = serde_json::from_str(json)?;
        if metadata.labels.is_empty() {
            bail!("model metadata lists no labels");
        }
        if metadata.image_size == 0 {
            bail!("model metadata has an image size of zero");
        }

        Ok(metadata)
    }
}

/// Image classifier exported from Teachable Machine and converted to ONNX.
///
/// Takes a square NHWC image scaled to `[-1, 1]` and outputs one probability per label.
pub struct TeachableModel {
    model: NnModel,
    metadata: ModelMetadata,
}

impl TeachableModel {
    /// Load the model from a directory or URL.
    pub async fn load(location: &ModelLocation) -> Result<Self> {
        let dir = location.fetch().await?;
        Self::from_dir(&dir)
    }

    pub fn from_dir(dir: &Path) -> Result<Self> {
        let metadata_path = dir.join(METADATA_FILE);
        let metadata = fs::read_to_string(&metadata_path)
            .with_context(|| format!("failed to read {}", metadata_path.display()))?;
        let metadata = ModelMetadata::from_json(&metadata)?;

        let size = metadata.image_size as usize;
        let input_fact = InferenceFact::dt_shape(f32::datum_type(), tvec!(1, size, size, 3));
        let model = tract_onnx::onnx()
            .model_for_path(dir.join(MODEL_FILE))?
            .with_input_fact(0, input_fact)?
            .into_optimized()?
            .into_runnable()?;

        log::info!(
            "Loaded model with {} classes: {:?}",
            metadata.labels.len(),
            &metadata.labels
        );

        Ok(Self { model, metadata })
    }
}

impl Classifier for TeachableModel {
    fn class_count(&self) -> usize {
        self.metadata.labels.len()
    }

    fn predict(&self, frame: &RgbImage) -> Result<Prediction> {
        let input = preproc(frame, self.metadata.image_size);
        let raw_nn_out = self.model.run(tvec!(input.into()))?;

        let probabilities: Vec<f32> = raw_nn_out
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?
            .to_array_view::<f32>()?
            .iter()
            .copied()
            .collect();

        to_prediction(&self.metadata.labels, &probabilities)
    }
}

/// Crop the center square of the frame, resize it and scale pixels to `[-1, 1]` in NHWC layout.
pub fn preproc(frame: &RgbImage, size: u32) -> Tensor {
    let (width, height) = frame.dimensions();
    let side = width.min(height);
    let (x, y) = ((width - side) / 2, (height - side) / 2);
    let cropped = image::imageops::crop_imm(frame, x, y, side, side).to_image();
    let resized = image::imageops::resize(&cropped, size, size, FilterType::Triangle);

    tract_ndarray::Array4::from_shape_fn(
        (1, size as usize, size as usize, 3),
        |(_, y, x, c)| resized[(x as _, y as _)][c] as f32 / 127.5 - 1.0,
    )
    .into()
}

/// Pair raw network output with labels.
fn to_prediction(labels: &[String], probabilities: &[f32]) -> Result<Prediction> {
    if probabilities.len() != labels.len() {
        bail!(
            "model returned {} probabilities for {} labels",
            probabilities.len(),
            labels.len()
        );
    }

    Ok(labels
        .iter()
        .zip(probabilities)
        .map(|(label, probability)| ClassProbability::new(label.clone(), *probability))
        .collect())
}

#[cfg(test)]
mod test {
    use image::Rgb;

    use super::*;

    #[test]
    fn parses_teachable_machine_metadata() -> Result<()> {
        let json = r#"{
            "tfjsVersion": "1.3.1",
            "tmVersion": "2.4.7",
            "packageVersion": "0.8.4-alpha2",
            "packageName": "@teachablemachine/image",
            "timeStamp": "2024-03-01T10:00:00.000Z",
            "userMetadata": {},
            "modelName": "tm-my-image-model",
            "labels": ["name", "date", "location", "websites"],
            "imageSize": 224
        }"#;

        let metadata = ModelMetadata::from_json(json)?;
        assert_eq!(metadata.labels, vec!["name", "date", "location", "websites"]);
        assert_eq!(metadata.image_size, 224);

        Ok(())
    }

    #[test]
    fn metadata_defaults_and_rejections() {
        let metadata = ModelMetadata::from_json(r#"{"labels": ["a"]}"#).unwrap();
        assert_eq!(metadata.image_size, DEFAULT_IMAGE_SIZE);

        assert!(ModelMetadata::from_json(r#"{"labels": []}"#).is_err());
        assert!(ModelMetadata::from_json(r#"{"imageSize": 224}"#).is_err());
        assert!(ModelMetadata::from_json(r#"{"labels": ["a"], "imageSize": 0}"#).is_err());
    }

    #[test]
    fn model_location_from_str() {
        assert_eq!(
            ModelLocation::parse("https://teachablemachine.withgoogle.com/models/OQI0vZlqw"),
            ModelLocation::Remote("https://teachablemachine.withgoogle.com/models/OQI0vZlqw/".into())
        );
        assert_eq!(
            ModelLocation::parse("models/portfolio"),
            ModelLocation::Local(PathBuf::from("models/portfolio"))
        );
    }

    #[test]
    fn cache_dir_is_derived_from_url() {
        if let Ok(dir) = ModelLocation::cache_dir("https://example.com/models/abc/") {
            assert!(dir.ends_with("reaction_server/example_com_models_abc"));
        }
    }

    #[test]
    fn missing_model_dir_fails_to_load() {
        assert!(TeachableModel::from_dir(Path::new("does/not/exist")).is_err());
    }

    #[test]
    fn preproc_crops_and_scales() {
        let mut frame = RgbImage::from_pixel(8, 4, Rgb([0, 0, 0]));
        // Center square spans x in 2..6
        for y in 0..4 {
            for x in 2..6 {
                frame.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }

        let tensor = preproc(&frame, 2);
        assert_eq!(tensor.shape(), &[1, 2, 2, 3]);
        let values = tensor.to_array_view::<f32>().unwrap();
        assert!(values.iter().all(|v| (*v - 1.0).abs() < 1.0e-6));
    }

    #[test]
    fn output_is_paired_with_labels() -> Result<()> {
        let labels = vec!["name".to_owned(), "date".to_owned()];

        let prediction = to_prediction(&labels, &[0.25, 0.75])?;
        assert_eq!(prediction.classes[1], ClassProbability::new("date", 0.75));

        assert!(to_prediction(&labels, &[1.0]).is_err());

        Ok(())
    }
}
