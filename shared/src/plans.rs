use std::io::Cursor;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::geometry::{scale_to_fit, Letterbox};
use crate::store::BlobStore;

/// One stadium diagram. Width and height are the intrinsic pixel size used for
/// aspect-preserving scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub width: u32,
    pub height: u32,
}

/// The ordered plans of a deployment. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSet {
    plans: Vec<Plan>,
}

impl PlanSet {
    /// `None` when `plans` is empty.
    pub fn new(plans: Vec<Plan>) -> Option<Self> {
        (!plans.is_empty()).then_some(Self { plans })
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Plan> {
        self.plans.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Plan> {
        self.plans.iter()
    }

    /// Transform for showing plan `index` inside a viewport.
    pub fn letterbox(
        &self,
        index: usize,
        viewport_width: f64,
        viewport_height: f64,
    ) -> Option<Letterbox> {
        let plan = self.get(index)?;
        Some(scale_to_fit(
            plan.width as f64,
            plan.height as f64,
            viewport_width,
            viewport_height,
        ))
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadPlanRequest {
    pub file_name: String,
    pub content_type: String,
    pub file_data: String, // base64 encoded
}

/// Reference to an uploaded plan file. Exactly one of `locator` and
/// `inline_data` is set; the latter holds base64 bytes when the upload failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanFile {
    pub file_name: String,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Get raster image dimensions from the header without decoding pixels.
/// PDFs and unknown formats yield `None`.
pub fn get_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::io::Reader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// Upload a plan file. A failed upload keeps the bytes inline instead of
/// losing the file reference.
pub async fn upload_plan_file<B: BlobStore>(
    blobs: &B,
    bytes: Vec<u8>,
    file_name: &str,
    content_type: &str,
) -> PlanFile {
    let dimensions = get_dimensions(&bytes);
    let size = bytes.len();

    let (locator, inline_data) = match blobs.upload(bytes.clone(), file_name, content_type).await {
        Ok(locator) => {
            tracing::info!("Uploaded plan file {} ({} bytes) to {}", file_name, size, locator);
            (Some(locator), None)
        }
        Err(e) => {
            tracing::warn!("Upload of {} failed, storing inline: {}", file_name, e);
            let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
            (None, Some(encoded))
        }
    };

    PlanFile {
        file_name: file_name.to_string(),
        content_type: content_type.to_string(),
        locator,
        inline_data,
        width: dimensions.map(|(w, _)| w),
        height: dimensions.map(|(_, h)| h),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::OfflineBlobStore;
    use crate::store::MemoryBlobStore;
    use image::{DynamicImage, ImageFormat, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_get_dimensions() {
        assert_eq!(get_dimensions(&png(40, 30)), Some((40, 30)));
        assert_eq!(get_dimensions(b"%PDF-1.7 not an image"), None);
    }

    #[test]
    fn test_plan_set_letterbox() {
        let plans = PlanSet::new(vec![
            Plan { width: 2000, height: 1000 },
            Plan { width: 800, height: 800 },
        ])
        .unwrap();
        assert_eq!(plans.len(), 2);

        let fit = plans.letterbox(0, 1000.0, 1000.0).unwrap();
        assert_eq!(fit.scale, 0.5);
        assert_eq!(plans.letterbox(2, 1000.0, 1000.0), None);

        assert!(PlanSet::new(Vec::new()).is_none());
    }

    #[tokio::test]
    async fn test_upload_plan_file() {
        let blobs = MemoryBlobStore::new();
        let bytes = png(64, 48);
        let file = upload_plan_file(&blobs, bytes.clone(), "ebene1.png", "image/png").await;

        let locator = file.locator.expect("uploaded");
        assert_eq!(blobs.read(&locator).await, Some(bytes));
        assert_eq!(file.inline_data, None);
        assert_eq!((file.width, file.height), (Some(64), Some(48)));
    }

    #[tokio::test]
    async fn test_failed_upload_falls_back_to_inline_data() {
        let bytes = b"%PDF-1.7".to_vec();
        let file = upload_plan_file(&OfflineBlobStore, bytes.clone(), "plan.pdf", "application/pdf").await;

        assert_eq!(file.locator, None);
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(file.inline_data.expect("inline fallback"))
            .unwrap();
        assert_eq!(decoded, bytes);
        assert_eq!(file.width, None);
    }
}
