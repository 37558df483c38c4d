use std::io::Cursor;

use async_trait::async_trait;
use banana_contracts::{ImagePayload, MimeType};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use sha2::{Digest, Sha256};

use crate::client::{ComposeRequest, GenerationClient, PromptRequest, RemoteError};

const PROVIDER: &str = "dryrun";

/// Offline client: prompts are templated locally and composed images are a
/// flat colour derived from the prompt, sized like the base image.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryrunClient;

#[async_trait]
impl GenerationClient for DryrunClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn describe_and_compose_prompt(
        &self,
        request: &PromptRequest,
    ) -> Result<String, RemoteError> {
        let settings = &request.settings;
        let mut prompt = format!(
            "Studio product shot framed for {}, {} lighting, {} camera angle, clean \
             backdrop with soft props and a calm atmosphere.",
            settings.aspect_ratio.tag(),
            settings.lighting_style.tag().to_ascii_lowercase(),
            settings.camera_perspective.tag().to_ascii_lowercase(),
        );
        if let Some(style) = request.style_image.as_ref() {
            prompt.push_str(&format!(
                " Styled after reference {}.",
                style.short_digest()
            ));
        }
        Ok(prompt)
    }

    async fn compose_image(&self, request: &ComposeRequest) -> Result<ImagePayload, RemoteError> {
        let malformed = |message: String| RemoteError::Malformed {
            provider: PROVIDER.to_string(),
            message,
        };
        let base_bytes = request
            .base_image
            .to_bytes()
            .map_err(|err| malformed(format!("base image is not base64: {err}")))?;
        let base = image::load_from_memory(&base_bytes)
            .map_err(|err| malformed(format!("base image did not decode: {err}")))?;

        let (r, g, b) = color_from_prompt(&request.prompt);
        let canvas = RgbImage::from_pixel(base.width(), base.height(), Rgb([r, g, b]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(canvas)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|err| malformed(format!("dryrun encode failed: {err}")))?;
        Ok(ImagePayload::from_bytes(&bytes, MimeType::Png))
    }
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}
