use async_trait::async_trait;
use banana_contracts::{GenerationSettings, ImagePayload};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct PromptRequest {
    pub settings: GenerationSettings,
    pub style_image: Option<ImagePayload>,
}

#[derive(Debug, Clone)]
pub struct ComposeRequest {
    pub base_image: ImagePayload,
    pub prompt: String,
    pub style_image: Option<ImagePayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("{provider} request failed: {message}")]
    Transport { provider: String, message: String },
    #[error("{provider} request failed ({code}): {body}")]
    Status {
        provider: String,
        code: u16,
        body: String,
    },
    #[error("{provider} returned a malformed response: {message}")]
    Malformed { provider: String, message: String },
    #[error("No image was generated. The model may have refused the request.")]
    NoImageProduced,
    #[error("{provider} returned an empty prompt")]
    EmptyPrompt { provider: String },
    #[error("generation client not configured: {0}")]
    Config(String),
}

/// Remote model contract consumed by the session orchestrator.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    fn name(&self) -> &str;

    /// Writes a scene prompt for the settings, folding in a description of the
    /// style image when one is supplied.
    async fn describe_and_compose_prompt(
        &self,
        request: &PromptRequest,
    ) -> Result<String, RemoteError>;

    /// Composites the base image into the scene the prompt describes.
    async fn compose_image(&self, request: &ComposeRequest) -> Result<ImagePayload, RemoteError>;
}

#[async_trait]
impl<T: GenerationClient + ?Sized> GenerationClient for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn describe_and_compose_prompt(
        &self,
        request: &PromptRequest,
    ) -> Result<String, RemoteError> {
        (**self).describe_and_compose_prompt(request).await
    }

    async fn compose_image(&self, request: &ComposeRequest) -> Result<ImagePayload, RemoteError> {
        (**self).compose_image(request).await
    }
}

/// Instruction sent to the text model to write the photography prompt.
pub fn photography_prompt_instruction(settings: &GenerationSettings, with_style: bool) -> String {
    let style_clause = if with_style {
        "A style reference image is provided. **First, describe the provided style reference \
         image in detail.** Analyze its aesthetics, color palette, mood, composition, and \
         textures. **Then, incorporate this detailed description of the style** into the final \
         prompt to define the visual style of the new scene."
    } else {
        ""
    };
    format!(
        "You are a professional product photography prompt writer. Your task is to generate a \
         highly detailed and descriptive prompt for an AI image generation model. This prompt \
         will be used to place a user's product photo into a new, professional-looking scene.\n\n\
         Based on the following parameters, create the prompt:\n\
         - Aspect Ratio: {}\n\
         - Lighting Style: {}\n\
         - Camera Perspective: {}\n\n\
         {style_clause}\n\n\
         The final output must be a single, concise paragraph of text, ready to be fed into an \
         image generation model. Do not include any preamble, headings, or explanation. Just \
         provide the prompt itself. Describe the background, props, and atmosphere vividly.",
        settings.aspect_ratio.tag(),
        settings.lighting_style.tag(),
        settings.camera_perspective.tag(),
    )
}

#[cfg(test)]
mod tests {
    use banana_contracts::{AspectRatio, CameraPerspective, LightingStyle};

    use super::*;

    #[test]
    fn instruction_lists_settings_by_wire_tag() {
        let settings = GenerationSettings {
            aspect_ratio: AspectRatio::Portrait,
            lighting_style: LightingStyle::GoldenHour,
            camera_perspective: CameraPerspective::BirdsEye,
        };
        let text = photography_prompt_instruction(&settings, false);
        assert!(text.contains("- Aspect Ratio: 9:16"));
        assert!(text.contains("- Lighting Style: Golden hour"));
        assert!(text.contains("- Camera Perspective: Birds-eye view"));
        assert!(!text.contains("style reference image"));
    }

    #[test]
    fn instruction_asks_for_style_description_when_style_present() {
        let text = photography_prompt_instruction(&GenerationSettings::default(), true);
        assert!(text.contains("describe the provided style reference image"));
        assert!(text.contains("incorporate this detailed description"));
    }

    #[test]
    fn no_image_error_reads_as_user_message() {
        assert_eq!(
            RemoteError::NoImageProduced.to_string(),
            "No image was generated. The model may have refused the request."
        );
        let status = RemoteError::Status {
            provider: "Gemini".to_string(),
            code: 429,
            body: "quota".to_string(),
        };
        assert_eq!(status.to_string(), "Gemini request failed (429): quota");
    }
}
