use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use banana_contracts::events::{RunKind, SessionEvent, SessionJournal};
use banana_contracts::{
    AspectRatio, CameraPerspective, GenerationSettings, HistoryEntry, HistoryError,
    HistoryOrigin, HistoryStore, ImagePayload, LightingStyle, Viewer,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::client::{ComposeRequest, GenerationClient, PromptRequest, RemoteError};
use crate::normalize::{ImageCanvasOps, NormalizeError, Normalizer, RasterCanvas};

/// An image on screen together with the prompt that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendition {
    pub image: ImagePayload,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Generating,
    Ready(Rendition),
    /// The rendition being refined stays visible while the run is in flight.
    Refining(Rendition),
    Failed {
        message: String,
        retained: Option<Rendition>,
    },
}

impl PipelineState {
    pub fn label(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Generating => "generating",
            PipelineState::Ready(_) => "ready",
            PipelineState::Refining(_) => "refining",
            PipelineState::Failed { .. } => "failed",
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, PipelineState::Generating | PipelineState::Refining(_))
    }

    pub fn displayed(&self) -> Option<&Rendition> {
        match self {
            PipelineState::Ready(rendition) | PipelineState::Refining(rendition) => Some(rendition),
            PipelineState::Failed { retained, .. } => retained.as_ref(),
            PipelineState::Idle | PipelineState::Generating => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            PipelineState::Failed { message, .. } => Some(message.as_str()),
            _ => None,
        }
    }
}

/// Rejections raised before a run starts; the pipeline state is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please upload a product image first.")]
    MissingProductImage,
    #[error("Cannot refine without a generated image and a refinement prompt.")]
    NothingToRefine,
    #[error("Cannot refine without a generated image and a refinement prompt.")]
    EmptyInstruction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Ready,
    Failed(String),
}

#[derive(Debug, Error)]
enum StepError {
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

pub type SubscriptionId = u64;

type Observer = Box<dyn FnMut(&PipelineState) + Send>;

/// Owns the generate/refine pipeline and the session history.
///
/// Every run method takes `&mut self`, so at most one run can be in flight
/// per orchestrator. History and state are only written once a run's final
/// step resolves.
pub struct SessionOrchestrator<C: GenerationClient, O: ImageCanvasOps = RasterCanvas> {
    client: C,
    normalizer: Normalizer<O>,
    settings: GenerationSettings,
    product_image: Option<ImagePayload>,
    style_image: Option<ImagePayload>,
    prompt_text: String,
    refine_instruction: String,
    state: PipelineState,
    history: HistoryStore,
    viewer: Viewer,
    observers: Vec<(SubscriptionId, Observer)>,
    next_subscription: SubscriptionId,
    journal: Option<SessionJournal>,
}

impl<C: GenerationClient, O: ImageCanvasOps> SessionOrchestrator<C, O> {
    pub fn new(client: C, normalizer: Normalizer<O>) -> Self {
        Self {
            client,
            normalizer,
            settings: GenerationSettings::default(),
            product_image: None,
            style_image: None,
            prompt_text: String::new(),
            refine_instruction: String::new(),
            state: PipelineState::Idle,
            history: HistoryStore::new(),
            viewer: Viewer::new(),
            observers: Vec::new(),
            next_subscription: 0,
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: SessionJournal) -> Self {
        self.journal = Some(journal);
        self.record(SessionEvent::SessionStarted {
            client: self.client.name().to_string(),
            max_dim: self.normalizer.max_dim(),
        });
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn is_busy(&self) -> bool {
        self.state.is_busy()
    }

    pub fn settings(&self) -> GenerationSettings {
        self.settings
    }

    pub fn set_settings(&mut self, settings: GenerationSettings) {
        self.settings = settings;
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: AspectRatio) {
        self.settings.aspect_ratio = aspect_ratio;
    }

    pub fn set_lighting_style(&mut self, lighting_style: LightingStyle) {
        self.settings.lighting_style = lighting_style;
    }

    pub fn set_camera_perspective(&mut self, camera_perspective: CameraPerspective) {
        self.settings.camera_perspective = camera_perspective;
    }

    pub fn product_image(&self) -> Option<&ImagePayload> {
        self.product_image.as_ref()
    }

    pub fn set_product_image(&mut self, image: Option<ImagePayload>) {
        self.product_image = image;
    }

    pub fn style_image(&self) -> Option<&ImagePayload> {
        self.style_image.as_ref()
    }

    pub fn set_style_image(&mut self, image: Option<ImagePayload>) {
        self.style_image = image;
    }

    pub fn prompt_text(&self) -> &str {
        &self.prompt_text
    }

    /// Edits the prompt field. The next generation overwrites it.
    pub fn set_prompt_text(&mut self, text: impl Into<String>) {
        self.prompt_text = text.into();
    }

    pub fn refine_instruction(&self) -> &str {
        &self.refine_instruction
    }

    pub fn set_refine_instruction(&mut self, text: impl Into<String>) {
        self.refine_instruction = text.into();
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn subscribe<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: FnMut(&PipelineState) + Send + 'static,
    {
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() != before
    }

    /// Normalizes the inputs, asks for a prompt, then composes the image.
    pub async fn generate(&mut self) -> Result<RunOutcome, ValidationError> {
        let product = self
            .product_image
            .clone()
            .ok_or(ValidationError::MissingProductImage)?;
        let style = self.style_image.clone();
        let settings = self.settings;

        self.transition(PipelineState::Generating);
        info!(
            aspect_ratio = settings.aspect_ratio.tag(),
            lighting = settings.lighting_style.tag(),
            camera = settings.camera_perspective.tag(),
            with_style = style.is_some(),
            "generation started"
        );
        self.record(SessionEvent::GenerateStarted {
            settings,
            with_style: style.is_some(),
        });

        match self.run_generate(settings, &product, style.as_ref()).await {
            Ok(rendition) => {
                self.prompt_text = rendition.prompt.clone();
                self.push_history(rendition.image.clone(), HistoryOrigin::Generated);
                self.record(SessionEvent::ImageComposed {
                    kind: RunKind::Generate,
                    mime_type: rendition.image.mime_type(),
                    digest: rendition.image.digest(),
                    history_len: self.history.len(),
                });
                self.transition(PipelineState::Ready(rendition));
                Ok(RunOutcome::Ready)
            }
            Err(err) => Ok(self.fail(RunKind::Generate, err, None)),
        }
    }

    /// Re-composes the displayed image with the pending refinement instruction.
    pub async fn refine(&mut self) -> Result<RunOutcome, ValidationError> {
        let current = self
            .state
            .displayed()
            .cloned()
            .ok_or(ValidationError::NothingToRefine)?;
        let instruction = self.refine_instruction.trim().to_string();
        if instruction.is_empty() {
            return Err(ValidationError::EmptyInstruction);
        }

        self.transition(PipelineState::Refining(current.clone()));
        info!(chars = instruction.chars().count(), "refinement started");
        self.record(SessionEvent::RefineStarted {
            instruction: instruction.clone(),
            base_digest: current.image.digest(),
        });

        let request = ComposeRequest {
            base_image: current.image.clone(),
            prompt: instruction,
            style_image: None,
        };
        match self.client.compose_image(&request).await {
            Ok(image) => {
                self.refine_instruction.clear();
                self.push_history(image.clone(), HistoryOrigin::Refined);
                self.record(SessionEvent::ImageComposed {
                    kind: RunKind::Refine,
                    mime_type: image.mime_type(),
                    digest: image.digest(),
                    history_len: self.history.len(),
                });
                self.transition(PipelineState::Ready(Rendition {
                    image,
                    prompt: current.prompt,
                }));
                Ok(RunOutcome::Ready)
            }
            Err(err) => Ok(self.fail(RunKind::Refine, StepError::Remote(err), Some(current))),
        }
    }

    async fn run_generate(
        &self,
        settings: GenerationSettings,
        product: &ImagePayload,
        style: Option<&ImagePayload>,
    ) -> Result<Rendition, StepError> {
        let product = self.normalizer.normalize(product, settings.aspect_ratio)?;
        let style = style
            .map(|image| self.normalizer.normalize(image, settings.aspect_ratio))
            .transpose()?;

        let prompt = self
            .client
            .describe_and_compose_prompt(&PromptRequest {
                settings,
                style_image: style.clone(),
            })
            .await?;
        self.record(SessionEvent::PromptGenerated {
            chars: prompt.chars().count(),
        });

        let image = self
            .client
            .compose_image(&ComposeRequest {
                base_image: product,
                prompt: prompt.clone(),
                style_image: style,
            })
            .await?;
        Ok(Rendition { image, prompt })
    }

    fn fail(&mut self, kind: RunKind, err: StepError, retained: Option<Rendition>) -> RunOutcome {
        let message = err.to_string();
        warn!(?kind, error = %message, "run failed");
        self.record(SessionEvent::RunFailed {
            kind,
            message: message.clone(),
        });
        self.transition(PipelineState::Failed {
            message: message.clone(),
            retained,
        });
        RunOutcome::Failed(message)
    }

    fn push_history(&mut self, image: ImagePayload, origin: HistoryOrigin) {
        self.history.prepend(HistoryEntry::new(image, origin));
        self.viewer.on_prepended(self.history.len());
    }

    fn transition(&mut self, next: PipelineState) {
        self.state = next;
        for (_, observer) in self.observers.iter_mut() {
            observer(&self.state);
        }
    }

    fn record(&self, event: SessionEvent) {
        let Some(journal) = self.journal.as_ref() else {
            return;
        };
        if let Err(err) = journal.record(&event) {
            warn!(error = %format!("{err:#}"), "failed to write session event");
        }
    }

    pub fn remove_history(&mut self, index: usize) -> Result<HistoryEntry, HistoryError> {
        let removed = self.history.remove_at(index)?;
        self.viewer.on_removed(index, self.history.len());
        self.record(SessionEvent::HistoryRemoved {
            index,
            id: removed.id.clone(),
            history_len: self.history.len(),
        });
        Ok(removed)
    }

    pub fn open_viewer(&mut self, index: usize) -> Option<usize> {
        self.viewer.open(index, self.history.len());
        self.viewer.active_index()
    }

    pub fn close_viewer(&mut self) {
        self.viewer.close();
    }

    pub fn viewer_next(&mut self) -> Option<usize> {
        self.viewer.revalidate(self.history.len());
        self.viewer.next(self.history.len());
        self.viewer.active_index()
    }

    pub fn viewer_previous(&mut self) -> Option<usize> {
        self.viewer.revalidate(self.history.len());
        self.viewer.previous();
        self.viewer.active_index()
    }

    /// The entry the lightbox should render, re-validated against the history.
    pub fn viewer_entry(&mut self) -> Option<(usize, &HistoryEntry)> {
        self.viewer.revalidate(self.history.len());
        let index = self.viewer.active_index()?;
        self.history.get(index).map(|entry| (index, entry))
    }

    /// Writes the history entry's exact bytes into `dir`.
    pub fn download(&self, index: usize, dir: &Path) -> Result<PathBuf> {
        let entry = self
            .history
            .get(index)
            .ok_or(HistoryError::IndexOutOfRange {
                index,
                len: self.history.len(),
            })?;
        save_image(&entry.image, dir)
    }

    /// Writes the currently displayed image, if any, into `dir`.
    pub fn download_displayed(&self, dir: &Path) -> Result<Option<PathBuf>> {
        self.state
            .displayed()
            .map(|rendition| save_image(&rendition.image, dir))
            .transpose()
    }
}

/// Saves `image` as `ai-generated-image-<millis>.<ext>` under `dir`.
pub fn save_image(image: &ImagePayload, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let bytes = image
        .to_bytes()
        .context("stored image is not valid base64")?;
    let stamp = chrono::Utc::now().timestamp_millis();
    let mut path = dir.join(format!(
        "ai-generated-image-{stamp}.{}",
        image.mime_type().extension()
    ));
    let mut suffix = 1;
    while path.exists() {
        path = dir.join(format!(
            "ai-generated-image-{stamp}-{suffix}.{}",
            image.mime_type().extension()
        ));
        suffix += 1;
    }
    fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}
