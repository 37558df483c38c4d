pub mod client;
pub mod config;
pub mod dryrun;
pub mod gemini;
pub mod normalize;
pub mod orchestrator;

pub use client::{ComposeRequest, GenerationClient, PromptRequest, RemoteError};
pub use config::EngineConfig;
pub use dryrun::DryrunClient;
pub use gemini::GeminiClient;
pub use normalize::{
    CanvasLayout, ImageCanvasOps, NormalizeError, Normalizer, OutputFormat, PixelRect,
    RasterCanvas,
};
pub use orchestrator::{
    save_image, PipelineState, Rendition, RunOutcome, SessionOrchestrator, SubscriptionId,
    ValidationError,
};
