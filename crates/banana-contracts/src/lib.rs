pub mod events;
pub mod history;
pub mod payload;
pub mod session;
pub mod settings;
pub mod viewer;

pub use history::{HistoryEntry, HistoryError, HistoryOrigin, HistoryStore};
pub use payload::{ImagePayload, MimeType};
pub use settings::{
    AspectRatio, CameraPerspective, GenerationSettings, LightingStyle, OptionItem, ParseError,
};
pub use viewer::Viewer;
