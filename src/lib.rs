//! AddonSmith Core - Add-on Compiler
//!
//! # The Six Laws (Non-Negotiable)
//! 1. The Gate Comes First
//! 2. Stages Run In Order
//! 3. Textures Are Pixel-Exact
//! 4. Bundles Are Verbatim
//! 5. Saves Are Durable
//! 6. The Model Suggests, The Engine Enforces

pub mod addon;
pub mod backend;
pub mod bundle;
pub mod config;
pub mod gate;
pub mod hashing;
pub mod parse;
pub mod pipeline;
pub mod prompts;
pub mod raster;
pub mod request;
pub mod session;
pub mod sizing;
pub mod store;

pub use addon::{Citation, Evaluation, FileMap, GenerationResult, GroundedContext};
pub use backend::{BackendError, GeminiBackend, GenerativeBackend, StructuredReply};
pub use bundle::{export_file_name, import_archive, ArchiveError, Bundle, ICON_PATHS};
pub use config::{AddonConfig, ConfigError};
pub use gate::{PromptGate, RejectionReason, ValidationError, Verdict};
pub use hashing::{canonical_json, content_hash};
pub use pipeline::{PipelineError, PipelineOrchestrator, ProgressEvent, ProgressSink, Stage, StageError};
pub use raster::{rasterize, rasterize_as, RasterError, RasterImage};
pub use request::{Request, RequestError, SUPPORTED_VERSIONS};
pub use session::{Applied, Session};
pub use sizing::{normalize, TextureSize};
pub use store::{Artifact, ArtifactStore, FileBackend, KeyValueBackend, MemoryBackend, StoreError};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
