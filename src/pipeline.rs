//! Generation Pipeline - Single Entry Point
//!
//! CRITICAL: `run` MUST pass the request through the prompt gate. No bypass.
//!
//! A run is an explicit state machine with one state per stage. The driver
//! advances it strictly in order: context gathering, content generation, size
//! resolution, image synthesis, rasterization, quality critique. Every stage
//! but the critique is fatal on failure. Nothing is retried here.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::addon::{Evaluation, FileMap, GenerationResult, GroundedContext};
use crate::backend::{BackendError, GenerativeBackend};
use crate::gate::{PromptGate, ValidationError};
use crate::parse::{self, ParseError};
use crate::prompts;
use crate::raster::{rasterize_as, RasterError, RasterImage};
use crate::request::Request;
use crate::sizing::{self, TextureSize};

#[cfg(feature = "test-hooks")]
use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "test-hooks")]
static GATE_CALL_COUNT: AtomicU32 = AtomicU32::new(0);

#[cfg(feature = "test-hooks")]
pub fn get_gate_call_count() -> u32 {
    GATE_CALL_COUNT.load(Ordering::SeqCst)
}

#[cfg(feature = "test-hooks")]
pub fn reset_gate_call_count() {
    GATE_CALL_COUNT.store(0, Ordering::SeqCst);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ContextGathering,
    ContentGeneration,
    SizeResolution,
    ImageSynthesis,
    Rasterization,
    QualityCritique,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Self::ContextGathering,
        Self::ContentGeneration,
        Self::SizeResolution,
        Self::ImageSynthesis,
        Self::Rasterization,
        Self::QualityCritique,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::ContextGathering => "context_gathering",
            Self::ContentGeneration => "content_generation",
            Self::SizeResolution => "size_resolution",
            Self::ImageSynthesis => "image_synthesis",
            Self::Rasterization => "rasterization",
            Self::QualityCritique => "quality_critique",
        }
    }

    /// Whether a failure in this stage aborts the run.
    pub fn is_fatal(self) -> bool {
        !matches!(self, Self::QualityCritique)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error("context gathering failed: {0}")]
    ContextGatheringFailed(#[source] BackendError),

    #[error("content generation failed: {0}")]
    ContentGenerationFailed(#[source] BackendError),

    #[error("malformed generation: {0}")]
    MalformedGeneration(#[source] ParseError),

    #[error("image generation failed: {0}")]
    ImageGenerationFailed(#[source] BackendError),

    #[error("image generation failed: no image payload in response")]
    NoImagePayload,

    #[error(transparent)]
    RasterizationFailed(#[from] RasterError),

    #[error("critique failed: {0}")]
    CritiqueFailed(#[source] BackendError),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Request rejected: {0}")]
    Rejected(#[from] ValidationError),

    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: StageError,
    },
}

impl PipelineError {
    fn at(stage: Stage, source: StageError) -> Self {
        Self::Stage { stage, source }
    }

    /// The stage that failed, if the run got past the gate.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Rejected(_) => None,
            Self::Stage { stage, .. } => Some(*stage),
        }
    }
}

// --- Progress ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "event")]
pub enum ProgressEvent {
    StageStarted { stage: Stage, label: String },
    Diagnostic { stage: Stage, message: String },
}

/// Observer of a run. Purely observational; never affects the outcome.
pub trait ProgressSink: Send + Sync {
    fn stage(&self, stage: Stage, label: &str);

    /// Non-fatal problems worth showing in a debug trail.
    fn diagnostic(&self, _stage: Stage, _message: &str) {}
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn stage(&self, _stage: Stage, _label: &str) {}
}

impl ProgressSink for UnboundedSender<ProgressEvent> {
    fn stage(&self, stage: Stage, label: &str) {
        // A dropped receiver only means nobody is watching.
        let _ = self.send(ProgressEvent::StageStarted { stage, label: label.to_string() });
    }

    fn diagnostic(&self, stage: Stage, message: &str) {
        let _ = self.send(ProgressEvent::Diagnostic { stage, message: message.to_string() });
    }
}

/// Records every event, in order.
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingSink {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn push(&self, event: ProgressEvent) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event);
    }
}

impl ProgressSink for CollectingSink {
    fn stage(&self, stage: Stage, label: &str) {
        self.push(ProgressEvent::StageStarted { stage, label: label.to_string() });
    }

    fn diagnostic(&self, stage: Stage, message: &str) {
        self.push(ProgressEvent::Diagnostic { stage, message: message.to_string() });
    }
}

// --- State machine ---

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GeneratedFile {
    pub path: String,
    pub content: String,
}

/// Shape of the structured content reply.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedContent {
    pub name: String,
    pub description: String,
    /// Loosely typed: missing or non-numeric values fall back to the default size.
    #[serde(default)]
    pub texture_size: Option<Value>,
    pub files: Vec<GeneratedFile>,
    pub evaluation: Evaluation,
}

impl GeneratedContent {
    fn file_map(&self) -> FileMap {
        let mut files = FileMap::new();
        for file in &self.files {
            if files.insert(file.path.clone(), file.content.clone()).is_some() {
                tracing::warn!(path = %file.path, "duplicate generated path, keeping the last one");
            }
        }
        files
    }
}

/// Where a run is. Each non-terminal state carries everything later stages need.
#[derive(Debug)]
pub enum PipelineState {
    GatheringContext,
    GeneratingContent {
        context: GroundedContext,
    },
    ResolvingSize {
        context: GroundedContext,
        content: GeneratedContent,
    },
    SynthesizingImage {
        context: GroundedContext,
        content: GeneratedContent,
        size: TextureSize,
    },
    Rasterizing {
        context: GroundedContext,
        content: GeneratedContent,
        size: TextureSize,
        mime_type: String,
        source: Vec<u8>,
    },
    Critiquing {
        context: GroundedContext,
        content: GeneratedContent,
        size: TextureSize,
        raster: RasterImage,
    },
    Succeeded(GenerationResult),
    Failed(PipelineError),
}

impl PipelineState {
    /// The stage this state is about to execute.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::GatheringContext => Some(Stage::ContextGathering),
            Self::GeneratingContent { .. } => Some(Stage::ContentGeneration),
            Self::ResolvingSize { .. } => Some(Stage::SizeResolution),
            Self::SynthesizingImage { .. } => Some(Stage::ImageSynthesis),
            Self::Rasterizing { .. } => Some(Stage::Rasterization),
            Self::Critiquing { .. } => Some(Stage::QualityCritique),
            Self::Succeeded(_) | Self::Failed(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage().is_none()
    }
}

/// The generation pipeline - single entry point for producing add-ons
pub struct PipelineOrchestrator {
    backend: Arc<dyn GenerativeBackend>,
    gate: PromptGate,
}

impl PipelineOrchestrator {
    pub fn new(backend: Arc<dyn GenerativeBackend>) -> Self {
        Self { backend, gate: PromptGate::new() }
    }

    /// Run every stage for `request`.
    ///
    /// CRITICAL: This ALWAYS validates the request first. No bypass possible.
    pub async fn run(
        &self,
        request: &Request,
        sink: &dyn ProgressSink,
    ) -> Result<GenerationResult, PipelineError> {
        #[cfg(feature = "test-hooks")]
        GATE_CALL_COUNT.fetch_add(1, Ordering::SeqCst);

        self.gate.admit(&request.text)?;
        tracing::info!(version = %request.version, "pipeline run started");

        let mut state = PipelineState::GatheringContext;
        loop {
            state = match state {
                PipelineState::Succeeded(result) => {
                    tracing::info!(files = result.files.len(), "pipeline run succeeded");
                    return Ok(result);
                }
                PipelineState::Failed(err) => {
                    tracing::warn!(error = %err, "pipeline run failed");
                    return Err(err);
                }
                pending => self.advance(pending, request, sink).await,
            };
        }
    }

    /// Execute the stage `state` is waiting on and return the next state.
    pub async fn advance(
        &self,
        state: PipelineState,
        request: &Request,
        sink: &dyn ProgressSink,
    ) -> PipelineState {
        match state {
            PipelineState::GatheringContext => {
                let stage = Stage::ContextGathering;
                enter(sink, stage, "Researching references on the web...");
                match self.backend.grounded_context(&prompts::grounding_prompt(request)).await {
                    Ok(context) => {
                        tracing::debug!(citations = context.citations.len(), "context gathered");
                        PipelineState::GeneratingContent { context }
                    }
                    Err(e) => fail(stage, StageError::ContextGatheringFailed(e)),
                }
            }

            PipelineState::GeneratingContent { context } => {
                let stage = Stage::ContentGeneration;
                enter(sink, stage, "Generating add-on files...");
                let prompt = prompts::content_prompt(request, &context);
                let reply = match self.backend.structured(&prompt, &prompts::content_schema()).await {
                    Ok(reply) => reply,
                    Err(e) => return fail(stage, StageError::ContentGenerationFailed(e)),
                };
                match parse::structured::<GeneratedContent>(reply) {
                    Ok(content) => {
                        tracing::debug!(files = content.files.len(), name = %content.name, "content generated");
                        PipelineState::ResolvingSize { context, content }
                    }
                    Err(e) => fail(stage, StageError::MalformedGeneration(e)),
                }
            }

            PipelineState::ResolvingSize { context, content } => {
                let stage = Stage::SizeResolution;
                enter(sink, stage, "Analyzing item complexity...");
                let hint = sizing::hint_from_json(content.texture_size.as_ref());
                let size = sizing::normalize(hint);
                tracing::debug!(?hint, %size, "texture size resolved");
                PipelineState::SynthesizingImage { context, content, size }
            }

            PipelineState::SynthesizingImage { context, content, size } => {
                let stage = Stage::ImageSynthesis;
                enter(sink, stage, &format!("Creating {size}x{size}px texture..."));
                let response = match self.backend.synthesize_image(&prompts::image_prompt(request, size)).await {
                    Ok(response) => response,
                    Err(e) => return fail(stage, StageError::ImageGenerationFailed(e)),
                };
                match response.first_inline_typed() {
                    Some((mime_type, data)) => PipelineState::Rasterizing {
                        context,
                        content,
                        size,
                        mime_type: mime_type.to_string(),
                        source: data.to_vec(),
                    },
                    None => fail(stage, StageError::NoImagePayload),
                }
            }

            PipelineState::Rasterizing { context, content, size, mime_type, source } => {
                let stage = Stage::Rasterization;
                enter(sink, stage, &format!("Snapping texture to {size}x{size} pixels..."));
                match rasterize_as(&source, Some(&mime_type), size.pixels()) {
                    Ok(raster) => PipelineState::Critiquing { context, content, size, raster },
                    Err(e) => fail(stage, StageError::RasterizationFailed(e)),
                }
            }

            PipelineState::Critiquing { context, content, size, raster } => {
                let stage = Stage::QualityCritique;
                enter(sink, stage, "Analyzing image quality...");
                let prompt = prompts::critique_prompt(request, size);
                let critique = match self.backend.critique(raster.png_bytes(), &prompt).await {
                    Ok(text) if !text.trim().is_empty() => Some(text),
                    Ok(_) => None,
                    Err(e) => {
                        let err = StageError::CritiqueFailed(e);
                        tracing::warn!(error = %err, "critique unavailable");
                        sink.diagnostic(stage, &err.to_string());
                        None
                    }
                };

                PipelineState::Succeeded(GenerationResult {
                    files: content.file_map(),
                    name: Some(content.name),
                    description: Some(content.description),
                    image: Some(raster),
                    evaluation: Some(content.evaluation),
                    context: Some(context),
                    critique,
                    texture_size: Some(size),
                })
            }

            terminal @ (PipelineState::Succeeded(_) | PipelineState::Failed(_)) => terminal,
        }
    }
}

fn enter(sink: &dyn ProgressSink, stage: Stage, label: &str) {
    tracing::info!(stage = %stage, "{}", label);
    sink.stage(stage, label);
}

fn fail(stage: Stage, source: StageError) -> PipelineState {
    PipelineState::Failed(PipelineError::at(stage, source))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_critique_is_best_effort() {
        let fatal: Vec<_> = Stage::ALL.into_iter().filter(|s| s.is_fatal()).collect();
        assert_eq!(fatal.len(), 5);
        assert!(!Stage::QualityCritique.is_fatal());
    }

    #[test]
    fn test_state_stage_mapping() {
        assert_eq!(PipelineState::GatheringContext.stage(), Some(Stage::ContextGathering));
        let failed = PipelineState::Failed(PipelineError::at(
            Stage::ImageSynthesis,
            StageError::NoImagePayload,
        ));
        assert!(failed.is_terminal());
    }

    #[test]
    fn test_error_names_stage() {
        let err = PipelineError::at(Stage::ImageSynthesis, StageError::NoImagePayload);
        assert_eq!(err.stage(), Some(Stage::ImageSynthesis));
        assert!(err.to_string().contains("image_synthesis"));
        assert!(err.to_string().contains("no image payload"));
    }

    #[test]
    fn test_generated_content_tolerates_missing_size() {
        let content: GeneratedContent = serde_json::from_value(serde_json::json!({
            "name": "Blade",
            "description": "A blade.",
            "files": [{"path": "a.json", "content": "{}"}, {"path": "a.json", "content": "[]"}],
            "evaluation": {
                "complexity": "low", "quality": "ok", "innovation": "some",
                "common": "yes", "summary": "fine"
            }
        }))
        .unwrap();
        assert!(content.texture_size.is_none());
        assert_eq!(content.file_map()["a.json"], "[]");
    }

    #[test]
    fn test_image_transport_failure_keeps_cause() {
        use std::error::Error as _;

        let err = PipelineError::at(
            Stage::ImageSynthesis,
            StageError::ImageGenerationFailed(BackendError::RateLimited { retry_after_secs: 30 }),
        );
        let stage_err = err.source().unwrap();
        let cause = stage_err.source().unwrap();
        assert!(cause.downcast_ref::<BackendError>().is_some());
    }

    #[tokio::test]
    async fn test_channel_sink_survives_dropped_receiver() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        tx.stage(Stage::ContextGathering, "label");
        tx.diagnostic(Stage::QualityCritique, "oops");
    }
}
