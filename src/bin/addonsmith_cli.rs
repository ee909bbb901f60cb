//! AddonSmith CLI
//!
//! Commands: validate, generate, list, show, delete, replace-icon, export,
//! import, versions, ideas
//! Outputs JSON to stdout, progress and logs to stderr
//! Returns 2 when a request is rejected or an operation fails, 1 on usage or
//! configuration errors

use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use addonsmith_core::{
    bundle::{export_file_name, import_archive},
    config::AddonConfig,
    gate::PromptGate,
    pipeline::{PipelineOrchestrator, ProgressEvent},
    prompts::STARTER_IDEAS,
    request::{Request, SUPPORTED_VERSIONS},
    session::Session,
    store::{Artifact, ArtifactStore, FileBackend},
    Bundle, GeminiBackend, ENGINE_VERSION,
};

#[derive(Parser)]
#[command(name = "addonsmith-cli")]
#[command(about = "AddonSmith CLI - Add-on Compiler", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Explicit config file (otherwise ./addonsmith.toml and the user config are used)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory of the saved add-on collection
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Errors only
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a request against the prompt gate
    Validate {
        /// Request text
        #[arg(short, long)]
        text: String,
    },

    /// Generate an add-on from a request
    Generate {
        /// Request text
        #[arg(short, long)]
        text: String,

        /// Platform version (dotted triple)
        #[arg(long)]
        platform: Option<String>,

        /// Save the result under this name
        #[arg(long)]
        save: Option<String>,

        /// Write the exported archive to this path
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// List saved add-ons, newest first
    List,

    /// Show one saved add-on
    Show { id: String },

    /// Delete a saved add-on
    Delete { id: String },

    /// Replace the icon of a saved add-on with an image file
    ReplaceIcon {
        id: String,

        /// Image file (any decodable format)
        #[arg(long)]
        image: PathBuf,
    },

    /// Export a saved add-on as an archive
    Export {
        id: String,

        /// Output path (defaults to a name derived from the add-on)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Read an exported archive back into file contents
    Import {
        file: PathBuf,

        /// Save the imported files under this name
        #[arg(long)]
        save: Option<String>,
    },

    /// List supported platform versions
    Versions,

    /// Curated starter ideas
    Ideas,
}

const IMPORTED_PROMPT: &str = "Add-on imported from an archive file";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.quiet, cli.verbose) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let config = match &cli.config {
        Some(path) => AddonConfig::load_from(path),
        None => AddonConfig::load(),
    };
    let config = match config {
        Ok(c) => c,
        Err(e) => return failure(1, &format!("Failed to load configuration: {e}")),
    };

    let store_dir = cli.store_dir.clone().unwrap_or_else(|| config.store.resolved_dir());

    match cli.command {
        Commands::Validate { text } => {
            let verdict = PromptGate::new().validate(&text);
            emit(&json!({ "verdict": verdict }));
            if verdict.is_accepted() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }

        Commands::Generate { text, platform, save, export } => {
            let version = platform.unwrap_or_else(|| config.general.default_version.clone());
            let request = match Request::new(text, &version) {
                Ok(r) => r,
                Err(e) => return failure(1, &e.to_string()),
            };

            // Refuse before touching the network.
            let verdict = PromptGate::new().validate(&request.text);
            if !verdict.is_accepted() {
                emit(&json!({ "success": false, "verdict": verdict }));
                return ExitCode::from(2);
            }

            let backend = match GeminiBackend::new(config.backend.clone()) {
                Ok(b) => b,
                Err(e) => return failure(1, &e.to_string()),
            };
            let orchestrator = PipelineOrchestrator::new(Arc::new(backend));
            let session = Session::new();

            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ProgressEvent>();
            let debug = config.general.debug;
            let printer = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    match event {
                        ProgressEvent::StageStarted { label, .. } => eprintln!("{label}"),
                        ProgressEvent::Diagnostic { stage, message } if debug => {
                            eprintln!("[debug] {stage}: {message}")
                        }
                        ProgressEvent::Diagnostic { .. } => {}
                    }
                }
            });

            let (outcome, _) = session.generate(&orchestrator, &request, &tx).await;
            drop(tx);
            let _ = printer.await;

            let result = match outcome {
                Ok(result) => result,
                Err(e) => {
                    emit(&json!({
                        "success": false,
                        "stage": e.stage(),
                        "error": e.to_string(),
                    }));
                    return ExitCode::from(2);
                }
            };

            let mut output = json!({
                "success": true,
                "engineVersion": ENGINE_VERSION,
                "result": result,
            });

            if let Some(name) = save {
                let store = match open_store(&store_dir) {
                    Ok(s) => s,
                    Err(code) => return code,
                };
                match store.save(&name, &result, &request) {
                    Ok(artifact) => output["savedId"] = json!(artifact.id),
                    Err(e) => return failure(2, &e.to_string()),
                }
            }

            if let Some(path) = export {
                if let Err(e) = Bundle::from_result(&result).write_to(&path) {
                    return failure(2, &e.to_string());
                }
                output["exportedTo"] = json!(path);
            }

            emit(&output);
            ExitCode::SUCCESS
        }

        Commands::List => {
            let store = match open_store(&store_dir) {
                Ok(s) => s,
                Err(code) => return code,
            };
            match store.list() {
                Ok(artifacts) => {
                    let listed: Vec<_> = artifacts.iter().map(summary).collect();
                    emit(&json!(listed));
                    ExitCode::SUCCESS
                }
                Err(e) => failure(2, &e.to_string()),
            }
        }

        Commands::Show { id } => {
            let store = match open_store(&store_dir) {
                Ok(s) => s,
                Err(code) => return code,
            };
            match store.get(&id) {
                Ok(artifact) => {
                    emit(&json!(artifact));
                    ExitCode::SUCCESS
                }
                Err(e) => failure(2, &e.to_string()),
            }
        }

        Commands::Delete { id } => {
            let store = match open_store(&store_dir) {
                Ok(s) => s,
                Err(code) => return code,
            };
            match store.delete(&id) {
                Ok(removed) => {
                    emit(&json!({ "success": true, "removed": removed }));
                    ExitCode::SUCCESS
                }
                Err(e) => failure(2, &e.to_string()),
            }
        }

        Commands::ReplaceIcon { id, image } => {
            let bytes = match std::fs::read(&image) {
                Ok(b) => b,
                Err(e) => return failure(1, &format!("Cannot read {}: {e}", image.display())),
            };
            let store = match open_store(&store_dir) {
                Ok(s) => s,
                Err(code) => return code,
            };
            match store.replace_icon(&id, &bytes) {
                Ok(artifact) => {
                    emit(&json!({ "success": true, "artifact": summary(&artifact) }));
                    ExitCode::SUCCESS
                }
                Err(e) => failure(2, &e.to_string()),
            }
        }

        Commands::Export { id, out } => {
            let store = match open_store(&store_dir) {
                Ok(s) => s,
                Err(code) => return code,
            };
            let artifact = match store.get(&id) {
                Ok(a) => a,
                Err(e) => return failure(2, &e.to_string()),
            };
            let path = out.unwrap_or_else(|| PathBuf::from(export_file_name(Some(&artifact.name))));
            let bundle = artifact.bundle();
            match bundle.write_to(&path) {
                Ok(()) => {
                    emit(&json!({ "success": true, "path": path, "entries": bundle.len() }));
                    ExitCode::SUCCESS
                }
                Err(e) => failure(2, &e.to_string()),
            }
        }

        Commands::Import { file, save } => {
            let bytes = match std::fs::read(&file) {
                Ok(b) => b,
                Err(e) => return failure(1, &format!("Cannot read {}: {e}", file.display())),
            };
            let result = match import_archive(&bytes) {
                Ok(r) => r,
                Err(e) => return failure(2, &e.to_string()),
            };

            let mut output = json!({ "success": true, "files": result.files });
            if let Some(name) = save {
                let request = match Request::new(IMPORTED_PROMPT, &config.general.default_version) {
                    Ok(r) => r,
                    Err(e) => return failure(1, &e.to_string()),
                };
                let store = match open_store(&store_dir) {
                    Ok(s) => s,
                    Err(code) => return code,
                };
                match store.save(&name, &result, &request) {
                    Ok(artifact) => output["savedId"] = json!(artifact.id),
                    Err(e) => return failure(2, &e.to_string()),
                }
            }
            emit(&output);
            ExitCode::SUCCESS
        }

        Commands::Versions => {
            emit(&json!({
                "default": config.general.default_version,
                "versions": SUPPORTED_VERSIONS,
            }));
            ExitCode::SUCCESS
        }

        Commands::Ideas => {
            let ideas: Vec<_> = STARTER_IDEAS
                .iter()
                .map(|(title, text)| json!({ "title": title, "text": text }))
                .collect();
            emit(&json!(ideas));
            ExitCode::SUCCESS
        }
    }
}

fn init_tracing(quiet: bool, verbose: bool) -> Result<(), String> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("ADDONSMITH_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| format!("failed to initialize tracing subscriber: {error}"))
}

fn open_store(dir: &Path) -> Result<ArtifactStore<FileBackend>, ExitCode> {
    FileBackend::open(dir)
        .map(ArtifactStore::new)
        .map_err(|e| failure(1, &format!("Cannot open store at {}: {e}", dir.display())))
}

fn summary(artifact: &Artifact) -> serde_json::Value {
    json!({
        "id": artifact.id,
        "name": artifact.name,
        "prompt": artifact.prompt,
        "version": artifact.version.to_string(),
        "createdAt": artifact.created_at,
        "contentHash": artifact.content_hash,
        "files": artifact.result.files.len(),
        "hasIcon": artifact.icon.is_some(),
    })
}

fn emit(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(_) => println!("{value}"),
    }
}

fn failure(code: u8, message: &str) -> ExitCode {
    emit(&json!({ "success": false, "error": message }));
    ExitCode::from(code)
}
