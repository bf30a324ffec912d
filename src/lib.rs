// Library root
// -----------
// This crate exposes a small library surface for the CLI. The binary
// (`main.rs`) uses these modules to run the interactive analyzer.
//
// Module responsibilities:
// - `config`: Startup configuration read once from the environment.
// - `error`: Error types; only config errors are fatal.
// - `logging`: File-based tracing setup.
// - `api`: The `CompletionService` seam and the blocking HTTP client for
//   an OpenAI-compatible chat completions endpoint.
// - `analysis`: Prompt template, section table and response parsing.
// - `render`: Colored terminal output of an analysis.
// - `ui`: The interactive input loop that ties the rest together.
pub mod analysis;
pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod render;
pub mod ui;
