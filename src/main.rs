// Entrypoint for the CLI application.
// - Keeps `main` small: read config, start logging, hand off to the loop.
// - Returns `anyhow::Result` so a missing API key exits non-zero with a
//   readable message before any prompt is shown.

use anyhow::Context;
use bible_symbolism_cli::{config::AnalyzerConfig, logging, ui::main_loop};
use tracing::info;

fn main() -> anyhow::Result<()> {
    // Fatal: without a key there is nothing useful to do.
    let config = AnalyzerConfig::from_env()
        .context("set OPENAI_API_KEY in your environment before starting")?;

    // Logging problems are never fatal.
    if let Err(e) = logging::init(&config.log_path) {
        eprintln!("warning: logging disabled: {}", e);
    }
    info!(model = %config.model, base_url = %config.base_url, "starting analyzer");

    // Blocks until the user types `quit` or input ends.
    main_loop(&config)?;
    Ok(())
}
