mod api;
mod cli;
mod error;
mod findings;
mod logging;
mod metrics;
mod model;
mod orchestrator;
mod registry;
mod retry;
mod runner;
mod session;
mod storage;
mod summary;
mod text_summary;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    logging::init(args.log_level.as_deref(), args.json);
    let is_json = args.json;

    match cli::run(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            if is_json {
                println!("{}", serde_json::json!({"event": "error", "message": format!("{e:#}")}));
                std::process::exit(1);
            } else {
                Err(e)
            }
        }
    }
}
