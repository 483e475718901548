mod cli;
mod cmd;
mod command;
mod config;
mod isolation;
mod logger;
mod prompt;
mod spinner;

use anyhow::Result;
use tracing::{error, info};

fn main() -> Result<()> {
    logger::init()?;
    info!(args = ?std::env::args().collect::<Vec<_>>(), "calf start");

    match cli::run() {
        Ok(result) => {
            info!("calf finished successfully");
            Ok(result)
        }
        Err(err) => {
            error!(error = ?err, "calf failed");
            Err(err)
        }
    }
}
