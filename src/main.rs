use clap::Parser;
use dotenv::dotenv;
use log::error;
use std::error::Error;
use workflow_agent::cli::Args;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Err(e) = workflow_agent::run(args).await {
        error!("Fatal: {}", e);
        return Err(e);
    }
    Ok(())
}
