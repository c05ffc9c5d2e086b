mod agent;
mod auth;
mod bus;
mod channels;
mod cli;
mod config;
mod cron;
mod dispatcher;
mod episodic;
mod errors;
mod gateway;
mod heartbeat;
mod llm_gateway;
mod logging;
mod pairing;
mod perf;
mod providers;
mod safety;
mod session;
mod storage;
mod utils;
mod vector_store;

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,whatsapp_rust=warn".parse().unwrap());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    cli::run().await
}
