use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    coop_killfeed_lib::run(coop_killfeed_lib::Cli::parse()).await
}
