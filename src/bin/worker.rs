#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = proctora_rust::run_worker().await {
        eprintln!("proctora-worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
