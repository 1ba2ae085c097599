#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = proctora_rust::run().await {
        eprintln!("proctora-rust fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
