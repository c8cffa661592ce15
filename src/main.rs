#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = examiner::run().await {
        eprintln!("examiner fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
