use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = tally_app::config::configure();
    let snapshot = config.snapshot();

    let ax = tally_app::build(config).await?;

    let host = snapshot.get_or("http.host", "127.0.0.1");
    let port = snapshot.get_or("http.port", "3040");
    let addr = format!("{host}:{port}");

    println!("[tally] listening on http://{addr}");

    ax.listen(addr).await?;

    Ok(())
}
