#[tokio::main]
async fn main() {
    engine::telemetry::init_tracing();

    if let Err(err) = cli::run().await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
