#[tokio::main]
async fn main() {
    if let Err(err) = cm_api::run().await {
        tracing::error!(error = %err, "cm-api failed");
        std::process::exit(1);
    }
}
