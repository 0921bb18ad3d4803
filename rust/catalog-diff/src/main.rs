use catalog_diff::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();
    catalog_diff::run().await
}
