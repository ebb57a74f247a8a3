#[tokio::main]
async fn main() -> anyhow::Result<()> {
    curvebuy_app::run().await
}
