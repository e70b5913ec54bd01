use ome_provider::{init_logging, serve, OmeProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    serve(OmeProvider::new()).await
}
