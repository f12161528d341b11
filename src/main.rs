#[tokio::main]
async fn main() {
    if let Err(e) = connect_copilot::run().await {
        eprintln!("[connect-copilot] {e}");
        std::process::exit(1);
    }
}
