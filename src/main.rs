#[tokio::main]
async fn main() {
    if let Err(e) = erx_lib::run().await {
        eprintln!("erx: {e}");
        std::process::exit(1);
    }
}
