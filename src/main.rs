#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = research_librarian_lib::run().await {
        tracing::error!("Research Librarian stopped: {}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
