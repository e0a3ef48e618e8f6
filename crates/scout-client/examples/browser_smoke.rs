/// Smoke-test for the Chromium-backed `PageFetcher`.
///
/// Launches a headless Chromium, fetches <https://example.com>, saves a
/// screenshot, and verifies the rendered HTML contains the expected `<h1>`.
///
/// Run with:
///   cargo run --example browser_smoke
use scout_client::ChromiumSessionFactory;
use scout_core::{FetchOptions, PageFetcher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    println!("Launching headless browser…");
    let mut fetcher =
        PageFetcher::open(ChromiumSessionFactory::new(), FetchOptions::default()).await?;

    let url = "https://example.com";
    let screenshot = std::env::temp_dir().join("scout-smoke.png");
    println!("Fetching {url} …");
    let html = fetcher
        .fetch(url, &screenshot, true)
        .await?
        .expect("markup was requested");

    // Basic sanity checks
    assert!(
        html.contains("<h1>Example Domain</h1>"),
        "Expected <h1> not found in rendered HTML"
    );
    assert!(
        screenshot.is_file(),
        "Screenshot missing at {}",
        screenshot.display()
    );

    let bytes = std::fs::metadata(&screenshot)?.len();
    println!("OK — {} bytes of HTML, {bytes} bytes of PNG", html.len());

    fetcher.close().await;
    Ok(())
}
