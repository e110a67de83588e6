//! Looks up a few DOIs on Crossref through a resilient client and prints the
//! per-API stats afterwards.
//!
//! ```text
//! cargo run --example crossref_lookup -- 10.1038/nature12373 10.1126/science.169.3946.635
//! ```

use lifeline::{FetchError, FetchOptions, ResilientClient};
use std::time::Duration;

const DEFAULT_DOIS: [&str; 2] = ["10.1038/nature12373", "10.1126/science.169.3946.635"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let client = ResilientClient::from_env()?;
    let options = FetchOptions::for_api("crossref").with_timeout(Duration::from_secs(15));

    let args: Vec<String> = std::env::args().skip(1).collect();
    let dois: Vec<&str> = if args.is_empty() {
        DEFAULT_DOIS.to_vec()
    } else {
        args.iter().map(String::as_str).collect()
    };

    for doi in dois {
        let url = format!("https://api.crossref.org/works/{doi}");
        let request = reqwest::Request::new(reqwest::Method::GET, url.parse()?);
        match client.fetch_json::<serde_json::Value>(request, &options).await {
            Ok(work) => println!("{doi}: {}", work["message"]["title"][0]),
            Err(FetchError::CircuitOpen { .. }) => println!("{doi}: crossref circuit is open, skipping"),
            Err(err) => println!("{doi}: {err}"),
        }
    }

    println!("{}", serde_json::to_string_pretty(&client.stats())?);
    Ok(())
}
