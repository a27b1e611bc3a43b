//! CLI command implementations.

pub mod jobs;
pub mod schedules;

use anyhow::{Result, bail};
use serde_json::Value;

/// Turn a response into JSON, surfacing API errors with their body.
pub(crate) async fn check(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    if !status.is_success() {
        bail!("API error ({status}): {text}");
    }
    if text.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

/// Process due schedules now.
pub async fn trigger(api_url: &str, secret: &str) -> Result<()> {
    let client = reqwest::Client::new();
    let body = check(
        client
            .post(format!("{api_url}/internal/scheduler/run"))
            .header("x-postline-secret", secret)
            .send()
            .await?,
    )
    .await?;
    println!(
        "due: {}, started: {}, failed: {}",
        body["due"], body["started"], body["failed"]
    );
    Ok(())
}
