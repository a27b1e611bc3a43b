//! Schedule commands.

use anyhow::Result;
use serde_json::json;

use super::check;

pub async fn list(api_url: &str) -> Result<()> {
    let client = reqwest::Client::new();
    let body = check(
        client
            .get(format!("{api_url}/api/v1/schedules"))
            .send()
            .await?,
    )
    .await?;
    let empty = Vec::new();
    for schedule in body.as_array().unwrap_or(&empty) {
        let enabled = if schedule["enabled"].as_bool().unwrap_or(false) {
            "on"
        } else {
            "off"
        };
        println!(
            "{}  [{}] {:<24} next: {}",
            schedule["id"].as_str().unwrap_or("-"),
            enabled,
            schedule["name"].as_str().unwrap_or("-"),
            schedule["next_run_at"].as_str().unwrap_or("-"),
        );
    }
    Ok(())
}

pub async fn show(api_url: &str, id: &str) -> Result<()> {
    let client = reqwest::Client::new();
    let body = check(
        client
            .get(format!("{api_url}/api/v1/schedules/{id}"))
            .send()
            .await?,
    )
    .await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

pub async fn enable(api_url: &str, id: &str, enabled: bool) -> Result<()> {
    let client = reqwest::Client::new();
    let body = check(
        client
            .put(format!("{api_url}/api/v1/schedules/{id}"))
            .json(&json!({ "enabled": enabled }))
            .send()
            .await?,
    )
    .await?;
    println!(
        "{} enabled: {}",
        body["name"].as_str().unwrap_or("-"),
        body["enabled"],
    );
    Ok(())
}

pub async fn delete(api_url: &str, id: &str) -> Result<()> {
    let client = reqwest::Client::new();
    check(
        client
            .delete(format!("{api_url}/api/v1/schedules/{id}"))
            .send()
            .await?,
    )
    .await?;
    println!("deleted {id}");
    Ok(())
}
