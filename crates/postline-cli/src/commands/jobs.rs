//! Job commands.

use anyhow::Result;
use serde_json::{Value, json};

use super::check;

pub async fn list(
    api_url: &str,
    status: Option<String>,
    category: Option<String>,
    limit: i64,
) -> Result<()> {
    let client = reqwest::Client::new();
    let mut request = client
        .get(format!("{api_url}/api/v1/jobs"))
        .query(&[("limit", limit.to_string())]);
    if let Some(status) = status {
        request = request.query(&[("status", status)]);
    }
    if let Some(category) = category {
        request = request.query(&[("category", category)]);
    }

    let body = check(request.send().await?).await?;
    let empty = Vec::new();
    let jobs = body["jobs"].as_array().unwrap_or(&empty);
    for job in jobs {
        println!(
            "{}  {:<15} {:>3}%  {}",
            job["id"].as_str().unwrap_or("-"),
            job["status"].as_str().unwrap_or("-"),
            job["progress"].as_i64().unwrap_or(0),
            job["topic"].as_str().unwrap_or("-"),
        );
    }
    println!("total: {}", body["total"]);
    Ok(())
}

pub async fn show(api_url: &str, id: &str) -> Result<()> {
    let client = reqwest::Client::new();
    let body = check(
        client
            .get(format!("{api_url}/api/v1/jobs/{id}"))
            .send()
            .await?,
    )
    .await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

pub async fn logs(api_url: &str, id: &str) -> Result<()> {
    let client = reqwest::Client::new();
    let body = check(
        client
            .get(format!("{api_url}/api/v1/jobs/{id}/logs"))
            .send()
            .await?,
    )
    .await?;
    let empty = Vec::new();
    for entry in body.as_array().unwrap_or(&empty) {
        println!(
            "{}  [{}/{}] {}",
            entry["created_at"].as_str().unwrap_or("-"),
            entry["step"].as_str().unwrap_or("-"),
            entry["status"].as_str().unwrap_or("-"),
            entry["message"].as_str().unwrap_or(""),
        );
    }
    Ok(())
}

pub async fn create(
    api_url: &str,
    topic: &str,
    category: &str,
    template: Option<String>,
) -> Result<()> {
    let client = reqwest::Client::new();
    let body = check(
        client
            .post(format!("{api_url}/api/v1/jobs"))
            .json(&json!({
                "topic": topic,
                "category": category,
                "template": template,
            }))
            .send()
            .await?,
    )
    .await?;
    println!(
        "created {} ({})",
        body["id"].as_str().unwrap_or("-"),
        body["status"].as_str().unwrap_or("-"),
    );
    Ok(())
}

pub async fn review(
    api_url: &str,
    id: &str,
    decision: &str,
    feedback: Option<String>,
) -> Result<()> {
    let client = reqwest::Client::new();
    let body = check(
        client
            .post(format!("{api_url}/api/v1/jobs/{id}/review"))
            .json(&json!({
                "decision": decision,
                "feedback": feedback,
            }))
            .send()
            .await?,
    )
    .await?;
    print_status(&body);
    Ok(())
}

pub async fn deploy(api_url: &str, id: &str, approve: bool) -> Result<()> {
    let client = reqwest::Client::new();
    let body = check(
        client
            .post(format!("{api_url}/api/v1/jobs/{id}/deploy"))
            .json(&json!({ "approve": approve }))
            .send()
            .await?,
    )
    .await?;
    print_status(&body);
    Ok(())
}

pub async fn resume(api_url: &str, id: &str) -> Result<()> {
    let client = reqwest::Client::new();
    let body = check(
        client
            .post(format!("{api_url}/api/v1/jobs/{id}/resume"))
            .send()
            .await?,
    )
    .await?;
    print_status(&body);
    Ok(())
}

fn print_status(job: &Value) {
    println!(
        "{} is now {}",
        job["id"].as_str().unwrap_or("-"),
        job["status"].as_str().unwrap_or("-"),
    );
}
