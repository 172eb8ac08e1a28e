//! CLI handler for recording commands.
//!
//! All commands communicate with the running service via the HTTP API.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde_json::Value;

use crate::cli::args::{CliCommand, StartCliArgs};
use crate::coordinator::{StartResponse, StatusResponse, StopResponse};

const CONNECT_ERROR: &str = "Failed to connect to meetcap service. Is it running?";

pub async fn handle_recording_command(command: CliCommand, port: u16) -> Result<()> {
    let base_url = format!("http://127.0.0.1:{}", port);
    match command {
        CliCommand::Start(args) => start_recording(&base_url, args).await,
        CliCommand::Stop => stop_recording(&base_url).await,
        CliCommand::Status => show_status(&base_url).await,
        CliCommand::Serve | CliCommand::Version => Ok(()),
    }
}

async fn start_recording(base_url: &str, args: StartCliArgs) -> Result<()> {
    let client = reqwest::Client::new();
    let mut body = serde_json::Map::new();
    if let Some(target) = &args.target {
        body.insert("targetId".to_string(), Value::String(target.clone()));
    }

    let response = client
        .post(format!("{}/start", base_url))
        .json(&body)
        .send()
        .await
        .context(CONNECT_ERROR)?;

    let json: Value = response.json().await?;
    let result: StartResponse = serde_json::from_value(json.clone())
        .map_err(|_| anyhow::anyhow!("{}", error_message(&json)))?;

    if !result.success {
        bail!(
            "Failed to start recording: {}",
            result.error.as_deref().unwrap_or("Unknown error")
        );
    }

    println!("Recording started");
    Ok(())
}

async fn stop_recording(base_url: &str) -> Result<()> {
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/stop", base_url))
        .send()
        .await
        .context(CONNECT_ERROR)?;

    let json: Value = response.json().await?;
    let result: StopResponse = serde_json::from_value(json.clone())
        .map_err(|_| anyhow::anyhow!("{}", error_message(&json)))?;

    if !result.success {
        bail!("Failed to stop recording");
    }

    println!("Recording stopped. The file will appear in your download directory.");
    Ok(())
}

async fn show_status(base_url: &str) -> Result<()> {
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/status", base_url))
        .send()
        .await
        .context(CONNECT_ERROR)?;

    let json: Value = response.json().await?;
    let status: StatusResponse = serde_json::from_value(json.clone())
        .map_err(|_| anyhow::anyhow!("{}", error_message(&json)))?;

    if status.is_recording {
        let elapsed = status
            .start_time
            .map(|start| Utc::now().timestamp_millis() - start)
            .unwrap_or(0);
        println!("Recording ({})", status.phase.as_str());
        println!("Elapsed: {}", format_elapsed(elapsed));
    } else {
        println!("Not recording (status: {})", status.phase.as_str());
    }

    if let Some(error) = &status.last_error {
        println!("Last error: {}", error);
    }

    Ok(())
}

fn error_message(json: &Value) -> String {
    json.get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("Unexpected response from service")
        .to_string()
}

/// `HH:MM:SS` for a duration in milliseconds; negative clamps to zero.
pub fn format_elapsed(elapsed_ms: i64) -> String {
    let total = elapsed_ms.max(0) / 1000;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}
