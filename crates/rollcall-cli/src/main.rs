use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reqwest::multipart::{Form, Part};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall student face registry CLI")]
struct Cli {
    /// Base URL of the rollcalld service
    #[arg(long, env = "ROLLCALL_URL", default_value = "http://127.0.0.1:5000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the face(s) in a JPEG image
    Register {
        image: PathBuf,
        /// Student name
        #[arg(short, long)]
        name: Option<String>,
        /// Student identifier, used as the registry key
        #[arg(short = 'i', long)]
        student_id: Option<String>,
    },
    /// Find the registered student matching a JPEG image
    Match { image: PathBuf },
    /// List registered students
    List,
    /// Show service status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let response = match cli.command {
        Commands::Register {
            image,
            name,
            student_id,
        } => {
            let mut form = Form::new().part("image", image_part(&image).await?);
            if let Some(name) = name {
                form = form.text("name", name);
            }
            if let Some(id) = student_id {
                form = form.text("student_id", id);
            }
            client.post(format!("{base}/register")).multipart(form)
        }
        Commands::Match { image } => {
            let form = Form::new().part("image", image_part(&image).await?);
            client.post(format!("{base}/match")).multipart(form)
        }
        Commands::List => client.get(format!("{base}/students")),
        Commands::Status => client.get(format!("{base}/status")),
    }
    .send()
    .await
    .with_context(|| format!("connecting to {base}"))?;

    let status = response.status();
    let text = response.text().await.context("reading response body")?;
    tracing::debug!(%status, bytes = text.len(), "response received");

    println!("{}", render_body(&text)?);
    if !status.is_success() {
        bail!("request failed with {status}");
    }
    Ok(())
}

/// Pretty-print JSON bodies; anything else (e.g. a plain-text 413) is shown as sent.
fn render_body(text: &str) -> Result<String> {
    match serde_json::from_str::<Value>(text) {
        Ok(json) => Ok(serde_json::to_string_pretty(&json)?),
        Err(_) => Ok(text.to_string()),
    }
}

async fn image_part(path: &Path) -> Result<Part> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image.jpg".to_string());
    Ok(Part::bytes(data).file_name(file_name).mime_str("image/jpeg")?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_json_body_pretty() {
        let rendered = render_body(r#"{"code":"NO_MATCH"}"#).unwrap();
        assert_eq!(rendered, "{\n  \"code\": \"NO_MATCH\"\n}");
    }

    #[test]
    fn test_render_plain_text_body_verbatim() {
        assert_eq!(render_body("length limit exceeded").unwrap(), "length limit exceeded");
        assert_eq!(render_body("").unwrap(), "");
    }
}
