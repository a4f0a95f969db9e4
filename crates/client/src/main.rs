// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, error};

use rahnum_client::{ApiClient, ApiRequest, ClientConfig, FileStore, FormData};

/// Command-line client for the Rahnum API.
#[derive(Parser)]
#[command(name = "rahnum", version)]
struct Cli {
    #[command(flatten)]
    client: ClientConfig,

    /// Log format (json or text).
    #[arg(long, env = "RAHNUM_LOG_FORMAT", default_value = "text")]
    log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "RAHNUM_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and persist the session
    Login {
        #[arg(long, env = "RAHNUM_USERNAME")]
        username: String,
        #[arg(long, env = "RAHNUM_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Print the cached user profile
    Whoami,
    /// Print the session state and time to expiry
    Status,
    /// Send an authenticated request and print the response body
    Request {
        /// HTTP method (GET, POST, PUT, DELETE, ...)
        method: String,
        /// Endpoint path under the API root (e.g. /profile/)
        path: String,
        /// JSON request body
        #[arg(long)]
        data: Option<String>,
    },
    /// POST a multipart form
    Upload {
        /// Endpoint path under the API root
        path: String,
        /// Text field as name=value (repeatable)
        #[arg(long = "text", value_parser = parse_pair)]
        texts: Vec<(String, String)>,
        /// File field as name=path (repeatable)
        #[arg(long = "file", value_parser = parse_pair)]
        files: Vec<(String, String)>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(cli).await {
        Ok(output) => print_json(&output),
        Err(e) => {
            error!("fatal: {e:#}");
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing(cli: &Cli) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));

    // Logs go to stderr so stdout stays pipeable JSON.
    match cli.log_format.as_str() {
        "json" => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).json().init();
        }
        _ => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<Value> {
    let path = cli.client.credentials_path();
    debug!(path = %path.display(), "opening credential store");
    let store = FileStore::open(&path)
        .with_context(|| format!("open credential store {}", path.display()))?;
    let client = ApiClient::new(&cli.client, Arc::new(store))?;

    match cli.command {
        Command::Login { username, password } => {
            let body = client
                .login(&json!({ "username": username, "password": password }))
                .await?;
            Ok(body.get("user").cloned().unwrap_or(json!({ "logged_in": true })))
        }
        Command::Logout => {
            client.logout();
            Ok(json!({ "logged_out": true }))
        }
        Command::Whoami => client.cached_profile().context("not logged in"),
        Command::Status => {
            let session = client.session();
            Ok(json!({
                "state": session.state(),
                "expires_in_ms": session.millis_until_expiry(),
            }))
        }
        Command::Request { method, path, data } => {
            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .with_context(|| format!("invalid method: {method}"))?;
            let mut request = ApiRequest::new(method, path);
            if let Some(data) = data {
                let body: Value = serde_json::from_str(&data).context("--data is not valid JSON")?;
                request = request.json(body);
            }
            Ok(client.dispatch(request).await?)
        }
        Command::Upload { path, texts, files } => {
            let mut form = FormData::new();
            for (name, value) in texts {
                form = form.text(name, value);
            }
            for (name, file) in files {
                let bytes = tokio::fs::read(&file)
                    .await
                    .with_context(|| format!("read {file}"))?;
                form = form.file(name, file_name(Path::new(&file)), bytes);
            }
            Ok(client.post_form(&path, form).await?)
        }
    }
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_owned(), value.to_owned())),
        _ => Err(format!("expected name=value, got {raw:?}")),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(_) => println!("{value}"),
    }
}
