//! vitals-cli: command-line client for the Campaign Vitals HTTP API
//!
//! # Subcommands
//! - `analyze <file|->`                     evaluate a record, a batch, or free text
//! - `sessions list|show <id>|delete <id>`  inspect or remove trace sessions
//! - `cleanup [--days N] [--dry-run]`       run a retention pass
//! - `export [--output FILE]`               dump every session as JSON
//! - `stats`                                aggregate trace statistics
//! - `status`                               show server health

use std::io::Read;

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "vitals-cli", version, about = "Campaign Vitals command-line client")]
struct Cli {
    /// Vitals HTTP server URL (overrides VITALS_SERVER_URL env var)
    #[arg(long, env = "VITALS_SERVER_URL", default_value = DEFAULT_SERVER)]
    server: String,

    /// Print raw JSON responses
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Evaluate campaign data from a file, or stdin with "-"
    ///
    /// A JSON object is one record, a JSON array (or {"records": [...]}) is a
    /// batch, anything else is treated as free text.
    Analyze {
        input: String,

        /// Session to record the evaluation under
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Inspect trace sessions
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Remove sessions older than the retention window
    Cleanup {
        /// Age in days (server default when omitted)
        #[arg(long)]
        days: Option<u32>,

        /// Report what would be removed without deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Export every session
    Export {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Show trace statistics
    Stats,

    /// Show server status
    Status,
}

#[derive(Debug, Subcommand)]
enum SessionAction {
    /// List sessions, newest first
    List,
    /// Show one session's summary and events
    Show { session_id: String },
    /// Delete one session
    Delete { session_id: String },
}

// ============================================================================
// Input classification
// ============================================================================

#[derive(Debug, PartialEq)]
pub enum AnalyzeInput {
    Record(serde_json::Value),
    Batch(Vec<serde_json::Value>),
    Text(String),
}

/// Decide which endpoint the input belongs to.
pub fn classify_input(raw: &str) -> AnalyzeInput {
    match serde_json::from_str::<serde_json::Value>(raw.trim()) {
        Ok(serde_json::Value::Array(records)) => AnalyzeInput::Batch(records),
        Ok(serde_json::Value::Object(mut obj)) => match obj.remove("records") {
            Some(serde_json::Value::Array(records)) => AnalyzeInput::Batch(records),
            Some(other) => {
                obj.insert("records".to_string(), other);
                AnalyzeInput::Record(serde_json::Value::Object(obj))
            }
            None => AnalyzeInput::Record(serde_json::Value::Object(obj)),
        },
        _ => AnalyzeInput::Text(raw.to_string()),
    }
}

// ============================================================================
// Output formatting
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ResultView {
    pub category: String,
    pub confidence: u8,
    pub reasoning: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
    pub record: RecordView,
}

#[derive(Debug, Deserialize)]
pub struct RecordView {
    pub company_name: String,
}

/// Human label for a category key.
pub fn category_label(key: &str) -> &str {
    match key {
        "healthy" => "🟢 Healthy",
        "might_need_attention" => "🟡 Might Need Attention",
        "need_attention_positive" => "🔵 Needs Attention (opportunity)",
        "need_attention_negative" => "🔴 Needs Attention (risk)",
        other => other,
    }
}

pub fn format_result(result: &ResultView) -> String {
    let mut out = format!(
        "{}: {} ({}% confidence)\n  {}",
        result.record.company_name,
        category_label(&result.category),
        result.confidence,
        result.reasoning
    );
    for rec in &result.recommendations {
        out.push_str(&format!("\n  - {}", rec));
    }
    out
}

/// One line per batch item: the result, or the error kind and message.
pub fn format_item(item: &serde_json::Value) -> String {
    if item["status"] == "ok" {
        match serde_json::from_value::<ResultView>(item["result"].clone()) {
            Ok(result) => format_result(&result),
            Err(e) => format!("(unreadable result: {})", e),
        }
    } else {
        format!(
            "#{} failed [{}]: {}",
            item["index"],
            item["error_kind"].as_str().unwrap_or("?"),
            item["error"].as_str().unwrap_or("")
        )
    }
}

pub fn format_session_row(summary: &serde_json::Value) -> String {
    format!(
        "{:<38} {:<26} {:>3} req {:>3} ok {:>3} err",
        summary["session_id"].as_str().unwrap_or("?"),
        summary["start_time"].as_str().unwrap_or("?"),
        summary["total_requests"],
        summary["total_responses"],
        summary["total_errors"],
    )
}

// ============================================================================
// HTTP Client
// ============================================================================

struct VitalsClient {
    server: String,
    http: reqwest::blocking::Client,
}

impl VitalsClient {
    fn new(server: &str) -> anyhow::Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()?;
        Ok(Self {
            server: server.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn get(&self, path: &str) -> anyhow::Result<serde_json::Value> {
        self.finish(self.http.get(self.url(path)).send(), path)
    }

    fn post(&self, path: &str, body: &serde_json::Value) -> anyhow::Result<serde_json::Value> {
        self.finish(self.http.post(self.url(path)).json(body).send(), path)
    }

    fn delete(&self, path: &str) -> anyhow::Result<serde_json::Value> {
        self.finish(self.http.delete(self.url(path)).send(), path)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.server, path)
    }

    fn finish(
        &self,
        resp: reqwest::Result<reqwest::blocking::Response>,
        path: &str,
    ) -> anyhow::Result<serde_json::Value> {
        let resp = resp.map_err(|e| anyhow::anyhow!("cannot reach {}: {}", self.url(path), e))?;
        let status = resp.status();
        let body: serde_json::Value = resp.json().unwrap_or_default();
        if status.is_success() {
            return Ok(body);
        }
        anyhow::bail!(
            "server returned {} [{}]: {}",
            status,
            body["error_kind"].as_str().unwrap_or("unknown"),
            body["error"].as_str().unwrap_or("no details")
        )
    }
}

// ============================================================================
// Commands
// ============================================================================

fn read_input(input: &str) -> anyhow::Result<String> {
    if input == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read_to_string(input)
            .map_err(|e| anyhow::anyhow!("cannot read {}: {}", input, e))
    }
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn do_analyze(
    client: &VitalsClient,
    input: &str,
    session: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let raw = read_input(input)?;
    let body = match classify_input(&raw) {
        AnalyzeInput::Record(mut record) => {
            if let (Some(obj), Some(id)) = (record.as_object_mut(), &session) {
                obj.insert("session_id".to_string(), serde_json::json!(id));
            }
            let body = client.post("/api/analyze", &record)?;
            if json {
                return print_json(&body);
            }
            let result: ResultView = serde_json::from_value(body["result"].clone())?;
            println!("{}", format_result(&result));
            println!("\nSession: {}", body["session_id"].as_str().unwrap_or("?"));
            return Ok(());
        }
        AnalyzeInput::Batch(records) => client.post(
            "/api/analyze/batch",
            &serde_json::json!({"records": records, "session_id": session}),
        )?,
        AnalyzeInput::Text(text) => client.post(
            "/api/analyze/text",
            &serde_json::json!({"text": text, "session_id": session}),
        )?,
    };

    if json {
        return print_json(&body);
    }
    if let Some(message) = body["message"].as_str() {
        eprintln!("{}", message);
    }
    for item in body["results"].as_array().into_iter().flatten() {
        println!("{}\n", format_item(item));
    }
    println!(
        "{} of {} evaluated. Session: {}",
        body["succeeded"],
        body["total"],
        body["session_id"].as_str().unwrap_or("?")
    );
    Ok(())
}

fn do_sessions(client: &VitalsClient, action: SessionAction, json: bool) -> anyhow::Result<()> {
    match action {
        SessionAction::List => {
            let body = client.get("/api/sessions")?;
            if json {
                return print_json(&body);
            }
            let sessions = body["sessions"].as_array().cloned().unwrap_or_default();
            if sessions.is_empty() {
                eprintln!("No sessions recorded");
            }
            for summary in &sessions {
                println!("{}", format_session_row(summary));
            }
        }
        SessionAction::Show { session_id } => {
            let body = client.get(&format!("/api/sessions/{}", session_id))?;
            if json {
                return print_json(&body);
            }
            println!("{}", format_session_row(&body["summary"]));
            for event in body["session"]["events"].as_array().into_iter().flatten() {
                println!(
                    "  {}  {:<13} {}",
                    event["timestamp"].as_str().unwrap_or("?"),
                    event["content"]["event_type"].as_str().unwrap_or("?"),
                    event["content"]["company_name"].as_str().unwrap_or("")
                );
            }
        }
        SessionAction::Delete { session_id } => {
            let body = client.delete(&format!("/api/sessions/{}", session_id))?;
            if json {
                return print_json(&body);
            }
            if body["deleted"] == true {
                println!("Deleted session {}", session_id);
            } else {
                println!("No session {}", session_id);
            }
        }
    }
    Ok(())
}

fn do_cleanup(
    client: &VitalsClient,
    days: Option<u32>,
    dry_run: bool,
    json: bool,
) -> anyhow::Result<()> {
    let body = client.post(
        "/api/traces/cleanup",
        &serde_json::json!({"max_age_days": days, "dry_run": dry_run}),
    )?;
    if json {
        return print_json(&body);
    }
    let removed = body["removed"].as_array().cloned().unwrap_or_default();
    let verb = if dry_run { "Would remove" } else { "Removed" };
    println!("{} {} session(s), kept {}", verb, removed.len(), body["kept"]);
    for id in &removed {
        println!("  {}", id.as_str().unwrap_or("?"));
    }
    Ok(())
}

fn do_export(client: &VitalsClient, output: Option<String>) -> anyhow::Result<()> {
    let body = client.get("/api/traces/export")?;
    let text = serde_json::to_string_pretty(&body)?;
    match output {
        Some(path) => {
            std::fs::write(&path, text)?;
            eprintln!("Exported {} session(s) to {}", body["total_sessions"], path);
        }
        None => println!("{}", text),
    }
    Ok(())
}

fn do_stats(client: &VitalsClient, json: bool) -> anyhow::Result<()> {
    let body = client.get("/api/traces/stats")?;
    if json {
        return print_json(&body);
    }
    println!("Sessions:   {}", body["total_sessions"]);
    println!("Events:     {}", body["total_events"]);
    println!("Requests:   {}", body["total_requests"]);
    println!("Responses:  {}", body["total_responses"]);
    println!("Errors:     {}", body["total_errors"]);
    println!("Companies:  {}", body["unique_companies"]);
    if let Some(dist) = body["category_distribution"].as_object() {
        for (key, count) in dist {
            println!("  {:<36} {}", category_label(key), count);
        }
    }
    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(client: &VitalsClient, json: bool) -> anyhow::Result<()> {
    let body = client.get("/health")?;
    if json {
        return print_json(&body);
    }
    println!("Vitals server: {}", body["status"].as_str().unwrap_or("unknown"));
    println!("Version:       {}", body["version"].as_str().unwrap_or("?"));
    println!(
        "Provider:      {} ({})",
        body["provider"].as_str().unwrap_or("?"),
        body["model"].as_str().unwrap_or("?")
    );
    println!("Trace store:   {}", body["trace_backend"].as_str().unwrap_or("?"));
    println!("Socket:        {}", body["socket"].as_str().unwrap_or("?"));
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();

    let result = VitalsClient::new(&cli.server).and_then(|client| match cli.command {
        Commands::Analyze { input, session } => do_analyze(&client, &input, session, cli.json),
        Commands::Sessions { action } => do_sessions(&client, action, cli.json),
        Commands::Cleanup { days, dry_run } => do_cleanup(&client, days, dry_run, cli.json),
        Commands::Export { output } => do_export(&client, output),
        Commands::Stats => do_stats(&client, cli.json),
        Commands::Status => do_status(&client, cli.json),
    });

    if let Err(e) = result {
        eprintln!("vitals-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
