//! `PinVault` CLI: command-line client for the `PinVault` server.
//!
//! Talks to the server over its JSON API. The server process holds the
//! session, so `pinvault pin 123` unlocks it for every later command until
//! logout or the inactivity timeout. `strength` and `generate` run locally
//! and need no server.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::{Value, json};

use pinvault_core::recovery::SECURITY_QUESTIONS;
use pinvault_core::strength::{self, CharsetOptions, DEFAULT_GENERATED_LENGTH, StrengthLabel};

// ── ANSI color helpers ───────────────────────────────────────────────

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

// ── CLI structure ────────────────────────────────────────────────────

/// `PinVault`, a PIN-gated credential store.
#[derive(Parser)]
#[command(
    name = "pinvault",
    version,
    about = "PinVault CLI — unlock the vault, manage credentials, check passwords",
    long_about = None,
    after_help = format!(
        "{DIM}Environment variables:{RESET}\n  \
         PINVAULT_ADDR   Server address (default: http://127.0.0.1:8300)\n\n\
         {DIM}Examples:{RESET}\n  \
         pinvault pin 123\n  \
         pinvault add --website github.com --username octo --generate\n  \
         pinvault list --search git\n  \
         pinvault strength 'Tr0ub4dor&3'"
    ),
)]
struct Cli {
    /// PinVault server address.
    #[arg(long, env = "PINVAULT_ADDR", default_value = "http://127.0.0.1:8300")]
    addr: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the gate phase and any current notice.
    Status,
    /// Enter a PIN (setup, unlock, PIN change or recovery step).
    Pin {
        /// The PIN digits.
        pin: String,
    },
    /// Start changing the PIN (vault must be locked).
    #[command(name = "change-pin")]
    ChangePin,
    /// Abandon a PIN change or recovery.
    Cancel,
    /// End the current session.
    Logout,
    /// List credentials.
    List {
        /// Only show records whose website or username contains this text.
        #[arg(long, short)]
        search: Option<String>,
    },
    /// Show one credential.
    Get {
        /// Credential id.
        id: String,
        /// Print the secret in full instead of masked.
        #[arg(long)]
        reveal: bool,
    },
    /// Add a credential.
    Add {
        #[arg(long)]
        website: String,
        #[arg(long)]
        username: String,
        /// The password to store. Omit together with `--generate` to create one.
        #[arg(long, required_unless_present = "generate")]
        secret: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Generate a random secret locally.
        #[arg(long, conflicts_with = "secret")]
        generate: bool,
    },
    /// Change fields of an existing credential.
    Edit {
        /// Credential id.
        id: String,
        #[arg(long)]
        website: Option<String>,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        secret: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Delete a credential.
    Rm {
        /// Credential id.
        id: String,
    },
    /// Show or set the autosave preference.
    Autosave {
        /// `on` or `off`. Omit to show the current value.
        value: Option<Toggle>,
    },
    /// Forgotten-PIN recovery and security questions.
    Recover {
        #[command(subcommand)]
        action: RecoverCommands,
    },
    /// Score a password (offline).
    Strength {
        password: String,
    },
    /// Generate a random password (offline).
    Generate(GenerateArgs),
}

#[derive(Subcommand)]
enum RecoverCommands {
    /// List the security question catalog.
    Questions,
    /// Begin recovery from the lock screen.
    Start,
    /// Submit the recovery email address.
    Email {
        email: String,
    },
    /// Answer two security questions during recovery.
    Answers(AnswerArgs),
    /// Register security answers for future recoveries (vault must be unlocked).
    Register(AnswerArgs),
}

#[derive(Args)]
struct AnswerArgs {
    /// Number of the first question (see `recover questions`).
    #[arg(long)]
    q1: usize,
    /// Answer to the first question.
    #[arg(long)]
    a1: String,
    /// Number of the second question.
    #[arg(long)]
    q2: usize,
    /// Answer to the second question.
    #[arg(long)]
    a2: String,
}

#[derive(Args)]
struct GenerateArgs {
    /// Password length.
    #[arg(long, short, default_value_t = DEFAULT_GENERATED_LENGTH)]
    length: usize,
    #[arg(long)]
    no_uppercase: bool,
    #[arg(long)]
    no_lowercase: bool,
    #[arg(long)]
    no_numbers: bool,
    #[arg(long)]
    no_symbols: bool,
}

impl GenerateArgs {
    fn charset(&self) -> CharsetOptions {
        CharsetOptions {
            uppercase: !self.no_uppercase,
            lowercase: !self.no_lowercase,
            numbers: !self.no_numbers,
            symbols: !self.no_symbols,
        }
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Toggle {
    On,
    Off,
}

// ── Pretty output helpers ────────────────────────────────────────────

fn header(icon: &str, title: &str) {
    println!("{BOLD}{CYAN}{icon} {title}{RESET}");
    println!("{DIM}─────────────────────────────────────────{RESET}");
}

fn kv_line(key: &str, value: &str) {
    println!("  {DIM}{key:<16}{RESET} {WHITE}{value}{RESET}");
}

fn success(msg: &str) {
    println!("{GREEN}{BOLD}✓{RESET} {msg}");
}

fn warning(msg: &str) {
    println!("{YELLOW}{BOLD}⚠{RESET} {YELLOW}{msg}{RESET}");
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("")
}

fn print_outcome(resp: &Value) {
    success(str_field(resp, "message"));
    kv_line("Phase", str_field(resp, "phase"));
}

fn print_record(record: &Value, reveal: bool) {
    let secret = str_field(record, "secret");
    let shown = if reveal {
        secret.to_owned()
    } else {
        strength::mask(secret)
    };
    header("🔑", str_field(record, "website"));
    kv_line("Id", str_field(record, "id"));
    kv_line("Username", str_field(record, "username"));
    kv_line("Secret", &shown);
    if let Some(notes) = record.get("notes").and_then(Value::as_str) {
        kv_line("Notes", notes);
    }
    kv_line("Updated", str_field(record, "updated_at"));
    println!();
}

fn print_strength(password: &str) {
    let report = strength::assess(password);
    let label = report.label.map_or("—", StrengthLabel::as_str);
    let color = if report.score < 3.0 {
        RED
    } else if report.score < 4.0 {
        YELLOW
    } else {
        GREEN
    };
    header("🛡", "Password Strength");
    kv_line("Score", &format!("{color}{:.1}/5 {label}{RESET}", report.score));
    kv_line("Entropy", &format!("{:.1} bits", report.entropy_bits));
    kv_line("Time to crack", &report.crack_time.to_string());
    kv_line("Masked", &strength::mask(password));
    if report.breached {
        warning("This password appears in known breaches.");
    }
    if report.common_pattern {
        warning("Contains a common sequence or repeated characters.");
    }
    println!();
}

// ── HTTP client ──────────────────────────────────────────────────────

struct Client {
    http: reqwest::Client,
    addr: String,
}

impl Client {
    fn new(addr: String) -> Self {
        let http = reqwest::Client::new();
        Self { http, addr }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.addr.trim_end_matches('/'))
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let resp = self
            .http
            .get(self.url(path))
            .send()
            .await
            .context("request failed")?;
        handle_response(resp).await
    }

    async fn get_query(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let resp = self
            .http
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .context("request failed")?;
        handle_response(resp).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let resp = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .context("request failed")?;
        handle_response(resp).await
    }

    async fn put(&self, path: &str, body: &Value) -> Result<Value> {
        let resp = self
            .http
            .put(self.url(path))
            .json(body)
            .send()
            .await
            .context("request failed")?;
        handle_response(resp).await
    }

    async fn delete(&self, path: &str) -> Result<Value> {
        let resp = self
            .http
            .delete(self.url(path))
            .send()
            .await
            .context("request failed")?;
        handle_response(resp).await
    }
}

async fn handle_response(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    if status == reqwest::StatusCode::NO_CONTENT {
        return Ok(Value::Null);
    }
    let body = resp.text().await.context("failed to read response body")?;
    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_owned))
            .unwrap_or(body);
        bail!("server returned {status}: {message}");
    }
    if body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).context("failed to parse response JSON")
}

// ── Command dispatch ─────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let client = Client::new(cli.addr);

    match run(client, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("  {RED}{BOLD}✗ Error:{RESET} {e:#}");
            eprintln!();
            ExitCode::FAILURE
        }
    }
}

async fn run(client: Client, cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Status => cmd_status(&client).await,
        Commands::Pin { pin } => {
            let resp = client.post("/v1/gate/pin", &json!({ "pin": pin })).await?;
            print_outcome(&resp);
            Ok(())
        }
        Commands::ChangePin => gate_action(&client, "/v1/gate/change").await,
        Commands::Cancel => gate_action(&client, "/v1/gate/cancel").await,
        Commands::Logout => gate_action(&client, "/v1/gate/logout").await,
        Commands::List { search } => cmd_list(&client, search.as_deref()).await,
        Commands::Get { id, reveal } => {
            let resp = client.get(&format!("/v1/credentials/{id}")).await?;
            print_record(&resp["record"], reveal);
            Ok(())
        }
        Commands::Add {
            website,
            username,
            secret,
            notes,
            generate,
        } => cmd_add(&client, website, username, secret, notes, generate).await,
        Commands::Edit {
            id,
            website,
            username,
            secret,
            notes,
        } => cmd_edit(&client, &id, website, username, secret, notes).await,
        Commands::Rm { id } => {
            client.delete(&format!("/v1/credentials/{id}")).await?;
            success(&format!("Deleted {id}"));
            Ok(())
        }
        Commands::Autosave { value } => cmd_autosave(&client, value).await,
        Commands::Recover { action } => cmd_recover(&client, action).await,
        Commands::Strength { password } => {
            print_strength(&password);
            Ok(())
        }
        Commands::Generate(args) => {
            let password = strength::generate(args.length, args.charset())?;
            println!("{password}");
            Ok(())
        }
    }
}

// ── Gate commands ────────────────────────────────────────────────────

async fn cmd_status(client: &Client) -> Result<()> {
    let resp = client.get("/v1/gate/status").await?;
    header("🔐", "PinVault Status");
    kv_line("Phase", str_field(&resp, "phase"));
    if let Some(secs) = resp.get("session_expires_in_secs").and_then(Value::as_u64) {
        kv_line("Session expires", &format!("in {}m {}s", secs / 60, secs % 60));
    }
    if let Some(notice) = resp.get("notice").filter(|n| !n.is_null()) {
        kv_line("Notice", str_field(notice, "message"));
    }
    println!();
    Ok(())
}

async fn gate_action(client: &Client, path: &str) -> Result<()> {
    let resp = client.post(path, &json!({})).await?;
    print_outcome(&resp);
    Ok(())
}

// ── Credential commands ──────────────────────────────────────────────

async fn cmd_list(client: &Client, search: Option<&str>) -> Result<()> {
    let resp = match search {
        Some(term) => client.get_query("/v1/credentials", &[("search", term)]).await?,
        None => client.get("/v1/credentials").await?,
    };
    let records = resp
        .get("records")
        .and_then(Value::as_array)
        .context("malformed list response")?;

    if records.is_empty() {
        println!("{DIM}No credentials found.{RESET}");
        return Ok(());
    }
    header("🗂", &format!("Credentials ({})", records.len()));
    for r in records {
        println!(
            "  {DIM}{}{RESET}  {BOLD}{}{RESET}  {}",
            str_field(r, "id"),
            str_field(r, "website"),
            str_field(r, "username"),
        );
    }
    println!();
    Ok(())
}

async fn cmd_add(
    client: &Client,
    website: String,
    username: String,
    secret: Option<String>,
    notes: Option<String>,
    generate: bool,
) -> Result<()> {
    let secret = match secret {
        Some(s) => s,
        None if generate => strength::generate(DEFAULT_GENERATED_LENGTH, CharsetOptions::default())?,
        None => bail!("either --secret or --generate is required"),
    };
    let body = json!({
        "website": website,
        "username": username,
        "secret": secret,
        "notes": notes,
    });
    let resp = client.post("/v1/credentials", &body).await?;
    success(&format!("Added {}", str_field(&resp["record"], "website")));
    print_record(&resp["record"], generate);
    Ok(())
}

async fn cmd_edit(
    client: &Client,
    id: &str,
    website: Option<String>,
    username: Option<String>,
    secret: Option<String>,
    notes: Option<String>,
) -> Result<()> {
    let path = format!("/v1/credentials/{id}");
    let current = client.get(&path).await?;
    let mut record = current
        .get("record")
        .cloned()
        .context("malformed credential response")?;

    apply_edits(
        &mut record,
        [
            ("website", website),
            ("username", username),
            ("secret", secret),
            ("notes", notes),
        ],
    )?;

    let resp = client.put(&path, &record).await?;
    success("Credential updated");
    print_record(&resp["record"], false);
    Ok(())
}

/// Overwrite the given fields of a fetched record, leaving `None` fields alone.
fn apply_edits<const N: usize>(
    record: &mut Value,
    edits: [(&str, Option<String>); N],
) -> Result<()> {
    let fields = record
        .as_object_mut()
        .context("malformed credential response: record is not an object")?;
    for (key, value) in edits {
        if let Some(v) = value {
            fields.insert(key.to_owned(), Value::String(v));
        }
    }
    Ok(())
}

async fn cmd_autosave(client: &Client, value: Option<Toggle>) -> Result<()> {
    let resp = match value {
        Some(toggle) => {
            let enabled = matches!(toggle, Toggle::On);
            client
                .put("/v1/preferences", &json!({ "autosave": enabled }))
                .await?
        }
        None => client.get("/v1/preferences").await?,
    };
    let enabled = resp.get("autosave").and_then(Value::as_bool).unwrap_or(false);
    kv_line("Autosave", if enabled { "on" } else { "off" });
    Ok(())
}

// ── Recovery commands ────────────────────────────────────────────────

async fn cmd_recover(client: &Client, action: RecoverCommands) -> Result<()> {
    match action {
        RecoverCommands::Questions => {
            let resp = client.get("/v1/recovery/questions").await?;
            header("❓", "Security Questions");
            for (i, q) in SECURITY_QUESTIONS.iter().enumerate() {
                println!("  {BOLD}{}{RESET}. {q}", i + 1);
            }
            if resp.get("registered").and_then(Value::as_bool) == Some(true) {
                println!("\n  {DIM}Answers are registered and will be checked.{RESET}");
            }
            println!();
            Ok(())
        }
        RecoverCommands::Start => gate_action(client, "/v1/recovery/start").await,
        RecoverCommands::Email { email } => {
            let resp = client
                .post("/v1/recovery/email", &json!({ "email": email }))
                .await?;
            print_outcome(&resp);
            Ok(())
        }
        RecoverCommands::Answers(args) => {
            let resp = client
                .post("/v1/recovery/answers", &answers_body(&args)?)
                .await?;
            print_outcome(&resp);
            Ok(())
        }
        RecoverCommands::Register(args) => {
            client
                .put("/v1/recovery/questions", &answers_body(&args)?)
                .await?;
            success("Security answers registered");
            Ok(())
        }
    }
}

fn answers_body(args: &AnswerArgs) -> Result<Value> {
    let question = |n: usize| {
        n.checked_sub(1)
            .and_then(|i| SECURITY_QUESTIONS.get(i))
            .copied()
            .with_context(|| {
                format!("question number must be 1-{}", SECURITY_QUESTIONS.len())
            })
    };
    Ok(json!({
        "answers": [
            { "question": question(args.q1)?, "answer": args.a1 },
            { "question": question(args.q2)?, "answer": args.a2 },
        ]
    }))
}
