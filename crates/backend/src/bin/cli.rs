use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use shared_types::{
    AnalyzeResponse, BatchAnnotateResponse, DraftReply, DraftReplyResponse, EmailSummary,
    ExtractResponse, RegisterUserRequest, SendDraftResponse, SyncResponse, UserResponse,
    UserStatusResponse,
};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "interview-cli")]
#[command(about = "CLI for the interview assistant backend API")]
#[command(
    long_about = "A command-line interface for the interview assistant server.\n\n\
    Registers mailbox owners, syncs their Gmail inbox, classifies and extracts\n\
    interview invitations, and drafts and sends replies."
)]
struct Cli {
    /// Backend server URL to connect to.
    #[arg(
        short,
        long,
        default_value = "http://localhost:3000",
        env = "INTERVIEW_API_URL"
    )]
    base_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register users, check their status and sync their mailbox
    Users {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Analyze a stored email, extract its details or draft a reply
    Emails {
        #[command(subcommand)]
        action: EmailAction,
    },
    /// Send generated drafts
    Drafts {
        #[command(subcommand)]
        action: DraftAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// List registered users
    List,

    /// Register a user with tokens from a completed OAuth flow
    ///
    /// Registering again with the same Google id refreshes the stored
    /// tokens; an omitted refresh token keeps the stored one.
    Register {
        /// Stable Google account id
        #[arg(long)]
        google_id: String,

        /// Mailbox address
        #[arg(long)]
        email: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long, env = "GMAIL_ACCESS_TOKEN")]
        access_token: String,

        #[arg(long, env = "GMAIL_REFRESH_TOKEN")]
        refresh_token: Option<String>,

        /// Access token lifetime in seconds
        #[arg(long)]
        expires_in: Option<i64>,
    },

    /// Show Gmail connection state, email counts and sync watermark
    Status { id: Uuid },

    /// Fetch new messages from Gmail
    ///
    /// The first sync looks back a fixed number of days; later syncs start
    /// at the day of the previous one.
    Sync {
        id: Uuid,

        /// Maximum number of messages to list
        #[arg(short, long)]
        max_results: Option<u32>,
    },

    /// List the most recent stored emails
    Emails {
        id: Uuid,

        #[arg(short, long, default_value_t = 10)]
        limit: i64,
    },

    /// Classify recent emails and extract the interview invitations
    Annotate {
        id: Uuid,

        #[arg(short, long)]
        limit: Option<i64>,
    },
}

#[derive(Subcommand)]
enum EmailAction {
    /// Decide whether an email is an interview invitation
    Analyze { id: Uuid },

    /// Extract interview details into the email's invitation
    Extract { id: Uuid },

    /// Generate a reply draft
    Reply {
        id: Uuid,

        #[arg(short, long, value_enum, default_value_t = ToneArg::Professional)]
        tone: ToneArg,
    },

    /// List drafts generated for an email, newest first
    Drafts { id: Uuid },
}

#[derive(Subcommand)]
enum DraftAction {
    /// Send a draft to the sender of the original email
    Send { id: Uuid },
}

#[derive(Clone, Copy, ValueEnum)]
enum ToneArg {
    Professional,
    Friendly,
    Formal,
}

impl ToneArg {
    fn as_str(&self) -> &'static str {
        match self {
            ToneArg::Professional => "professional",
            ToneArg::Friendly => "friendly",
            ToneArg::Formal => "formal",
        }
    }
}

/// Error body returned by the server
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    message: String,
}

/// Send a request and decode the JSON body, turning error responses into errors.
async fn fetch<T: DeserializeOwned>(request: RequestBuilder) -> anyhow::Result<T> {
    let response = request.send().await.context("Request to backend failed")?;
    let status = response.status();

    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => anyhow!("{} ({}): {}", status, body.error, body.message),
            Err(_) => anyhow!("{}: {}", status, text),
        });
    }

    response.json().await.context("Failed to parse response")
}

fn short(id: &Uuid) -> String {
    id.to_string()[..8].to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base_url = cli.base_url.trim_end_matches('/');

    match cli.command {
        Commands::Users { action } => handle_users(&client, base_url, action).await?,
        Commands::Emails { action } => handle_emails(&client, base_url, action).await?,
        Commands::Drafts { action } => handle_drafts(&client, base_url, action).await?,
    }

    Ok(())
}

async fn handle_users(client: &Client, base_url: &str, action: UserAction) -> anyhow::Result<()> {
    let url = format!("{}/api/users", base_url);

    match action {
        UserAction::List => {
            let users: Vec<UserResponse> = fetch(client.get(&url)).await?;
            if users.is_empty() {
                println!("No users registered.");
            }
            for user in users {
                let synced = user
                    .last_sync_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!("[{}] {} (last sync: {})", short(&user.id), user.email, synced);
            }
        }
        UserAction::Register {
            google_id,
            email,
            name,
            access_token,
            refresh_token,
            expires_in,
        } => {
            let req = RegisterUserRequest {
                google_id,
                email,
                name,
                access_token,
                refresh_token,
                expires_in,
            };
            let user: UserResponse = fetch(client.post(&url).json(&req)).await?;
            println!("Registered user: {} {}", user.id, user.email);
        }
        UserAction::Status { id } => {
            let status: UserStatusResponse =
                fetch(client.get(format!("{}/{}/status", url, id))).await?;
            println!("{}", status.email);
            println!(
                "  Gmail: {}",
                if status.gmail_connected {
                    "connected"
                } else if status.token_expired {
                    "token expired"
                } else {
                    "not connected"
                }
            );
            println!(
                "  Emails: {} ({} interview)",
                status.total_emails, status.interview_emails
            );
            match status.sync_info.last_sync_at {
                Some(at) => println!("  Last sync: {}", at.to_rfc3339()),
                None => println!("  Last sync: never (next sync is the initial one)"),
            }
        }
        UserAction::Sync { id, max_results } => {
            let mut request = client.post(format!("{}/{}/sync", url, id));
            if let Some(max) = max_results {
                request = request.query(&[("max_results", max)]);
            }
            let result: SyncResponse = fetch(request).await?;
            println!(
                "{:?} sync ({}): {} new, {} already stored, {} failed",
                result.sync_type, result.query, result.synced_count, result.skipped, result.failed
            );
        }
        UserAction::Emails { id, limit } => {
            let emails: Vec<EmailSummary> = fetch(
                client
                    .get(format!("{}/{}/emails", url, id))
                    .query(&[("limit", limit)]),
            )
            .await?;
            if emails.is_empty() {
                println!("No emails stored.");
            }
            for email in emails {
                let marker = if email.is_interview_related { "★" } else { " " };
                println!("{} [{}] {} - {}", marker, short(&email.id), email.sender, email.subject);
                if let Some(preview) = &email.body_preview {
                    println!("    {}", preview.replace('\n', " "));
                }
            }
        }
        UserAction::Annotate { id, limit } => {
            let mut request = client.post(format!("{}/{}/annotate", url, id));
            if let Some(limit) = limit {
                request = request.query(&[("limit", limit)]);
            }
            let result: BatchAnnotateResponse = fetch(request).await?;
            println!(
                "Examined {}: {} interviews, {} extracted, {} errors",
                result.examined, result.interviews, result.extracted, result.errors
            );
        }
    }

    Ok(())
}

async fn handle_emails(client: &Client, base_url: &str, action: EmailAction) -> anyhow::Result<()> {
    let url = format!("{}/api/emails", base_url);

    match action {
        EmailAction::Analyze { id } => {
            let result: AnalyzeResponse = fetch(client.post(format!("{}/{}/analyze", url, id))).await?;
            println!(
                "{}: {} (confidence {}, {:?})",
                result.subject,
                if result.is_interview {
                    "interview invitation"
                } else {
                    "not an interview"
                },
                result.confidence,
                result.method
            );
        }
        EmailAction::Extract { id } => {
            let result: ExtractResponse = fetch(client.post(format!("{}/{}/extract", url, id))).await?;
            let inv = result.invitation;
            println!("Invitation [{}] ({:?})", short(&inv.id), result.status);
            let rows = [
                ("Company", inv.company_name),
                ("Position", inv.position),
                ("Date", inv.interview_date.map(|d| d.to_string())),
                ("Time", inv.interview_time),
                ("Location", inv.interview_location),
                ("Type", inv.interview_type),
                ("Interviewer", inv.interviewer_name),
            ];
            for (label, value) in rows {
                if let Some(value) = value {
                    println!("  {}: {}", label, value);
                }
            }
            println!("  Confidence: {}", inv.confidence_score);
        }
        EmailAction::Reply { id, tone } => {
            let result: DraftReplyResponse = fetch(
                client
                    .post(format!("{}/{}/reply", url, id))
                    .query(&[("tone", tone.as_str())]),
            )
            .await?;
            if result.auto_extracted {
                println!("(interview details extracted automatically)");
            }
            print_draft(&result.draft);
        }
        EmailAction::Drafts { id } => {
            let drafts: Vec<DraftReply> = fetch(client.get(format!("{}/{}/drafts", url, id))).await?;
            if drafts.is_empty() {
                println!("No drafts for this email.");
            }
            for draft in &drafts {
                print_draft(draft);
            }
        }
    }

    Ok(())
}

async fn handle_drafts(client: &Client, base_url: &str, action: DraftAction) -> anyhow::Result<()> {
    match action {
        DraftAction::Send { id } => {
            let result: SendDraftResponse =
                fetch(client.post(format!("{}/api/drafts/{}/send", base_url, id))).await?;
            println!(
                "Sent draft [{}] as message {}",
                short(&result.draft.id),
                result.provider_message_id
            );
        }
    }

    Ok(())
}

fn print_draft(draft: &DraftReply) {
    let status = if draft.is_sent { "sent" } else { "draft" };
    println!("[{}] {} ({}, {})", short(&draft.id), draft.subject, draft.tone, status);
    for line in draft.body.lines() {
        println!("    {}", line);
    }
}
