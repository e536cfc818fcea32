//! taskview - task view server
//!
//! Serves each member's task list, stats and project filters out of a
//! SQLite task store, one company per API token.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use taskview::api;
use taskview::clock::SystemClock;
use taskview::config::{self, Config};
use taskview::db::Database;
use taskview::engine::{DueClass, Filter, FilterAction, SortBy, TaskViewEngine, ViewFilters, ViewMode};
use taskview::models::{Priority, Status};

#[derive(Parser)]
#[command(name = "taskview")]
#[command(about = "Task view server: per-member task lists, filters and due-date stats")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address (overrides config)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Generate a new API token bound to a member
    Token {
        /// Name/label for the token
        #[arg(short, long)]
        name: Option<String>,

        /// Member the token acts as
        #[arg(long)]
        member: Option<String>,

        /// Company the member belongs to
        #[arg(long)]
        company: Option<String>,

        /// List all configured tokens
        #[arg(long)]
        list: bool,

        /// Revoke a token by name
        #[arg(long)]
        revoke: Option<String>,

        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Initialize a new config file
    Init {
        /// Output path for config file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print a member's task view from the local database
    Tasks {
        #[arg(long)]
        member: String,

        #[arg(long)]
        company: String,

        /// Case-insensitive match on title or description
        #[arg(short, long)]
        search: Option<String>,

        /// To-Do, "In Progress" or Done
        #[arg(long)]
        status: Option<String>,

        /// low, medium or high
        #[arg(long)]
        priority: Option<String>,

        /// Project id
        #[arg(long)]
        project: Option<String>,

        /// dueDate, priority, project or status
        #[arg(long, default_value = "dueDate")]
        sort_by: String,

        /// all, today, overdue or upcoming
        #[arg(long, default_value = "all")]
        view: String,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("taskview=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, port, bind } => {
            let mut cfg = load_config(config)?;

            // Override with CLI args
            if let Some(p) = port {
                cfg.server.port = p;
            }
            if let Some(b) = bind {
                cfg.server.bind = b;
            }

            run_server(cfg).await
        }

        Commands::Token {
            name,
            member,
            company,
            list,
            revoke,
            config,
        } => {
            let config_path = match config {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if list {
                return list_tokens(&config_path);
            }
            if let Some(token_name) = revoke {
                return revoke_token(&config_path, &token_name);
            }

            let (Some(member), Some(company)) = (member, company) else {
                anyhow::bail!("--member and --company are required to generate a token");
            };
            issue_token(&config_path, name, member, company)
        }

        Commands::Init { output } => {
            let path = output.unwrap_or_else(|| PathBuf::from("config.toml"));
            let cfg = Config::default();
            cfg.save_to(&path)?;

            println!("Created config file: {}", path.display());
            println!();
            println!("Next steps:");
            println!("  1. Generate a token: taskview token --name laptop --member <id> --company <id>");
            println!(
                "  2. Start the server: taskview serve --config {}",
                path.display()
            );

            Ok(())
        }

        Commands::Tasks {
            member,
            company,
            search,
            status,
            priority,
            project,
            sort_by,
            view,
            config,
        } => {
            let cfg = load_config(config)?;
            let filters = ViewFilters::default().reduce_all([
                FilterAction::SetSearch(search.unwrap_or_default()),
                FilterAction::SetStatus(Filter::from(status.map(Status::from))),
                FilterAction::SetPriority(Filter::from(
                    priority.as_deref().map(parse_priority).transpose()?,
                )),
                FilterAction::SetProject(Filter::from(project)),
                FilterAction::SetSortBy(parse_keyword::<SortBy>(&sort_by)?),
                FilterAction::SetViewMode(parse_keyword::<ViewMode>(&view)?),
            ]);
            print_tasks(&cfg, &member, &company, &filters)
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(&path),
        None => Config::load(),
    }
}

async fn run_server(config: Config) -> Result<()> {
    let db = Database::open(&config.database.path).context("Failed to open database")?;

    let state = api::AppState::new(db, config.clone(), Arc::new(SystemClock))?;
    let app = api::create_router(state);

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("taskview server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn print_tasks(cfg: &Config, member: &str, company: &str, filters: &ViewFilters) -> Result<()> {
    let db = Database::open(&cfg.database.path).context("Failed to open database")?;
    let tasks = db.list_tasks(company)?;
    let engine = TaskViewEngine::new(&SystemClock, &cfg.view.settings()?);
    let view = engine.view(&tasks, member, company, filters);

    let s = view.stats;
    println!(
        "{} tasks: {} done, {} in progress, {} to do | {} overdue, {} due today",
        s.total, s.completed, s.in_progress, s.todo, s.overdue, s.due_today
    );
    if !view.projects.is_empty() {
        println!("Projects: {}", view.projects.join(", "));
    }
    println!();

    if view.tasks.is_empty() {
        println!("No matching tasks.");
        return Ok(());
    }

    for entry in &view.tasks {
        let marker = match entry.due {
            DueClass::Overdue => "!",
            DueClass::DueToday => "*",
            DueClass::Normal => " ",
        };
        let due = entry
            .task
            .due_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "no due date".to_string());
        println!(
            "{} [{:<11}] {:<6} {}  ({})",
            marker, entry.task.status, entry.task.priority, entry.task.title, due
        );
    }

    Ok(())
}

fn parse_priority(raw: &str) -> Result<Priority> {
    parse_keyword(raw)
}

// Reuses the serde wire names so the CLI and the query string agree.
fn parse_keyword<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .with_context(|| format!("Unrecognized value: {raw}"))
}

fn list_tokens(config_path: &PathBuf) -> Result<()> {
    if !config_path.exists() {
        println!("No config file found at {}", config_path.display());
        println!("Run 'taskview init' to create one.");
        return Ok(());
    }

    let cfg = Config::load_from(config_path)?;
    if cfg.tokens.is_empty() {
        println!("No tokens configured.");
        println!("Generate one with: taskview token --name <label> --member <id> --company <id>");
        return Ok(());
    }

    println!("Configured tokens:");
    println!();
    for token in &cfg.tokens {
        println!(
            "  {} - {}@{} - {}",
            token.name,
            token.member_id,
            token.company_id,
            hash_preview(&token.token_hash)
        );
    }
    Ok(())
}

/// First 20 characters of a stored token hash
fn hash_preview(token_hash: &str) -> String {
    let mut chars = token_hash.chars();
    let head: String = chars.by_ref().take(20).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

fn revoke_token(config_path: &PathBuf, token_name: &str) -> Result<()> {
    if !config_path.exists() {
        println!("No config file found at {}", config_path.display());
        return Ok(());
    }

    let mut cfg = Config::load_from(config_path)?;
    let original_len = cfg.tokens.len();
    cfg.tokens.retain(|t| t.name != token_name);

    if cfg.tokens.len() == original_len {
        println!("Token '{}' not found.", token_name);
    } else {
        cfg.save_to(config_path)?;
        println!("Revoked token '{}'.", token_name);
    }
    Ok(())
}

fn issue_token(
    config_path: &PathBuf,
    name: Option<String>,
    member_id: String,
    company_id: String,
) -> Result<()> {
    let token = generate_token();
    let label = name.unwrap_or_else(|| "default".to_string());
    let token_hash = config::hash_token(&token)?;

    if config_path.exists() {
        let mut cfg = Config::load_from(config_path)?;

        if cfg.tokens.iter().any(|t| t.name == label) {
            println!(
                "Token '{}' already exists. Use --revoke first to replace it.",
                label
            );
            return Ok(());
        }

        cfg.tokens.push(config::TokenConfig {
            name: label.clone(),
            token_hash,
            member_id: member_id.clone(),
            company_id: company_id.clone(),
        });
        cfg.save_to(config_path)?;

        println!("Generated API token '{}' for {}@{}\n", label, member_id, company_id);
        println!("Token: {}\n", token);
    } else {
        println!("Generated API token '{}':\n", label);
        println!("Token: {}\n", token);
        println!("Add this to your server's config.toml:\n");
        println!("  [[tokens]]");
        println!("  name = \"{}\"", label);
        println!("  token_hash = \"{}\"", token_hash);
        println!("  member_id = \"{}\"", member_id);
        println!("  company_id = \"{}\"\n", company_id);
    }
    println!("Send it as: Authorization: Bearer <token>");
    println!("Save this token now - it cannot be retrieved later!");

    Ok(())
}

fn generate_token() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();

    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

    let token_body: String = bytes
        .iter()
        .map(|b| ALPHABET[(*b as usize) % ALPHABET.len()] as char)
        .collect();

    format!("tv_{}", token_body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_preview_truncates_on_char_boundaries() {
        assert_eq!(hash_preview("short"), "short");
        assert_eq!(hash_preview(&"a".repeat(20)), "a".repeat(20));
        assert_eq!(hash_preview(&"b".repeat(25)), format!("{}...", "b".repeat(20)));

        let legacy = format!("{}é{}", "x".repeat(19), "y".repeat(5));
        assert_eq!(hash_preview(&legacy), format!("{}é...", "x".repeat(19)));
    }
}
