//! advisor - command-line client for advisord
//!
//! Submits photos, keeps a local history of results and pages through the
//! generated improvement steps.

use std::io::{self, BufRead, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use advisord::analysis::{report, Category};
use advisord::client::AdvisorClient;
use advisord::images::SessionStamp;
use advisord::session::{ClientState, History, Session};
use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_SERVER: &str = "http://127.0.0.1:3000";

/// Urban space advisor client
#[derive(Parser, Debug)]
#[command(name = "advisor", version, about = "Analyze urban spaces with advisord")]
struct Args {
    /// History file (defaults to ~/.advisor/history.json)
    #[arg(long, global = true, env = "ADVISOR_HISTORY")]
    history: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a photo and save the result to history
    Analyze {
        image: PathBuf,

        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,

        /// Generate one combined image instead of one per recommendation
        #[arg(long)]
        single_shot: bool,

        /// Request timeout in seconds
        #[arg(long, default_value_t = 600)]
        timeout: u64,
    },

    /// Inspect stored sessions
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Page through the steps of a stored session
    Browse {
        id: i64,

        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryAction {
    List,
    Show { id: i64 },
    Delete { id: i64 },
    /// Write the plain-text analysis report
    Report {
        id: i64,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "advisord=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();
    let history_path = args.history.unwrap_or_else(default_history_path);

    match args.command {
        Command::Analyze {
            image,
            server,
            single_shot,
            timeout,
        } => analyze(&history_path, image, &server, !single_shot, timeout).await,
        Command::History { action } => history(&history_path, action).await,
        Command::Browse { id, server } => browse(&history_path, id, &server).await,
    }
}

fn default_history_path() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_default()
        .join(".advisor")
        .join("history.json")
}

async fn analyze(
    history_path: &Path,
    image: PathBuf,
    server: &str,
    incremental: bool,
    timeout: u64,
) -> Result<()> {
    let client = AdvisorClient::new(server, Duration::from_secs(timeout))?;

    let state = ClientState::new().select(image.clone())?;
    if !tokio::fs::try_exists(&image).await.unwrap_or(false) {
        bail!("Image not found: {}", image.display());
    }
    let state = state.preview_loaded()?.submit()?;

    println!(
        "Analyzing {} ({} visualization)...",
        image.display(),
        if incremental { "step-by-step" } else { "single-shot" }
    );
    let result = client
        .analyze_file(&image, incremental)
        .await
        .map(|response| Session::from_response(&image, response))
        .map_err(|e| e.to_string());

    let state = state.settle(result)?;
    if let Some(error) = state.error() {
        bail!("Analysis failed: {}", error);
    }
    let session = state
        .session()
        .ok_or_else(|| anyhow!("analysis settled without a session"))?
        .clone();

    print_session(&session, client.base_url());

    let mut history = History::load(history_path).await;
    history.insert(session.clone());
    history.save(history_path).await?;
    println!("\nSaved as session {}", session.id);

    Ok(())
}

async fn history(history_path: &Path, action: HistoryAction) -> Result<()> {
    let mut history = History::load(history_path).await;

    match action {
        HistoryAction::List => {
            if history.is_empty() {
                println!("No sessions yet.");
            }
            for session in history.iter() {
                println!(
                    "{}  {}  {} steps  {}",
                    session.id,
                    session.created_at.format("%Y-%m-%d %H:%M"),
                    session.steps.len(),
                    session.original_image
                );
            }
        }
        HistoryAction::Show { id } => {
            let session = find(&history, id)?;
            print_session(session, "");
        }
        HistoryAction::Delete { id } => {
            history
                .remove(SessionStamp::from_millis(id))
                .ok_or_else(|| anyhow!("No session {}", id))?;
            history.save(history_path).await?;
            println!("Deleted session {}", id);
        }
        HistoryAction::Report { id, out } => {
            let session = find(&history, id)?;
            let text = report::render(&session.analysis, session.created_at);
            match out {
                Some(path) => {
                    tokio::fs::write(&path, text).await?;
                    println!("Report written to {}", path.display());
                }
                None => print!("{}", text),
            }
        }
    }

    Ok(())
}

async fn browse(history_path: &Path, id: i64, server: &str) -> Result<()> {
    let history = History::load(history_path).await;
    let session = find(&history, id)?.clone();
    let base = server.trim_end_matches('/').to_string();

    let mut state = ClientState::new().load_from_history(session)?;
    println!("Commands: n (next), p (previous), j <category> (j alone lists them), q (quit)");
    show_step(&state, &base);

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.lock().read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim();
        let (command, rest) = input.split_once(' ').unwrap_or((input, ""));
        state = match command {
            "" => continue,
            "q" | "quit" => break,
            "n" | "next" => state.next()?,
            "p" | "prev" | "previous" => state.previous()?,
            "j" | "jump" if rest.trim().is_empty() => {
                println!("Categories: {}", Category::all_labels());
                continue;
            }
            "j" | "jump" => {
                let category = Category::parse(rest);
                let before = state.cursor();
                let next = state.jump_to_category(category)?;
                if next.cursor() == before {
                    println!("No step for {}", category);
                }
                next
            }
            other => {
                println!("Unknown command: {}", other);
                continue;
            }
        };
        show_step(&state, &base);
    }

    Ok(())
}

fn find(history: &History, id: i64) -> Result<&Session> {
    history
        .get(SessionStamp::from_millis(id))
        .ok_or_else(|| anyhow!("No session {}", id))
}

fn show_step(state: &ClientState, base: &str) {
    let (Some(session), Some(cursor), Some(url)) =
        (state.session(), state.cursor(), state.active_image_url())
    else {
        return;
    };

    match session.steps.get(cursor.index()) {
        Some(step) => {
            println!(
                "Step {}/{}: [{}] {}",
                cursor.index() + 1,
                cursor.len(),
                step.category,
                step.description
            );
            println!("  Benefits: {}", step.benefits);
        }
        None => println!("Final visualization"),
    }
    println!("  Image: {}{}", base, url);
}

fn print_session(session: &Session, base: &str) {
    let analysis = &session.analysis;
    println!("\n{}", analysis.overall_description);
    if analysis.is_degraded() {
        println!("(structured analysis unavailable; see the report for the full text)");
    }

    if !analysis.identified_issues.is_empty() {
        println!("\nIssues:");
        for issue in &analysis.identified_issues {
            println!("  - [{}] {}", issue.category, issue.details);
        }
    }

    println!("\nImprovements:");
    for (i, step) in session.steps.iter().enumerate() {
        println!("  {}. [{}] {}", i + 1, step.category, step.description);
        println!("     {}{}", base, step.image.url());
    }
    println!("\nFinal image: {}{}", base, session.final_image.url());
}
