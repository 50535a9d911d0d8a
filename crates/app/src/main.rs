use std::fmt;
use std::sync::Arc;

use exam_core::model::{Difficulty, ItemId, UserId};
use services::{
    Clock, CompletionOutcome, ExamLoopService, HttpAnswerSink, NoopAnswerSink, RecoveryAction,
    RemoteAnswerSink, SyncConfig,
};
use storage::repository::{ItemRecord, Storage};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidUserId { raw: String },
    InvalidSize { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidUserId { raw } => write!(f, "invalid --user-id value: {raw}"),
            ArgsError::InvalidSize { raw } => write!(f, "invalid --size value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- seed [--db <sqlite_url>]");
    eprintln!(
        "  cargo run -p app -- demo [--db <sqlite_url>] [--user-id <id>] [--size <n>] [--category <name>]"
    );
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:exam.sqlite3");
    eprintln!("  --user-id 1");
    eprintln!("  --size 5");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAM_DB_URL, EXAM_USER_ID, EXAM_SYNC_URL, EXAM_SYNC_TOKEN, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Seed,
    Demo,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "seed" => Some(Self::Seed),
            "demo" => Some(Self::Demo),
            _ => None,
        }
    }
}

struct Args {
    db_url: String,
    user_id: UserId,
    size: usize,
    category: Option<String>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("EXAM_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://exam.sqlite3".into(), normalize_sqlite_url);
        let mut user_id = std::env::var("EXAM_USER_ID")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map_or_else(|| UserId::new(1), UserId::new);
        let mut size = 5_usize;
        let mut category = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--user-id" => {
                    let value = require_value(args, "--user-id")?;
                    let parsed: u64 = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidUserId { raw: value.clone() })?;
                    user_id = UserId::new(parsed);
                }
                "--size" => {
                    let value = require_value(args, "--size")?;
                    size = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidSize { raw: value.clone() })?;
                }
                "--category" => {
                    category = Some(require_value(args, "--category")?);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            user_id,
            size,
            category,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn demo_catalog() -> Vec<ItemRecord> {
    let entries: [(u64, &str, &str, Difficulty, &str, u32); 8] = [
        (1, "math", "fractions", Difficulty::Easy, "What is 1/2 + 1/4?", 1),
        (2, "math", "fractions", Difficulty::Medium, "What is 2/3 of 18?", 0),
        (3, "math", "algebra", Difficulty::Medium, "Solve 3x + 2 = 11.", 2),
        (4, "math", "algebra", Difficulty::Hard, "Solve x^2 - 5x + 6 = 0.", 1),
        (5, "reading", "main-idea", Difficulty::Easy, "Which sentence states the main idea?", 0),
        (6, "reading", "inference", Difficulty::Medium, "What can be inferred about the author?", 2),
        (7, "reading", "vocabulary", Difficulty::Medium, "Closest meaning of 'arid'?", 1),
        (8, "reading", "inference", Difficulty::Hard, "Why does the narrator hesitate?", 0),
    ];

    entries
        .iter()
        .map(|(id, category, topic, difficulty, prompt, correct)| ItemRecord {
            id: ItemId::new(*id),
            category: (*category).to_string(),
            topic: (*topic).to_string(),
            difficulty: *difficulty,
            prompt: (*prompt).to_string(),
            options: vec![
                "option A".to_string(),
                "option B".to_string(),
                "option C".to_string(),
            ],
            figure: None,
            correct_option: *correct,
        })
        .collect()
}

async fn run_seed(storage: &Storage) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = demo_catalog();
    for record in &catalog {
        storage.items.upsert_item(record).await?;
    }
    println!("seeded {} items", catalog.len());
    Ok(())
}

async fn run_demo(
    storage: &Storage,
    user_id: UserId,
    category: Option<&str>,
    size: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let sink: Arc<dyn RemoteAnswerSink> = match SyncConfig::from_env() {
        Some(config) => Arc::new(HttpAnswerSink::new(Some(config))),
        None => {
            tracing::info!("EXAM_SYNC_URL not set; answers stay in the local buffer only");
            Arc::new(NoopAnswerSink)
        }
    };

    let service = ExamLoopService::new(
        Clock::default_clock(),
        Arc::clone(&storage.items),
        Arc::clone(&storage.exposures),
        Arc::clone(&storage.spool),
        Arc::clone(&storage.results),
        sink,
    );

    let mut session = service.start_session(user_id, category, size).await?;
    println!(
        "session {}: {} items ({} fresh, {} repeats)",
        session.id(),
        session.plan().len(),
        session.plan().fresh_selected(),
        session.plan().repeat_selected(),
    );

    while let Some(item) = session.current_item().cloned() {
        // scripted choice so the demo is repeatable end to end
        let option_count = item.content().option_count() as u64;
        let option = u32::try_from(item.id().value() % option_count).unwrap_or(0);

        println!("  [{}] {} -> option {}", item.id(), item.content().prompt(), option);
        service.submit_answer(&mut session, item.id(), option).await?;

        if let Some(prompt) = service.pump(&mut session).await? {
            println!(
                "  delivery of item {} failed after {} attempts; answer kept locally, skipping",
                prompt.item_id, prompt.attempts
            );
            service
                .resolve(&mut session, prompt.item_id, RecoveryAction::Skip)
                .await?;
        }
    }

    loop {
        match service.complete_session(&mut session).await? {
            CompletionOutcome::Completed(done) => {
                println!(
                    "score: {} ({} correct of {} sent)",
                    done.score.score(),
                    done.score.correct(),
                    done.score.total(),
                );
                break;
            }
            CompletionOutcome::NeedsDecision(prompt) => {
                println!(
                    "  item {} still undelivered after {} attempts; skipping",
                    prompt.item_id, prompt.attempts
                );
                service
                    .resolve(&mut session, prompt.item_id, RecoveryAction::Skip)
                    .await?;
            }
        }
    }

    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    let cmd = match argv.first().map(String::as_str) {
        None | Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };
    argv.remove(0);

    let mut iter = argv.into_iter();
    let parsed = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    // Open + migrate SQLite in the binary glue so core/services stay pure.
    prepare_sqlite_file(&parsed.db_url)?;
    let storage = Storage::sqlite(&parsed.db_url).await?;

    match cmd {
        Command::Seed => run_seed(&storage).await,
        Command::Demo => {
            run_demo(
                &storage,
                parsed.user_id,
                parsed.category.as_deref(),
                parsed.size,
            )
            .await
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
