mod config;

use std::fmt;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use quiz_core::model::{CategoryId, Question, TestId, UserId};
use services::{
    Clock, Direction, DriverHandle, HttpRemoteStore, InMemoryRemoteStore, LifecycleEvent,
    PersistenceAdapter, QuizEngine, RemoteResultStore, ResultSubmitter, SessionCommand,
    SessionDriver, SessionEnd, SessionEvent,
};
use storage::json::JsonQuestionBank;
use storage::repository::Storage;
use tokio::sync::broadcast;
use tracing_subscriber::{EnvFilter, fmt as log_fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, normalize_sqlite_url, prepare_sqlite_file};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    UnknownArg(String),
    InvalidId { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
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

fn parse_id(args: &mut impl Iterator<Item = String>, flag: &'static str) -> Result<u64, ArgsError> {
    let value = require_value(args, flag)?;
    value
        .trim()
        .parse()
        .map_err(|_| ArgsError::InvalidId { flag, raw: value })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  quiz take    --category <id> --test <id> [--db <sqlite_url>] [--questions <file>]");
    eprintln!("               [--user <id>] [--remote <base_url>]");
    eprintln!("  quiz history --category <id> --test <id> [--db <sqlite_url>]");
    eprintln!("  quiz list    [--questions <file>]");
    eprintln!();
    eprintln!("While taking a test:");
    eprintln!("  answer <question> <option>   e.g. `answer 3 b`");
    eprintln!("  next | prev | goto <question> | submit | quit");
    eprintln!("  bg | fg                      simulate moving to the background and back");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_DB_URL, QUIZ_QUESTIONS, QUIZ_USER_ID, QUIZ_REMOTE_URL,");
    eprintln!("  QUIZ_REMOTE_API_KEY, QUIZ_SUBMIT_ATTEMPTS, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Take,
    History,
    List,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "take" => Some(Self::Take),
            "history" => Some(Self::History),
            "list" => Some(Self::List),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Args {
    config: Config,
    category_id: Option<CategoryId>,
    test_id: Option<TestId>,
}

impl Args {
    fn parse(
        mut config: Config,
        args: &mut impl Iterator<Item = String>,
    ) -> Result<Self, ArgsError> {
        let mut category_id = None;
        let mut test_id = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    config.db_url = normalize_sqlite_url(value);
                }
                "--questions" => {
                    config.questions_path = PathBuf::from(require_value(args, "--questions")?);
                }
                "--user" => config.user_id = UserId::new(parse_id(args, "--user")?),
                "--remote" => {
                    let url = require_value(args, "--remote")?;
                    let mut remote = config
                        .remote
                        .take()
                        .unwrap_or_else(|| services::HttpRemoteConfig::new(url.clone()));
                    remote.base_url = url;
                    config.remote = Some(remote);
                }
                "--category" => category_id = Some(CategoryId::new(parse_id(args, "--category")?)),
                "--test" => test_id = Some(TestId::new(parse_id(args, "--test")?)),
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            config,
            category_id,
            test_id,
        })
    }

    fn target(&self) -> Result<(CategoryId, TestId), ArgsError> {
        let category = self
            .category_id
            .ok_or(ArgsError::MissingFlag { flag: "--category" })?;
        let test = self.test_id.ok_or(ArgsError::MissingFlag { flag: "--test" })?;
        Ok((category, test))
    }
}

//
// ─── INPUT ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    Command(SessionCommand),
    Lifecycle(LifecycleEvent),
}

/// Parse one line typed during a test. Question numbers are 1-based and
/// options may be given as letters or 1-based numbers.
fn parse_input(line: &str) -> Option<Input> {
    let mut words = line.split_whitespace();
    let verb = words.next()?.to_ascii_lowercase();
    let input = match verb.as_str() {
        "answer" | "a" => {
            let question = parse_position(words.next()?)?;
            let option = parse_option(words.next()?)?;
            Input::Command(SessionCommand::Select { question, option })
        }
        "next" | "n" => Input::Command(SessionCommand::Navigate(Direction::Next)),
        "prev" | "p" => Input::Command(SessionCommand::Navigate(Direction::Previous)),
        "goto" | "g" => {
            let index = parse_position(words.next()?)?;
            Input::Command(SessionCommand::Navigate(Direction::Jump(index)))
        }
        "submit" | "s" => Input::Command(SessionCommand::Submit),
        "quit" | "q" => Input::Command(SessionCommand::Quit),
        "bg" => Input::Lifecycle(LifecycleEvent::Suspended),
        "fg" => Input::Lifecycle(LifecycleEvent::Resumed),
        _ => return None,
    };
    if words.next().is_some() {
        return None;
    }
    Some(input)
}

fn parse_position(raw: &str) -> Option<usize> {
    raw.parse::<usize>().ok()?.checked_sub(1)
}

fn parse_option(raw: &str) -> Option<usize> {
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), None) if letter.is_ascii_alphabetic() => {
            Some(usize::from(letter.to_ascii_lowercase() as u8 - b'a'))
        }
        _ => parse_position(raw),
    }
}

fn spawn_input_reader(handle: DriverHandle) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            let delivered = match parse_input(&line) {
                Some(Input::Command(command)) => handle.send_blocking(command),
                Some(Input::Lifecycle(event)) => handle.lifecycle_blocking(event),
                None => {
                    eprintln!("unrecognized input: {line}");
                    true
                }
            };
            if !delivered {
                return;
            }
        }
        // stdin closed: abandon the attempt
        let _ = handle.send_blocking(SessionCommand::Quit);
    });
}

//
// ─── OUTPUT ────────────────────────────────────────────────────────────────────
//

/// Render seconds as `mm:ss`.
fn format_remaining(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

fn print_question(questions: &[Question], index: usize) {
    let Some(question) = questions.get(index) else {
        return;
    };
    println!();
    println!("Question {}/{}: {}", index + 1, questions.len(), question.text());
    for (i, option) in question.options().iter().enumerate() {
        let letter = char::from(b'a' + u8::try_from(i % 26).unwrap_or(0));
        println!("  {letter}) {option}");
    }
}

/// Print session events until the session ends.
///
/// Stops on the terminal event rather than on channel close: the remote
/// sync task holds a sender and may outlive the session by a long way.
fn spawn_event_printer(
    mut events: broadcast::Receiver<SessionEvent>,
    questions: Vec<Question>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let finished = matches!(
                event,
                SessionEvent::Completed { .. } | SessionEvent::Quit | SessionEvent::Error { .. }
            );
            match event {
                SessionEvent::Started { .. }
                | SessionEvent::AnswerSelected { .. }
                | SessionEvent::Completed { .. }
                | SessionEvent::RemoteSynced { .. }
                | SessionEvent::RemoteSyncFailed { .. } => {}
                SessionEvent::Navigated { index } => print_question(&questions, index),
                SessionEvent::ReadyToSubmit => {
                    println!("Last question reached. Type `submit` to finish.");
                }
                SessionEvent::Tick { remaining_seconds } => {
                    if remaining_seconds % 30 == 0 && remaining_seconds > 0 {
                        println!("[{} left]", format_remaining(remaining_seconds));
                    }
                }
                SessionEvent::LowTime { remaining_seconds } => {
                    println!("Hurry up: {} left", format_remaining(remaining_seconds));
                }
                SessionEvent::Expired => println!("Time is up."),
                SessionEvent::Suspended { remaining_seconds } => {
                    println!("Paused at {}.", format_remaining(remaining_seconds));
                }
                SessionEvent::Resumed { remaining_seconds } => {
                    println!("Resumed with {} left.", format_remaining(remaining_seconds));
                }
                SessionEvent::Error { message } => eprintln!("error: {message}"),
                SessionEvent::CommandRejected { reason } => eprintln!("{reason}"),
                SessionEvent::Quit => println!("Test abandoned. Nothing was recorded."),
            }
            if finished {
                break;
            }
        }
    })
}

//
// ─── COMMANDS ──────────────────────────────────────────────────────────────────
//

fn remote_store(config: &Config) -> Result<Arc<dyn RemoteResultStore>, Box<dyn std::error::Error>> {
    match &config.remote {
        Some(remote) => {
            tracing::info!(base_url = %remote.base_url, "remote sync enabled");
            Ok(Arc::new(HttpRemoteStore::new(remote.clone())?))
        }
        None => {
            tracing::info!("no remote configured, results are kept locally");
            Ok(Arc::new(InMemoryRemoteStore::new()))
        }
    }
}

async fn take(args: &Args, storage: &Storage) -> Result<(), Box<dyn std::error::Error>> {
    let (category_id, test_id) = args.target()?;
    let config = &args.config;
    let bank = JsonQuestionBank::from_path(&config.questions_path)?;
    let submitter = ResultSubmitter::new(remote_store(config)?).with_retry_policy(config.retry_policy());
    let engine = QuizEngine::new(Arc::new(bank), PersistenceAdapter::new(storage), submitter)
        .with_clock(Clock::default_clock());

    let mut session = engine.new_session(config.user_id);
    session.start(category_id, test_id).await?;

    let questions = session.questions().to_vec();
    println!(
        "{} ({} questions, {})",
        session.title().unwrap_or("Quiz"),
        questions.len(),
        format_remaining(session.remaining_seconds())
    );
    print_question(&questions, 0);
    let printer = spawn_event_printer(session.subscribe(), questions);

    let (mut driver, handle) = SessionDriver::new(session, 16);
    spawn_input_reader(handle);
    let end = driver.run().await;
    drop(driver);
    let _ = printer.await;

    match end {
        SessionEnd::Completed { record, remote } => {
            println!();
            println!(
                "Score {}/{}: {} correct, {} incorrect, {} unattempted, time {}",
                record.score(),
                record.total_questions(),
                record.correct_count(),
                record.incorrect_count(),
                record.unattempted_count(),
                format_remaining(record.time_taken_seconds())
            );
            match remote.outcome().await {
                Ok(_) => println!("Result synced."),
                Err(err) => {
                    tracing::warn!(error = %err, "remote sync failed");
                    eprintln!("Result saved locally; remote sync failed: {err}");
                }
            }
            Ok(())
        }
        SessionEnd::Quit => Ok(()),
        SessionEnd::Failed(err) => Err(err.into()),
    }
}

async fn history(args: &Args, storage: &Storage) -> Result<(), Box<dyn std::error::Error>> {
    let (category_id, test_id) = args.target()?;
    let persistence = PersistenceAdapter::new(storage);
    let records = persistence.history(category_id, test_id).await?;
    if records.is_empty() {
        println!("No attempts recorded for category {category_id}, test {test_id}.");
        return Ok(());
    }
    for record in records.iter().rev() {
        println!(
            "{}  {}/{}  time {}  ({} incorrect, {} unattempted)",
            record.created_at().format("%Y-%m-%d %H:%M"),
            record.score(),
            record.total_questions(),
            format_remaining(record.time_taken_seconds()),
            record.incorrect_count(),
            record.unattempted_count()
        );
    }
    Ok(())
}

fn list(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let bank = JsonQuestionBank::from_path(&args.config.questions_path)?;
    for (category_id, test_id, title) in bank.list_tests() {
        println!("{category_id}/{test_id}  {title}");
    }
    Ok(())
}

fn init_tracing(config: &Config) {
    let env_filter = EnvFilter::try_new(&config.rust_log).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(log_fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);
    let cmd = match argv.next() {
        None => {
            print_usage();
            return Ok(());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(&first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let config = Config::from_env();
    let parsed = Args::parse(config, &mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    init_tracing(&parsed.config);

    if cmd == Command::List {
        return list(&parsed);
    }

    // Open + migrate SQLite here so services stay storage-agnostic.
    prepare_sqlite_file(&parsed.config.db_url)?;
    let storage = Storage::sqlite(&parsed.config.db_url).await?;

    match cmd {
        Command::Take => take(&parsed, &storage).await,
        Command::History => history(&parsed, &storage).await,
        Command::List => Ok(()),
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
