use std::fmt;

use log::{debug, info};
use psy_core::model::{AnswerId, CategoryId, ScoredResult, TestId};
use services::{
    ApiConfig, AppServices, Clock, IdentityPolicy, SessionError, SessionStep, TestSession,
    TestSessionService,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { command: &'static str, flag: &'static str },
    UnknownArg(String),
    InvalidId { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
    InvalidPolicy { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { command, flag } => write!(f, "{command} requires {flag}"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidPolicy { raw } => {
                write!(f, "invalid --policy value: {raw} (expected server or local)")
            }
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
    eprintln!("  cargo run -p app -- <command> [--db <sqlite_url>] [--api <base_url>]");
    eprintln!("                                [--policy server|local]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  categories                      list test categories (default)");
    eprintln!("  tests --category <id>           list tests in a category");
    eprintln!("  detail --test <id>              show a test's name and question count");
    eprintln!("  take --test <id>                answer a test interactively");
    eprintln!("  result --test <id>              show the scored result for this device");
    eprintln!("  history                         list saved results");
    eprintln!("  history-delete --index <n>      delete a saved result (0-based)");
    eprintln!("  whoami                          resolve and print the device's user id");
    eprintln!("  onboard                         mark the first-launch intro as seen");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:psy.sqlite3");
    eprintln!("  --policy server");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  PSY_DB_URL, PSY_API_BASE_URL, PSY_API_TIMEOUT_SECS, PSY_IDENTITY_POLICY,");
    eprintln!("  PSY_DEVICE_ID, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Categories,
    Tests,
    Detail,
    Take,
    Result,
    History,
    HistoryDelete,
    WhoAmI,
    Onboard,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "categories" => Some(Self::Categories),
            "tests" => Some(Self::Tests),
            "detail" => Some(Self::Detail),
            "take" => Some(Self::Take),
            "result" => Some(Self::Result),
            "history" => Some(Self::History),
            "history-delete" => Some(Self::HistoryDelete),
            "whoami" => Some(Self::WhoAmI),
            "onboard" => Some(Self::Onboard),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Categories => "categories",
            Self::Tests => "tests",
            Self::Detail => "detail",
            Self::Take => "take",
            Self::Result => "result",
            Self::History => "history",
            Self::HistoryDelete => "history-delete",
            Self::WhoAmI => "whoami",
            Self::Onboard => "onboard",
        }
    }
}

struct Args {
    db_url: String,
    config: ApiConfig,
    category: Option<CategoryId>,
    test: Option<TestId>,
    index: Option<usize>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("PSY_DB_URL")
            .ok()
            .map_or_else(|| normalize_sqlite_url("psy.sqlite3".into()), normalize_sqlite_url);
        let mut config = ApiConfig::from_env();
        let mut category = None;
        let mut test = None;
        let mut index = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--api" => {
                    config = config.with_base_url(require_value(args, "--api")?);
                }
                "--policy" => {
                    let value = require_value(args, "--policy")?;
                    let policy: IdentityPolicy = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidPolicy { raw: value.clone() })?;
                    config = config.with_identity_policy(policy);
                }
                "--category" => category = Some(CategoryId::new(parse_id(args, "--category")?)),
                "--test" => test = Some(TestId::new(parse_id(args, "--test")?)),
                "--index" => {
                    let raw = parse_id(args, "--index")?;
                    let parsed = usize::try_from(raw).map_err(|_| ArgsError::InvalidId {
                        flag: "--index",
                        raw: raw.to_string(),
                    })?;
                    index = Some(parsed);
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
            config,
            category,
            test,
            index,
        })
    }

    fn validate(&self, cmd: Command) -> Result<(), ArgsError> {
        let missing = match cmd {
            Command::Tests if self.category.is_none() => Some("--category"),
            Command::Detail | Command::Take | Command::Result if self.test.is_none() => {
                Some("--test")
            }
            Command::HistoryDelete if self.index.is_none() => Some("--index"),
            _ => None,
        };
        match missing {
            Some(flag) => Err(ArgsError::MissingFlag {
                command: cmd.name(),
                flag,
            }),
            None => Ok(()),
        }
    }

    fn test_id(&self, cmd: Command) -> Result<TestId, ArgsError> {
        self.test.ok_or(ArgsError::MissingFlag {
            command: cmd.name(),
            flag: "--test",
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

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    let cmd = match argv.first().map(String::as_str) {
        None => Command::Categories,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Categories,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let mut iter = argv.into_iter();
    let parsed = Args::parse(&mut iter)
        .and_then(|args| args.validate(cmd).map(|()| args))
        .map_err(|e| {
            eprintln!("{e}");
            print_usage();
            e
        })?;

    prepare_sqlite_file(&parsed.db_url)?;
    debug!(
        "opening {} against {} ({} identity)",
        parsed.db_url, parsed.config.base_url, parsed.config.identity_policy
    );
    let services = AppServices::new_sqlite(&parsed.db_url, &parsed.config, Clock::system()).await?;

    match cmd {
        Command::Categories => {
            if services.launch().is_first_launch().await? {
                println!("Welcome! Pick a category, then a test. Run `onboard` to hide this note.");
                println!();
            }
            for category in services.catalog().categories().await? {
                match &category.description {
                    Some(description) => {
                        println!("{:>4}  {} - {description}", category.id, category.name);
                    }
                    None => println!("{:>4}  {}", category.id, category.name),
                }
            }
        }
        Command::Tests => {
            let category = parsed.category.ok_or(ArgsError::MissingFlag {
                command: cmd.name(),
                flag: "--category",
            })?;
            let tests = services.catalog().tests_in_category(category).await?;
            if tests.is_empty() {
                println!("No tests in category {category}.");
            }
            for test in tests {
                println!("{:>4}  {}", test.id, test.test_name);
            }
        }
        Command::Detail => {
            let detail = services.catalog().test_detail(parsed.test_id(cmd)?).await?;
            println!("{}", detail.test_name);
            println!("{} questions", detail.question_count);
        }
        Command::Take => {
            let test_id = parsed.test_id(cmd)?;
            let mut input = BufReader::new(tokio::io::stdin()).lines();
            if let Some(done) = take_test(&services.sessions(), test_id, &mut input).await? {
                let result = services.results().fetch(done).await?;
                print_result(&result);
                offer_save(&services, done, &result, &mut input).await?;
            }
        }
        Command::Result => {
            let result = services.results().fetch(parsed.test_id(cmd)?).await?;
            print_result(&result);
        }
        Command::History => {
            let entries = services.history().list().await?;
            if entries.is_empty() {
                println!("No saved results.");
            }
            for (index, entry) in entries.iter().enumerate() {
                println!(
                    "[{index}] {}  test {}  {:.1}/{:.1}  {} questions  {}",
                    entry.result_name(),
                    entry.test_id(),
                    entry.total_score(),
                    entry.score_max(),
                    entry.question_count(),
                    entry.saved_at().format("%Y-%m-%d %H:%M")
                );
            }
        }
        Command::HistoryDelete => {
            let index = parsed.index.ok_or(ArgsError::MissingFlag {
                command: cmd.name(),
                flag: "--index",
            })?;
            let removed = services.history().delete(index).await?;
            println!("Deleted \"{}\".", removed.result_name());
        }
        Command::WhoAmI => {
            let identity = services.identity();
            let user = identity.resolve_user_id().await?;
            println!("user {user} ({} policy)", identity.policy());
        }
        Command::Onboard => {
            services.launch().complete_onboarding().await?;
            info!("first-launch intro dismissed");
        }
    }

    Ok(())
}

type Input = Lines<BufReader<Stdin>>;

async fn prompt(input: &mut Input, text: &str) -> Result<Option<String>, std::io::Error> {
    println!("{text}");
    Ok(input.next_line().await?.map(|line| line.trim().to_owned()))
}

/// Walk a session on stdin. Returns the test to fetch a result for, or `None`
/// when the user quit.
async fn take_test(
    sessions: &TestSessionService,
    test_id: TestId,
    input: &mut Input,
) -> Result<Option<TestId>, Box<dyn std::error::Error>> {
    let (mut session, outcome) = sessions.start(test_id).await;
    if let Err(err) = outcome {
        debug!("start failed: {err}");
        if !recover(sessions, &mut session, input).await? {
            return Ok(None);
        }
    }

    loop {
        if let Some(done) = session.result_ref() {
            return Ok(Some(done));
        }
        print_question(&session);

        let Some(line) = prompt(input, "answer number, Enter to continue, q to quit:").await?
        else {
            session.abandon();
            return Ok(None);
        };
        match line.as_str() {
            "q" => {
                session.abandon();
                return Ok(None);
            }
            "" => {}
            raw => {
                let chosen = raw
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| session.current_answers().get(i))
                    .map(|answer| answer.id);
                match chosen {
                    Some(answer_id) => select(&mut session, answer_id),
                    None => println!("No option {raw}."),
                }
                continue;
            }
        }

        match sessions.advance(&mut session).await {
            Ok(SessionStep::Next | SessionStep::Completed(_)) => {}
            Err(SessionError::NoSelection) => println!("Choose an answer first."),
            Err(err) => {
                debug!("advance failed: {err}");
                if !recover(sessions, &mut session, input).await? {
                    return Ok(None);
                }
            }
        }
    }
}

fn select(session: &mut TestSession, answer_id: AnswerId) {
    if let Err(err) = session.select_answer(answer_id) {
        println!("{err}");
    }
}

/// Offer retries until the session leaves `Errored`. `false` means give up.
async fn recover(
    sessions: &TestSessionService,
    session: &mut TestSession,
    input: &mut Input,
) -> Result<bool, Box<dyn std::error::Error>> {
    while let Some(failure) = session.failure().cloned() {
        println!("{}", failure.user_message());
        if !failure.is_retryable() {
            return Ok(false);
        }
        match prompt(input, "retry? [Y/n]").await?.as_deref() {
            None | Some("n" | "N" | "no") => {
                session.abandon();
                return Ok(false);
            }
            Some(_) => {
                if let Err(err) = sessions.retry(session).await {
                    debug!("retry failed: {err}");
                }
            }
        }
    }
    Ok(true)
}

fn print_question(session: &TestSession) {
    let Some(question) = session.current_question() else {
        return;
    };
    let progress = session.progress();
    println!();
    println!(
        "Question {}/{} ({:.0}%)",
        progress.current,
        progress.total,
        progress.percent()
    );
    println!("{}", question.name);
    let answers = session.current_answers();
    if answers.is_empty() {
        println!("  (no options available, press Enter to skip)");
    }
    for (n, answer) in answers.iter().enumerate() {
        let marker = if session.highlighted() == Some(answer.id) {
            '*'
        } else {
            ' '
        };
        println!("{marker} {}. {} {}", n + 1, answer.score_emoji(), answer.answer);
    }
}

fn print_result(result: &ScoredResult) {
    println!();
    if result.has_chart() {
        for point in result.chart_points() {
            println!("  {:<24} {:>6.1}", point.label, point.value);
        }
        println!("  max score {:.1}", result.score_max());
    } else {
        println!("  No scores to chart.");
    }
    if let Some(advice) = &result.advice {
        println!();
        println!("{}", advice.title);
        println!("{}", advice.content);
    }
}

async fn offer_save(
    services: &AppServices,
    test_id: TestId,
    result: &ScoredResult,
    input: &mut Input,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(name) = prompt(input, "save as (blank for default, q to skip):").await? else {
        return Ok(());
    };
    if name == "q" {
        return Ok(());
    }
    let saved = services
        .history()
        .save(Some(name.as_str()), test_id, result)
        .await?;
    println!("Saved \"{}\".", saved.result_name());
    Ok(())
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

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
