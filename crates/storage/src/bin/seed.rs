use std::fmt;

use chrono::{DateTime, Utc};
use proctor_core::model::{Question, QuestionId, Subject, TestVersion, VersionId};
use storage::repository::{Storage, StorageError};

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    subject: String,
    version_id: VersionId,
    title: String,
    questions: u32,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidVersionId { raw: String },
    InvalidQuestions { raw: String },
    InvalidDbUrl { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidVersionId { raw } => write!(f, "invalid --version-id value: {raw}"),
            ArgsError::InvalidQuestions { raw } => write!(f, "invalid --questions value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
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

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("PROCTOR_DB_URL").unwrap_or_else(|_| "sqlite:dev.sqlite3".into());
        let mut subject =
            std::env::var("PROCTOR_SUBJECT").unwrap_or_else(|_| "police-entrance".into());
        let mut version_id = std::env::var("PROCTOR_VERSION_ID")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map_or_else(|| VersionId::new(1), VersionId::new);
        let mut title =
            std::env::var("PROCTOR_TITLE").unwrap_or_else(|_| "Entrance Examination".into());
        let mut questions = std::env::var("PROCTOR_QUESTIONS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(10);
        let mut now: Option<DateTime<Utc>> = None;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--subject" => {
                    let value = require_value(&mut args, "--subject")?;
                    subject = value;
                }
                "--version-id" => {
                    let value = require_value(&mut args, "--version-id")?;
                    let parsed: u64 = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidVersionId { raw: value.clone() })?;
                    version_id = VersionId::new(parsed);
                }
                "--title" => {
                    let value = require_value(&mut args, "--title")?;
                    title = value;
                }
                "--questions" => {
                    let value = require_value(&mut args, "--questions")?;
                    questions = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidQuestions { raw: value.clone() })?;
                }
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    now = Some(parsed);
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
            subject,
            version_id,
            title,
            questions,
            now,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:dev.sqlite3)");
    eprintln!("  --subject <name>          Test subject (default: police-entrance)");
    eprintln!("  --version-id <id>         Version id to publish (default: 1)");
    eprintln!("  --title <text>            Version title (default: Entrance Examination)");
    eprintln!("  --questions <n>           Number of sample questions to publish (default: 10)");
    eprintln!("  --now <rfc3339>           Fixed publication time for deterministic seeding");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!(
        "  PROCTOR_DB_URL, PROCTOR_SUBJECT, PROCTOR_VERSION_ID, PROCTOR_TITLE, PROCTOR_QUESTIONS"
    );
}

type Sample = (&'static str, [&'static str; 4], usize);

const SAMPLES: [Sample; 10] = [
    (
        "Which document sets out a citizen's fundamental rights?",
        ["The penal code", "The constitution", "A municipal bylaw", "A court verdict"],
        1,
    ),
    (
        "What is the first priority when arriving at the scene of a traffic accident?",
        [
            "Directing traffic",
            "Securing the scene and checking for injuries",
            "Photographing the vehicles",
            "Interviewing witnesses",
        ],
        1,
    ),
    (
        "A suspect must be informed of the reason for their arrest:",
        ["Within one week", "Only if they ask", "At the time of arrest", "After arraignment"],
        2,
    ),
    (
        "Which of the following is a misdemeanor rather than a felony?",
        ["Armed robbery", "Petty theft", "Homicide", "Kidnapping"],
        1,
    ),
    (
        "Evidence collected without a valid warrant is generally:",
        ["Always admissible", "Admissible if useful", "Inadmissible", "Archived unexamined"],
        2,
    ),
    (
        "Over the radio, a message was received and understood is acknowledged with:",
        ["Negative", "Standby", "Copy", "Over"],
        2,
    ),
    (
        "When is an officer permitted to use force?",
        [
            "Whenever convenient",
            "Only as a proportionate last resort",
            "Only during night shifts",
            "Only off duty",
        ],
        1,
    ),
    (
        "Which detail matters most in an eyewitness description of a fleeing suspect?",
        ["Favorite food", "Distinguishing physical features", "Place of birth", "Middle name"],
        1,
    ),
    (
        "A patrol route should be varied from day to day primarily to:",
        ["Save fuel", "Avoid predictability", "Shorten shifts", "Cover fewer streets"],
        1,
    ),
    (
        "Chain of custody for seized items means:",
        [
            "Items may be stored anywhere",
            "Every transfer of the item is documented",
            "Items are destroyed immediately",
            "Items belong to the arresting officer",
        ],
        1,
    ),
];

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;
    let now = args.now.unwrap_or_else(Utc::now);

    let subject = Subject::new(args.subject.clone())?;
    let version = TestVersion::from_persisted(
        args.version_id,
        subject,
        args.title.clone(),
        now,
        true,
    )?;

    let mut questions = Vec::with_capacity(args.questions as usize);
    for i in 0..args.questions {
        let (prompt, choices, correct) = SAMPLES[(i as usize) % SAMPLES.len()];
        questions.push(Question::from_persisted(
            QuestionId::new(u64::from(i + 1)),
            args.version_id,
            i,
            prompt,
            choices.iter().map(|c| (*c).to_owned()).collect(),
            correct,
        )?);
    }

    match storage.catalog.publish_version(&version, &questions).await {
        Ok(()) => println!(
            "Published version {} ({}) with {} questions into {}",
            args.version_id,
            args.title,
            questions.len(),
            args.db_url
        ),
        Err(StorageError::Conflict) => println!(
            "Version {} already published in {}; published versions are immutable, leaving it as is",
            args.version_id, args.db_url
        ),
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
