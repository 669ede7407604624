use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use quiz_core::model::{AssignmentId, MarkColor, QuestionNo, UserId};
use services::{
    AppServices, AssignmentSession, Clock, QuizSession, RemoteRead, SYNC_DEBOUNCE_MS,
    SyncSettings,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidUser { raw: String, source: quiz_core::Error },
    MissingUser,
    InvalidDebounce { raw: String },
    MissingCommand,
    UnknownCommand(String),
    MissingOperand { command: String, operand: &'static str },
    UnexpectedOperand(String),
    InvalidAssignment { raw: String, source: quiz_core::Error },
    InvalidQuestion { raw: String },
    InvalidColor { raw: String, source: quiz_core::Error },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidUser { raw, source } => {
                write!(f, "invalid --user value {raw}: {source}")
            }
            ArgsError::MissingUser => write!(f, "no user given (use --user or QUIZ_USER)"),
            ArgsError::InvalidDebounce { raw } => {
                write!(f, "invalid --debounce-ms value: {raw}")
            }
            ArgsError::MissingCommand => write!(f, "no command given"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown command: {cmd}"),
            ArgsError::MissingOperand { command, operand } => {
                write!(f, "{command} requires <{operand}>")
            }
            ArgsError::UnexpectedOperand(arg) => write!(f, "unexpected argument: {arg}"),
            ArgsError::InvalidAssignment { raw, source } => {
                write!(f, "invalid assignment id {raw}: {source}")
            }
            ArgsError::InvalidQuestion { raw } => write!(f, "invalid question number: {raw}"),
            ArgsError::InvalidColor { raw, source } => {
                write!(f, "invalid mark color {raw}: {source} (or none)")
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

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  app [options] list");
    eprintln!("  app [options] show <assignment>");
    eprintln!("  app [options] answer <assignment> <qno> <option>");
    eprintln!("  app [options] note <assignment> <qno> <text>");
    eprintln!("  app [options] mark <assignment> <qno> <color|none>");
    eprintln!("  app [options] reset-question <assignment> <qno>");
    eprintln!("  app [options] reset-assignment <assignment> --yes");
    eprintln!();
    eprintln!("Options (defaults):");
    eprintln!("  --user <id>");
    eprintln!("  --db <sqlite_url>        (sqlite://quiz.sqlite3)");
    eprintln!("  --mirror-dir <dir>       (.quiz-mirror)");
    eprintln!("  --catalog <dir>          (catalog)");
    eprintln!("  --debounce-ms <ms>       ({SYNC_DEBOUNCE_MS})");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_USER, QUIZ_DB_URL, QUIZ_MIRROR_DIR, QUIZ_CATALOG_DIR, QUIZ_SYNC_DEBOUNCE_MS");
    eprintln!("  RUST_LOG (log filter, default warn)");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    List,
    Show {
        assignment: AssignmentId,
    },
    Answer {
        assignment: AssignmentId,
        qno: QuestionNo,
        option: String,
    },
    Note {
        assignment: AssignmentId,
        qno: QuestionNo,
        text: String,
    },
    Mark {
        assignment: AssignmentId,
        qno: QuestionNo,
        color: Option<MarkColor>,
    },
    ResetQuestion {
        assignment: AssignmentId,
        qno: QuestionNo,
    },
    ResetAssignment {
        assignment: AssignmentId,
        confirmed: bool,
    },
}

struct Operands {
    command: String,
    values: std::vec::IntoIter<String>,
}

impl Operands {
    fn next(&mut self, operand: &'static str) -> Result<String, ArgsError> {
        self.values.next().ok_or_else(|| ArgsError::MissingOperand {
            command: self.command.clone(),
            operand,
        })
    }

    fn assignment(&mut self) -> Result<AssignmentId, ArgsError> {
        let raw = self.next("assignment")?;
        AssignmentId::new(raw.clone()).map_err(|e| ArgsError::InvalidAssignment {
            raw,
            source: e.into(),
        })
    }

    fn qno(&mut self) -> Result<QuestionNo, ArgsError> {
        let raw = self.next("qno")?;
        raw.parse::<u32>()
            .map(QuestionNo::new)
            .map_err(|_| ArgsError::InvalidQuestion { raw })
    }

    fn finish(mut self) -> Result<(), ArgsError> {
        match self.values.next() {
            Some(extra) => Err(ArgsError::UnexpectedOperand(extra)),
            None => Ok(()),
        }
    }
}

impl Command {
    fn parse(positional: Vec<String>, confirmed: bool) -> Result<Self, ArgsError> {
        let mut values = positional.into_iter();
        let name = values.next().ok_or(ArgsError::MissingCommand)?;
        let mut ops = Operands {
            command: name.clone(),
            values,
        };

        let parsed = match name.as_str() {
            "list" => Self::List,
            "show" => Self::Show {
                assignment: ops.assignment()?,
            },
            "answer" => Self::Answer {
                assignment: ops.assignment()?,
                qno: ops.qno()?,
                option: ops.next("option")?,
            },
            "note" => Self::Note {
                assignment: ops.assignment()?,
                qno: ops.qno()?,
                text: ops.next("text")?,
            },
            "mark" => {
                let assignment = ops.assignment()?;
                let qno = ops.qno()?;
                let raw = ops.next("color")?;
                let color = if raw.eq_ignore_ascii_case("none") {
                    None
                } else {
                    Some(
                        raw.parse::<MarkColor>()
                            .map_err(|e| ArgsError::InvalidColor {
                                raw: raw.clone(),
                                source: e.into(),
                            })?,
                    )
                };
                Self::Mark {
                    assignment,
                    qno,
                    color,
                }
            }
            "reset-question" => Self::ResetQuestion {
                assignment: ops.assignment()?,
                qno: ops.qno()?,
            },
            "reset-assignment" => Self::ResetAssignment {
                assignment: ops.assignment()?,
                confirmed,
            },
            other => return Err(ArgsError::UnknownCommand(other.to_string())),
        };
        ops.finish()?;
        Ok(parsed)
    }
}

struct Args {
    db_url: String,
    mirror_dir: PathBuf,
    catalog_dir: PathBuf,
    user: UserId,
    debounce: Duration,
    command: Command,
}

fn parse_user(raw: String) -> Result<UserId, ArgsError> {
    UserId::new(raw.clone()).map_err(|e| ArgsError::InvalidUser {
        raw,
        source: e.into(),
    })
}

fn parse_debounce(raw: String) -> Result<Duration, ArgsError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ArgsError::InvalidDebounce { raw })
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("QUIZ_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://quiz.sqlite3".into(), normalize_sqlite_url);
        let mut mirror_dir = std::env::var("QUIZ_MIRROR_DIR")
            .map_or_else(|_| PathBuf::from(".quiz-mirror"), PathBuf::from);
        let mut catalog_dir = std::env::var("QUIZ_CATALOG_DIR")
            .map_or_else(|_| PathBuf::from("catalog"), PathBuf::from);
        let mut user = std::env::var("QUIZ_USER").ok();
        let mut debounce = match std::env::var("QUIZ_SYNC_DEBOUNCE_MS") {
            Ok(raw) => parse_debounce(raw)?,
            Err(_) => Duration::from_millis(SYNC_DEBOUNCE_MS),
        };
        let mut confirmed = false;
        let mut positional = Vec::new();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--mirror-dir" => mirror_dir = require_value(args, "--mirror-dir")?.into(),
                "--catalog" => catalog_dir = require_value(args, "--catalog")?.into(),
                "--user" => user = Some(require_value(args, "--user")?),
                "--debounce-ms" => debounce = parse_debounce(require_value(args, "--debounce-ms")?)?,
                "--yes" | "-y" => confirmed = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                flag if flag.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                _ => positional.push(arg),
            }
        }

        let user = parse_user(user.ok_or(ArgsError::MissingUser)?)?;
        let command = Command::parse(positional, confirmed)?;
        Ok(Self {
            db_url,
            mirror_dir,
            catalog_dir,
            user,
            debounce,
            command,
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
            .unwrap_or_else(|_| PathBuf::from("."))
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

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

//
// ─── COMMANDS ──────────────────────────────────────────────────────────────────
//

async fn list(services: &AppServices, session: &QuizSession) -> Result<(), Box<dyn std::error::Error>> {
    let rows = services.catalog().overview(session.progress()).await?;
    if rows.is_empty() {
        println!("no assignments in catalog");
    }
    for row in rows {
        let state = if row.completed {
            "completed"
        } else if row.answered > 0 {
            "in progress"
        } else {
            "not started"
        };
        let last_active = row
            .last_active
            .map_or_else(|| "-".to_string(), |at| at.format("%Y-%m-%d %H:%M").to_string());
        println!(
            "{}\t{}\t{}/{}\t{state}\t{last_active}",
            row.assignment.id(),
            row.assignment.display_name(),
            row.answered,
            row.assignment.num_of_questions(),
        );
    }
    Ok(())
}

fn show(quiz: &AssignmentSession<'_>) {
    let stats = quiz.stats();
    println!("{}", quiz.assignment().display_name());
    println!(
        "answered {}/{} ({}%), accuracy {}%",
        stats.answered(),
        stats.total,
        stats.percent_complete(),
        stats.accuracy()
    );
    for question in quiz.questions() {
        let verdict = match quiz.answer(question.qno) {
            Some(selected) if question.is_correct(selected) => format!("{selected} (correct)"),
            Some(selected) => format!("{selected} (incorrect, answer: {})", question.answer),
            None => "-".to_string(),
        };
        let mark = quiz
            .progress()
            .mark(question.qno)
            .map_or_else(String::new, |color| format!(" [{color}]"));
        println!("Q{}{mark}: {verdict}", question.qno);
        if let Some(note) = quiz.progress().note(question.qno) {
            println!("    note: {note}");
        }
    }
}

async fn apply(
    services: &AppServices,
    session: &mut QuizSession,
    command: Command,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::List => list(services, session).await?,
        Command::Show { assignment } => {
            let quiz = services.open_assignment(session, &assignment).await?;
            show(&quiz);
        }
        Command::Answer {
            assignment,
            qno,
            option,
        } => {
            let mut quiz = services.open_assignment(session, &assignment).await?;
            if quiz.select_option(qno, &option)? {
                let correct = quiz.question(qno).is_some_and(|q| q.is_correct(&option));
                println!(
                    "Q{qno}: {option} recorded ({})",
                    if correct { "correct" } else { "incorrect" }
                );
            } else {
                println!(
                    "Q{qno} already answered with {}; reset it first",
                    quiz.answer(qno).unwrap_or_default()
                );
            }
        }
        Command::Note {
            assignment,
            qno,
            text,
        } => {
            let mut quiz = services.open_assignment(session, &assignment).await?;
            let mut draft = quiz.note_draft(qno);
            draft.edit(text);
            if draft.is_dirty() {
                quiz.save_note(&mut draft)?;
                println!("Q{qno}: note saved");
            } else {
                println!("Q{qno}: note unchanged");
            }
        }
        Command::Mark {
            assignment,
            qno,
            color,
        } => {
            let mut quiz = services.open_assignment(session, &assignment).await?;
            quiz.set_mark(qno, color)?;
            match color {
                Some(color) => println!("Q{qno}: marked {color}"),
                None => println!("Q{qno}: mark cleared"),
            }
        }
        Command::ResetQuestion { assignment, qno } => {
            let mut quiz = services.open_assignment(session, &assignment).await?;
            if quiz.reset_question(qno)? {
                println!("Q{qno}: answer cleared");
            } else {
                println!("Q{qno}: not answered");
            }
        }
        Command::ResetAssignment {
            assignment,
            confirmed,
        } => {
            let mut quiz = services.open_assignment(session, &assignment).await?;
            let reset = quiz.reset_assignment(|a| {
                if !confirmed {
                    eprintln!(
                        "this erases all answers, notes and marks of {}; pass --yes to confirm",
                        a.display_name()
                    );
                }
                confirmed
            });
            if reset {
                println!("{assignment}: progress reset");
            }
        }
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);
    let parsed = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    init_tracing();

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&parsed.db_url)?;
    let services = AppServices::new_sqlite(
        &parsed.db_url,
        &parsed.mirror_dir,
        &parsed.catalog_dir,
        Clock::default_clock(),
        SyncSettings::with_debounce(parsed.debounce),
    )
    .await?;

    let mut session = services.login(parsed.user).await;
    if session.login_report().remote_read == RemoteRead::Failed {
        eprintln!("warning: remote progress unavailable; working from the local copy");
    }

    let outcome = apply(&services, &mut session, parsed.command).await;

    // A one-shot process would otherwise exit before the debounce window ends.
    session.flush().await;
    debug!(syncing = session.is_syncing(), "flushed pending writes");
    session.logout();
    outcome
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, ArgsError> {
        let mut iter = args.iter().map(ToString::to_string);
        Args::parse(&mut iter)
    }

    #[test]
    fn parses_answer_command_with_flags_anywhere() {
        let args = parse(&["answer", "--user", "u1", "unit-1", "3", "Golden yellow"]).unwrap();
        assert_eq!(args.user.as_str(), "u1");
        assert_eq!(
            args.command,
            Command::Answer {
                assignment: AssignmentId::new("unit-1").unwrap(),
                qno: QuestionNo::new(3),
                option: "Golden yellow".into(),
            }
        );
    }

    #[test]
    fn every_command_name_maps_to_its_command() {
        let unit = || AssignmentId::new("unit-1").unwrap();
        let cases = [
            (vec!["list"], Command::List),
            (vec!["show", "unit-1"], Command::Show { assignment: unit() }),
            (
                vec!["answer", "unit-1", "1", "A"],
                Command::Answer {
                    assignment: unit(),
                    qno: QuestionNo::new(1),
                    option: "A".into(),
                },
            ),
            (
                vec!["note", "unit-1", "2", "recheck"],
                Command::Note {
                    assignment: unit(),
                    qno: QuestionNo::new(2),
                    text: "recheck".into(),
                },
            ),
            (
                vec!["mark", "unit-1", "3", "none"],
                Command::Mark {
                    assignment: unit(),
                    qno: QuestionNo::new(3),
                    color: None,
                },
            ),
            (
                vec!["reset-question", "unit-1", "4"],
                Command::ResetQuestion {
                    assignment: unit(),
                    qno: QuestionNo::new(4),
                },
            ),
            (
                vec!["reset-assignment", "unit-1"],
                Command::ResetAssignment {
                    assignment: unit(),
                    confirmed: false,
                },
            ),
        ];
        for (words, expected) in cases {
            let mut argv = vec!["--user", "u1"];
            argv.extend(words.iter().copied());
            assert_eq!(parse(&argv).unwrap().command, expected, "{words:?}");
        }
    }

    #[test]
    fn parses_mark_colors_and_none() {
        let args = parse(&["--user", "u1", "mark", "unit-1", "2", "sky"]).unwrap();
        assert!(matches!(
            args.command,
            Command::Mark { color: Some(MarkColor::Sky), .. }
        ));
        let args = parse(&["--user", "u1", "mark", "unit-1", "2", "none"]).unwrap();
        assert!(matches!(args.command, Command::Mark { color: None, .. }));
        assert!(matches!(
            parse(&["--user", "u1", "mark", "unit-1", "2", "mauve"]),
            Err(ArgsError::InvalidColor { .. })
        ));
    }

    #[test]
    fn reset_assignment_needs_explicit_confirmation() {
        let args = parse(&["--user", "u1", "reset-assignment", "unit-1"]).unwrap();
        assert!(matches!(
            args.command,
            Command::ResetAssignment { confirmed: false, .. }
        ));
        let args = parse(&["--user", "u1", "reset-assignment", "unit-1", "--yes"]).unwrap();
        assert!(matches!(
            args.command,
            Command::ResetAssignment { confirmed: true, .. }
        ));
    }

    #[test]
    fn rejects_bad_operands() {
        assert!(matches!(
            parse(&["--user", "u1", "answer", "unit-1", "x", "A"]),
            Err(ArgsError::InvalidQuestion { .. })
        ));
        assert!(matches!(
            parse(&["--user", "u1", "show"]),
            Err(ArgsError::MissingOperand { command, operand: "assignment" }) if command == "show"
        ));
        assert!(matches!(
            parse(&["--user", "u1", "list", "extra"]),
            Err(ArgsError::UnexpectedOperand(_))
        ));
        assert!(matches!(
            parse(&["--user", "u1", "frobnicate"]),
            Err(ArgsError::UnknownCommand(_))
        ));
        assert!(matches!(
            parse(&["--user", "u1", "--db"]),
            Err(ArgsError::MissingValue { flag: "--db" })
        ));
    }

    #[test]
    fn normalizes_relative_sqlite_paths() {
        let url = normalize_sqlite_url("sqlite:data/quiz.sqlite3".into());
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("data/quiz.sqlite3"));
        assert_eq!(
            normalize_sqlite_url("sqlite::memory:".into()),
            "sqlite::memory:"
        );
    }
}
