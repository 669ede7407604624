mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{RecordingRemote, answered, asgn, assignment, login, qno, question, user};
use quiz_core::model::{Assignment, MarkColor, QuizProgress};
use services::{AppServices, Clock, SessionError, SyncSettings, Winner};
use storage::repository::{InMemoryMirror, LocalMirror, Storage};
use storage::{FileCatalog, FileMirror};
use tokio::time::sleep;

const NOW: i64 = 1_000_000;

#[tokio::test]
async fn first_answer_is_final() {
    let remote = RecordingRemote::new();
    let mirror = InMemoryMirror::new();
    let mut session = login(Clock::fixed_millis(NOW), &remote, &mirror).await;
    let (a1, questions) = assignment("a1", 2);
    let mut quiz = session.open(a1, questions).unwrap();

    assert!(quiz.select_option(qno(1), "A").unwrap());
    assert!(!quiz.select_option(qno(1), "B").unwrap());
    assert_eq!(quiz.answer(qno(1)), Some("A"));

    let stats = quiz.stats();
    assert_eq!(stats.incorrect, 1);
    assert_eq!(stats.percent_complete(), 50);
}

#[tokio::test]
async fn completion_counts_the_loaded_questions() {
    let remote = RecordingRemote::new();
    let mirror = InMemoryMirror::new();
    let mut session = login(Clock::fixed_millis(NOW), &remote, &mirror).await;
    // The descriptor overstates the question file.
    let a1 = Assignment::new(asgn("a1"), "Unit 1", 5).unwrap();
    let mut quiz = session.open(a1, vec![question(1), question(2)]).unwrap();

    quiz.select_option(qno(1), "B").unwrap();
    assert!(!quiz.progress().completed());
    quiz.select_option(qno(2), "B").unwrap();
    assert!(quiz.progress().completed());
}

#[tokio::test]
async fn unknown_question_or_option_is_rejected() {
    let remote = RecordingRemote::new();
    let mirror = InMemoryMirror::new();
    let mut session = login(Clock::fixed_millis(NOW), &remote, &mirror).await;
    let (a1, questions) = assignment("a1", 2);
    let mut quiz = session.open(a1, questions).unwrap();

    assert!(matches!(
        quiz.select_option(qno(9), "A"),
        Err(SessionError::UnknownQuestion(q)) if q == qno(9)
    ));
    assert!(matches!(
        quiz.select_option(qno(1), "Z"),
        Err(SessionError::UnknownOption { .. })
    ));
    assert!(quiz.progress().is_empty());
    assert!(mirror.get(&user()).unwrap().is_none());
}

#[tokio::test]
async fn marks_toggle_and_notes_clear() {
    let remote = RecordingRemote::new();
    let mirror = InMemoryMirror::new();
    let mut session = login(Clock::fixed_millis(NOW), &remote, &mirror).await;
    let (a1, questions) = assignment("a1", 2);
    let mut quiz = session.open(a1, questions).unwrap();

    assert_eq!(quiz.toggle_mark(qno(1), MarkColor::Rose).unwrap(), Some(MarkColor::Rose));
    assert_eq!(quiz.toggle_mark(qno(1), MarkColor::Amber).unwrap(), Some(MarkColor::Amber));
    assert_eq!(quiz.toggle_mark(qno(1), MarkColor::Amber).unwrap(), None);
    quiz.set_mark(qno(2), Some(MarkColor::Indigo)).unwrap();
    quiz.set_mark(qno(2), None).unwrap();
    assert!(quiz.progress().marks().is_empty());

    let mut draft = quiz.note_draft(qno(2));
    draft.edit("  look at page 4 ");
    assert!(draft.is_dirty());
    quiz.save_note(&mut draft).unwrap();
    assert!(!draft.is_dirty());
    assert_eq!(quiz.progress().note(qno(2)), Some("  look at page 4 "));

    quiz.update_note(qno(2), "").unwrap();
    assert!(quiz.progress().notes().is_empty());
}

#[tokio::test]
async fn reset_question_reopens_only_that_answer() {
    let remote = RecordingRemote::new();
    let mirror = InMemoryMirror::new();
    let mut session = login(Clock::fixed_millis(NOW), &remote, &mirror).await;
    let (a1, questions) = assignment("a1", 2);
    let mut quiz = session.open(a1, questions).unwrap();

    quiz.select_option(qno(1), "A").unwrap();
    quiz.select_option(qno(2), "B").unwrap();
    quiz.update_note(qno(1), "why not B?").unwrap();
    assert!(quiz.progress().completed());

    assert!(quiz.reset_question(qno(1)).unwrap());
    assert!(!quiz.reset_question(qno(1)).unwrap());
    assert!(!quiz.progress().completed());
    assert_eq!(quiz.note_draft(qno(1)).text(), "why not B?");
    assert_eq!(quiz.answer(qno(2)), Some("B"));

    assert!(quiz.select_option(qno(1), "B").unwrap());
    assert_eq!(quiz.answer(qno(1)), Some("B"));
}

#[tokio::test(start_paused = true)]
async fn reset_assignment_erases_mirror_and_leaves_others() {
    let remote = RecordingRemote::new();
    let mirror = InMemoryMirror::new();
    let mut session = login(Clock::fixed_millis(NOW), &remote, &mirror).await;

    let (a2, q2) = assignment("a2", 2);
    session.open(a2, q2).unwrap().select_option(qno(1), "C").unwrap();
    let (a1, q1) = assignment("a1", 2);
    {
        let mut quiz = session.open(a1.clone(), q1.clone()).unwrap();
        quiz.select_option(qno(1), "A").unwrap();
        quiz.update_note(qno(2), "tricky").unwrap();
        quiz.toggle_mark(qno(2), MarkColor::Emerald).unwrap();

        assert!(!quiz.reset_assignment(|_| false));
        assert_eq!(quiz.answer(qno(1)), Some("A"));
        assert!(mirror.contains(&user()).unwrap());

        assert!(quiz.reset_assignment(|a| a.id() == &asgn("a1")));
        assert!(quiz.progress().is_empty());
    }
    assert!(!mirror.contains(&user()).unwrap());
    let a2_progress = session.progress().assignment(&asgn("a2")).unwrap();
    assert_eq!(a2_progress.answer(qno(1)), Some("C"));

    sleep(Duration::from_secs(6)).await;
    let stored = remote.stored(&user()).await.unwrap();
    assert!(stored.assignment(&asgn("a1")).unwrap().is_empty());
    assert_eq!(
        stored.assignment(&asgn("a2")).unwrap().answer(qno(1)),
        Some("C")
    );

    // The next mutation recreates the mirror entry with the full aggregate.
    session.open(a1, q1).unwrap().select_option(qno(2), "B").unwrap();
    let cached = mirror.get(&user()).unwrap().unwrap();
    assert_eq!(cached.assignments().len(), 2);
}

#[tokio::test]
async fn session_resumes_reconciled_progress() {
    let remote = RecordingRemote::new();
    let mirror = InMemoryMirror::new();
    remote.seed(&user(), "a1", answered("B", 500)).await;

    let mut session = login(Clock::fixed_millis(NOW), &remote, &mirror).await;
    assert_eq!(session.login_report().winner, Winner::Remote);
    let (a1, questions) = assignment("a1", 3);
    let mut quiz = session.open(a1, questions).unwrap();
    assert_eq!(quiz.answer(qno(1)), Some("B"));
    assert_eq!(quiz.stats().correct, 1);

    quiz.select_option(qno(2), "A").unwrap();
    assert!(quiz.progress().last_updated() >= 500);
}

#[tokio::test]
async fn stamps_never_decrease_behind_a_newer_aggregate() {
    let remote = RecordingRemote::new();
    let mirror = InMemoryMirror::new();
    // Remote copy stamped ahead of this device's clock.
    remote.seed(&user(), "a1", answered("B", NOW + 60_000)).await;

    let mut session = login(Clock::fixed_millis(NOW), &remote, &mirror).await;
    let (a2, questions) = assignment("a2", 1);
    session
        .open(a2, questions)
        .unwrap()
        .select_option(qno(1), "A")
        .unwrap();

    let progress: &QuizProgress = session.progress();
    assert_eq!(progress.last_updated(), NOW + 60_000);
    assert_eq!(
        progress.assignment(&asgn("a2")).unwrap().last_updated(),
        NOW + 60_000
    );
}

const INDEX: &str = r#"[
    {"asgn-unique-name": "unit-1", "asgn-display-name": "Unit 1", "num_of_questions": 2,
     "has_pg_ref": true, "has_hints": false, "has_solutions": false}
]"#;

const QUESTIONS: &str = r#"[
    {"qno": 1, "question_text": "Flame colour of Na?", "options": ["Red", "Golden yellow"],
     "answer": "Golden yellow", "page_ref": 3},
    {"qno": 2, "question_text": "Brown ring test detects?", "options": ["Nitrate", "Sulphate"],
     "answer": "Nitrate", "page_ref": 7}
]"#;

#[tokio::test]
async fn progress_survives_across_devices_through_sqlite() {
    let catalog_dir = tempfile::tempdir().unwrap();
    std::fs::write(catalog_dir.path().join("assignments.json"), INDEX).unwrap();
    std::fs::create_dir(catalog_dir.path().join("assignments")).unwrap();
    std::fs::write(catalog_dir.path().join("assignments/unit-1.json"), QUESTIONS).unwrap();
    let laptop_dir = tempfile::tempdir().unwrap();
    let phone_dir = tempfile::tempdir().unwrap();

    let db_url = "sqlite:file:services_two_devices?mode=memory&cache=shared";
    let settings = SyncSettings::with_debounce(Duration::from_millis(10));
    let laptop = AppServices::new_sqlite(
        db_url,
        laptop_dir.path(),
        catalog_dir.path(),
        Clock::fixed_millis(NOW),
        settings,
    )
    .await
    .unwrap();

    let unit = asgn("unit-1");
    let mut session = laptop.login(user()).await;
    assert_eq!(session.login_report().winner, Winner::Empty);
    {
        let mut quiz = laptop.open_assignment(&mut session, &unit).await.unwrap();
        quiz.select_option(qno(1), "Golden yellow").unwrap();
        quiz.update_note(qno(2), "ring forms at the junction").unwrap();
    }
    session.flush().await;

    let overview = laptop.catalog().overview(session.progress()).await.unwrap();
    assert_eq!(overview[0].answered, 1);
    assert!(!overview[0].completed);
    session.logout();

    // A second device with an empty mirror picks the remote copy.
    let phone_storage = Storage::sqlite(
        db_url,
        Arc::new(FileMirror::new(phone_dir.path())),
        Arc::new(FileCatalog::new(catalog_dir.path())),
    )
    .await
    .unwrap();
    let phone = AppServices::from_storage(phone_storage, Clock::fixed_millis(NOW + 1), settings)
        .unwrap();
    let mut session = phone.login(user()).await;
    assert_eq!(session.login_report().winner, Winner::Remote);
    let quiz = phone.open_assignment(&mut session, &unit).await.unwrap();
    assert_eq!(quiz.answer(qno(1)), Some("Golden yellow"));
    assert_eq!(quiz.note_draft(qno(2)).text(), "ring forms at the junction");
    assert_eq!(quiz.stats().correct, 1);
}
