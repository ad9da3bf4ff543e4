use std::sync::Arc;
use studyjoy::content::QuizScope;
use studyjoy::error::SessionError;
use studyjoy::questions::GeneratedQuestion;
use studyjoy::session::{QuizPhase, QuizSession};
use studyjoy::store::{
    FileSessionStore, MemorySessionStore, SessionStore, LAST_ACTIVE_QUIZ, LAST_COMPLETED_QUIZ,
};

fn question(text: &str, correct: usize) -> GeneratedQuestion {
    GeneratedQuestion {
        question: text.to_string(),
        options: vec!["first".into(), "second".into(), "third".into(), "fourth".into()],
        correct_answer_index: correct,
        explanation: "stated in the content".to_string(),
        objective: None,
        question_type: None,
    }
}

fn scope() -> QuizScope {
    QuizScope::paragraph("Cell Biology", Some(1), 4)
}

#[test]
fn full_lifecycle_counts_correct_answers() {
    let store = Arc::new(MemorySessionStore::new());
    let mut session = QuizSession::new(store.clone(), scope());

    session
        .install_questions(vec![question("q0", 0), question("q1", 1), question("q2", 2)])
        .unwrap();
    assert_eq!(session.phase(), &QuizPhase::Answering { index: 0 });

    session.select_answer(0).unwrap();
    assert!(session.submit_answer().unwrap());
    assert_eq!(session.phase(), &QuizPhase::Submitted { index: 0 });
    session.next_question().unwrap();
    assert_eq!(session.phase(), &QuizPhase::Answering { index: 1 });

    session.select_answer(3).unwrap();
    assert!(!session.submit_answer().unwrap());
    session.next_question().unwrap();

    session.select_answer(2).unwrap();
    assert!(session.submit_answer().unwrap());
    session.next_question().unwrap();

    assert!(session.is_complete());
    assert_eq!(session.score(), 2);
    assert!((session.percentage() - 200.0 / 3.0).abs() < 0.01);

    // Completion writes the result snapshot and moves the pointer to it.
    let result = store.load(&scope().result_key()).unwrap().unwrap();
    assert_eq!(result["score"], 2);
    assert_eq!(result["totalQuestions"], 3);
    assert!((result["percentage"].as_f64().unwrap() - 200.0 / 3.0).abs() < 0.01);
    assert_eq!(
        store.pointer(LAST_COMPLETED_QUIZ).unwrap().as_deref(),
        Some(scope().result_key().as_str())
    );

    let state = store.load(&scope().state_key()).unwrap().unwrap();
    assert_eq!(state["phase"]["phase"], "complete");
}

#[test]
fn submitting_without_a_selection_changes_nothing() {
    let store = MemorySessionStore::new();
    let mut session = QuizSession::new(store, scope());
    session.install_questions(vec![question("q0", 1)]).unwrap();

    let err = session.submit_answer().unwrap_err();
    assert!(matches!(err, SessionError::NoAnswerSelected));
    assert_eq!(session.phase(), &QuizPhase::Answering { index: 0 });
    assert_eq!(session.score(), 0);

    session.select_answer(1).unwrap();
    assert!(session.submit_answer().unwrap());
}

#[test]
fn selection_rules_follow_the_phase() {
    let store = MemorySessionStore::new();
    let mut session = QuizSession::new(store, scope());

    assert!(matches!(session.select_answer(0), Err(SessionError::NoQuestions)));

    session.install_questions(vec![question("q0", 0)]).unwrap();
    assert!(matches!(
        session.select_answer(4),
        Err(SessionError::InvalidChoice { index: 4 })
    ));

    session.select_answer(0).unwrap();
    session.submit_answer().unwrap();
    assert!(matches!(session.select_answer(1), Err(SessionError::AlreadySubmitted)));
    assert!(matches!(session.submit_answer(), Err(SessionError::AlreadySubmitted)));

    session.next_question().unwrap();
    assert!(matches!(session.select_answer(0), Err(SessionError::QuizComplete)));
}

#[test]
fn selection_is_not_persisted_until_submitted() {
    let store = Arc::new(MemorySessionStore::new());
    let mut session = QuizSession::new(store.clone(), scope());
    session.install_questions(vec![question("q0", 0), question("q1", 1)]).unwrap();

    session.select_answer(1).unwrap();

    let resumed = QuizSession::resume(store.clone(), &scope()).unwrap().unwrap();
    assert_eq!(resumed.phase(), &QuizPhase::Answering { index: 0 });
    assert_eq!(resumed.selected_answer(), None);

    session.submit_answer().unwrap();
    let resumed = QuizSession::resume(store.clone(), &scope()).unwrap().unwrap();
    assert_eq!(resumed.phase(), &QuizPhase::Submitted { index: 0 });
    assert_eq!(resumed.score(), 0);
}

#[test]
fn resume_last_follows_the_active_pointer() {
    let store = Arc::new(MemorySessionStore::new());

    let chapter_scope = QuizScope::chapter("Cell Biology", 2);
    let mut first = QuizSession::new(store.clone(), chapter_scope);
    first.install_questions(vec![question("q0", 0)]).unwrap();

    let mut second = QuizSession::new(store.clone(), scope());
    second.install_questions(vec![question("q1", 1)]).unwrap();

    let resumed = QuizSession::resume_last(store.clone()).unwrap().unwrap();
    assert_eq!(resumed.scope(), &scope());
    assert_eq!(resumed.questions().len(), 1);
    assert_eq!(resumed.questions()[0].question, "q1");
}

#[test]
fn restart_clears_state_and_its_pointer() {
    let store = Arc::new(MemorySessionStore::new());
    let mut session = QuizSession::new(store.clone(), scope());
    session.install_questions(vec![question("q0", 0)]).unwrap();

    session.restart().unwrap();

    assert_eq!(session.phase(), &QuizPhase::NoQuestions);
    assert!(session.questions().is_empty());
    assert_eq!(store.load(&scope().state_key()).unwrap(), None);
    assert_eq!(store.pointer(LAST_ACTIVE_QUIZ).unwrap(), None);
}

#[test]
fn restart_leaves_a_foreign_pointer_alone() {
    let store = Arc::new(MemorySessionStore::new());

    let mut stale = QuizSession::new(store.clone(), QuizScope::chapter("Cell Biology", 2));
    stale.install_questions(vec![question("q0", 0)]).unwrap();

    // A later session moved the pointer on.
    let mut active = QuizSession::new(store.clone(), scope());
    active.install_questions(vec![question("q1", 1)]).unwrap();

    stale.restart().unwrap();

    assert_eq!(
        store.pointer(LAST_ACTIVE_QUIZ).unwrap().as_deref(),
        Some(scope().state_key().as_str())
    );
    assert!(store.load(&scope().state_key()).unwrap().is_some());
}

#[test]
fn inconsistent_saved_state_is_discarded() {
    let store = Arc::new(MemorySessionStore::new());

    // Phase index points past the (empty) question list.
    let snapshot = serde_json::json!({
        "bookId": "Cell Biology",
        "chapterId": 1,
        "paragraphId": 4,
        "questions": [],
        "phase": {"phase": "answering", "index": 0},
        "score": 0,
        "savedAt": "2026-08-01T12:00:00Z"
    });
    store.save(&scope().state_key(), &snapshot).unwrap();

    let resumed = QuizSession::resume(store.clone(), &scope()).unwrap();
    assert!(resumed.is_none());
    assert_eq!(store.load(&scope().state_key()).unwrap(), None);
}

#[test]
fn unreadable_saved_state_is_an_error() {
    let store = Arc::new(MemorySessionStore::new());
    store.save(&scope().state_key(), &serde_json::json!("not a snapshot")).unwrap();

    let err = QuizSession::resume(store.clone(), &scope()).unwrap_err();
    assert!(matches!(err, SessionError::Store(_)));
}

#[test]
fn completion_record_exists_only_after_completion() {
    let store = MemorySessionStore::new();
    let mut session = QuizSession::new(store, scope());
    session.install_questions(vec![question("q0", 0)]).unwrap();

    assert!(session.completion_record("alice").is_none());

    session.select_answer(0).unwrap();
    session.submit_answer().unwrap();
    session.next_question().unwrap();

    let record = session.completion_record("alice").unwrap();
    assert_eq!(record.user_id, "alice");
    assert_eq!(record.scope, scope());
    assert_eq!(record.score, 1);
    assert_eq!(record.total_questions, 1);
    assert!(record.passed());
}

#[test]
fn file_store_survives_a_process_restart() {
    let dir = std::env::temp_dir().join(format!("studyjoy_sessions_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);

    {
        let store = FileSessionStore::open(dir.clone()).unwrap();
        let mut session = QuizSession::new(store, scope());
        session.install_questions(vec![question("q0", 2), question("q1", 0)]).unwrap();
        session.select_answer(2).unwrap();
        session.submit_answer().unwrap();
    }

    let store = FileSessionStore::open(dir.clone()).unwrap();
    let resumed = QuizSession::resume(store, &scope()).unwrap().unwrap();
    assert_eq!(resumed.phase(), &QuizPhase::Submitted { index: 0 });
    assert_eq!(resumed.score(), 1);
    assert_eq!(resumed.questions().len(), 2);

    let store = FileSessionStore::open(dir.clone()).unwrap();
    let resumed_by_pointer = QuizSession::resume_last(store).unwrap().unwrap();
    assert_eq!(resumed_by_pointer.scope(), &scope());

    let _ = std::fs::remove_dir_all(&dir);
}
