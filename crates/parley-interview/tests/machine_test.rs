use std::sync::{Arc, Barrier};
use std::thread;

use parley_db::{open_database, DbPool, DbRuntimeSettings};
use parley_interview::{store, InterviewError, InterviewMachine, NewAnswer};
use parley_types::{InterviewResult, InterviewStatus};

struct Fixture {
    _dir: tempfile::TempDir,
    pool: DbPool,
    interview_id: i64,
    questions: Vec<i64>,
}

fn fixture(question_count: i64) -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("parley.db");
    let (pool, _) = open_database(path.to_str().expect("utf-8 path"), DbRuntimeSettings::default())
        .expect("open database");

    let conn = pool.get().expect("connection");
    let position = store::create_position(&conn, "Platform Engineer", "senior", None).unwrap();
    let questions = (0..question_count)
        .map(|i| store::add_question(&conn, position, &format!("Question {i}"), i).unwrap())
        .collect();
    let candidate = store::create_candidate(&conn, "Alex", Some("alex@example.com")).unwrap();
    let interview_id = store::convert_candidate(&conn, candidate, position).unwrap();

    Fixture {
        _dir: dir,
        pool,
        interview_id,
        questions,
    }
}

fn assert_result_implies_finished(pool: &DbPool, interview_id: i64) {
    let conn = pool.get().unwrap();
    let interview = store::get_interview(&conn, interview_id).unwrap();
    if interview.result.is_some() {
        assert_eq!(interview.status, InterviewStatus::Finished);
    }
    if interview.status != InterviewStatus::Finished {
        assert!(interview.result.is_none());
    }
}

#[test]
fn concurrent_submissions_store_exactly_one_answer() {
    let fx = fixture(1);
    let machine = InterviewMachine::default();
    let question = fx.questions[0];
    let writers = 8;
    let barrier = Arc::new(Barrier::new(writers));

    let handles: Vec<_> = (0..writers)
        .map(|i| {
            let pool = fx.pool.clone();
            let machine = machine.clone();
            let barrier = barrier.clone();
            let interview_id = fx.interview_id;
            thread::spawn(move || {
                let mut conn = pool.get().expect("connection");
                barrier.wait();
                machine.submit_answer(
                    &mut conn,
                    interview_id,
                    &NewAnswer::text(question, format!("answer from writer {i}")),
                )
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("writer thread panicked"))
        .collect();

    let accepted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(accepted, 1, "exactly one submission wins");
    for rejected in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(
            matches!(rejected, InterviewError::AlreadyAnswered { .. }),
            "losers see already-answered, got {rejected:?}"
        );
    }

    let conn = fx.pool.get().unwrap();
    assert_eq!(store::count_answers(&conn, fx.interview_id).unwrap(), 1);
}

#[test]
fn result_only_ever_appears_on_finished_interviews() {
    let fx = fixture(2);
    let machine = InterviewMachine::default();
    let mut conn = fx.pool.get().unwrap();

    assert_result_implies_finished(&fx.pool, fx.interview_id);
    machine.start(&mut conn, fx.interview_id).unwrap();
    assert_result_implies_finished(&fx.pool, fx.interview_id);

    for question in &fx.questions {
        machine
            .submit_answer(&mut conn, fx.interview_id, &NewAnswer::text(*question, "ok"))
            .unwrap();
        assert_result_implies_finished(&fx.pool, fx.interview_id);
    }

    machine
        .finish(&mut conn, fx.interview_id, Some(InterviewResult::Successful))
        .unwrap();
    assert_result_implies_finished(&fx.pool, fx.interview_id);
    machine.mark_failed(&mut conn, fx.interview_id).unwrap();
    assert_result_implies_finished(&fx.pool, fx.interview_id);

    let interview = store::get_interview(&conn, fx.interview_id).unwrap();
    assert_eq!(interview.result, Some(InterviewResult::Successful));
}

#[test]
fn finishing_with_zero_answers_is_error() {
    let fx = fixture(3);
    let machine = InterviewMachine::default();
    let mut conn = fx.pool.get().unwrap();

    machine.start(&mut conn, fx.interview_id).unwrap();
    let finished = machine
        .finish(&mut conn, fx.interview_id, Some(InterviewResult::Successful))
        .unwrap();
    assert_eq!(finished.result, Some(InterviewResult::Error));
    assert!(finished.finished_at.is_some());
}

#[test]
fn replayed_conversation_start_keeps_original_timestamp() {
    let fx = fixture(1);
    let machine = InterviewMachine::default();
    let mut conn = fx.pool.get().unwrap();

    let first = machine
        .mark_conversation_started(&mut conn, fx.interview_id)
        .unwrap();
    assert!(first.changed);
    assert_eq!(first.interview.status, InterviewStatus::InProgress);

    let replay = machine
        .mark_conversation_started(&mut conn, fx.interview_id)
        .unwrap();
    assert!(!replay.changed);
    assert_eq!(replay.interview.started_at, first.interview.started_at);
    assert_eq!(replay.interview.status, InterviewStatus::InProgress);
}

#[test]
fn conversation_end_before_start_finishes_awaiting_evaluation() {
    let fx = fixture(1);
    let machine = InterviewMachine::default();
    let mut conn = fx.pool.get().unwrap();

    let ended = machine
        .mark_conversation_ended(&mut conn, fx.interview_id)
        .unwrap();
    assert!(ended.changed);
    assert!(ended.interview.awaiting_evaluation());

    let late_start = machine
        .mark_conversation_started(&mut conn, fx.interview_id)
        .unwrap();
    assert!(!late_start.changed);
    assert_eq!(late_start.interview.status, InterviewStatus::Finished);

    let pending = store::list_pending_evaluation(&conn).unwrap();
    assert_eq!(
        pending.iter().map(|i| i.id).collect::<Vec<_>>(),
        vec![fx.interview_id]
    );
}
