mod common;

use common::{harness, test_config, FakeAgent};
use parley_interview::InterviewError;
use parley_server::session::{NextQuestion, RemoteCleanup};
use parley_server::stats::UsageEvent;
use parley_server::EngineError;
use parley_types::{InterviewResult, InterviewStatus, SaveAnswerParams, VoiceMetadata, VoiceSessionStatus};
use parley_voice::VoiceError;

fn voice_answer(question_id: i64, transcript: &str, metadata: VoiceMetadata) -> SaveAnswerParams {
    SaveAnswerParams {
        question_id,
        transcript: transcript.to_string(),
        metadata,
    }
}

#[tokio::test]
async fn create_session_starts_interview_and_sends_tools() {
    let h = harness().build();
    let seeded = h.seed("Platform Engineer", &["Q1", "Q2", "Q3"], None);

    let view = h
        .state
        .sessions
        .create_session(seeded.interview_id)
        .await
        .unwrap();
    assert!(view.voice_enabled);
    assert_eq!(view.status, Some(VoiceSessionStatus::Active));
    assert_eq!(view.session_id.as_deref(), Some(&*format!("sess-{}", seeded.interview_id)));
    assert_eq!(view.agent_id.as_deref(), Some("agent-1"));

    let interview = h.interview(seeded.interview_id);
    assert_eq!(interview.status, InterviewStatus::InProgress);
    assert!(interview.voice_started_at.is_some());

    let requests = h.agent.created();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.agent_id, "agent-1");
    assert!(request.prompt.contains("Platform Engineer"));
    assert!(request.prompt.contains("3 questions"));
    assert_eq!(request.max_duration_seconds, 60 * 60);
    let tool_names: Vec<&str> = request.tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(tool_names, vec!["getNextQuestion", "saveAnswer", "endInterview"]);
    assert!(request
        .tools
        .iter()
        .all(|t| t.webhook_url == "https://parley.test/api/webhooks/voice"));

    assert_eq!(
        h.stats.events(),
        vec![UsageEvent::VoiceSessionCreated {
            interview_id: seeded.interview_id
        }]
    );
}

#[tokio::test]
async fn create_session_requires_configured_agent() {
    let mut config = test_config();
    config.voice_agent.api_key = String::new();
    let h = harness().config(config).build();
    let seeded = h.seed("Platform Engineer", &["Q1"], None);

    let err = h
        .state
        .sessions
        .create_session(seeded.interview_id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert!(h.agent.created().is_empty());
}

#[tokio::test]
async fn create_session_requires_questions() {
    let h = harness().build();
    let seeded = h.seed("Empty Position", &[], None);

    let err = h
        .state
        .sessions
        .create_session(seeded.interview_id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(h.interview(seeded.interview_id).status, InterviewStatus::NotStarted);
}

#[tokio::test]
async fn create_session_rejects_started_interview() {
    let h = harness().build();
    let seeded = h.seed("Platform Engineer", &["Q1"], None);
    h.answer_all(seeded.interview_id, &[]);

    let err = h
        .state
        .sessions
        .create_session(seeded.interview_id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Interview(InterviewError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn agent_outage_is_service_unavailable_and_leaves_interview_untouched() {
    let agent = FakeAgent {
        fail_create: Some(|| VoiceError::Timeout("create session".into())),
        ..FakeAgent::default()
    };
    let h = harness().agent(agent).build();
    let seeded = h.seed("Platform Engineer", &["Q1"], None);

    let err = h
        .state
        .sessions
        .create_session(seeded.interview_id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ServiceUnavailable(_)));

    let interview = h.interview(seeded.interview_id);
    assert_eq!(interview.status, InterviewStatus::NotStarted);
    assert!(!interview.voice_enabled);
}

#[tokio::test]
async fn agent_rejection_is_validation() {
    let agent = FakeAgent {
        fail_create: Some(|| VoiceError::Rejected {
            status: 422,
            body: "unknown voice".into(),
        }),
        ..FakeAgent::default()
    };
    let h = harness().agent(agent).build();
    let seeded = h.seed("Platform Engineer", &["Q1"], None);

    let err = h
        .state
        .sessions
        .create_session(seeded.interview_id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn failed_remote_termination_is_non_critical() {
    let agent = FakeAgent {
        fail_end: true,
        ..FakeAgent::default()
    };
    let h = harness().agent(agent).build();
    let seeded = h.seed("Platform Engineer", &["Q1"], None);
    h.state
        .sessions
        .create_session(seeded.interview_id)
        .await
        .unwrap();

    let ended = h
        .state
        .sessions
        .end_session(seeded.interview_id)
        .await
        .unwrap();
    assert!(matches!(ended.remote, RemoteCleanup::NonCritical(_)));
    assert!(ended.session.finished_at.is_some());
    assert!(ended.session.total_duration_seconds.is_some());

    // The first recorded end wins; the remote side is not contacted again.
    let again = h
        .state
        .sessions
        .end_session(seeded.interview_id)
        .await
        .unwrap();
    assert_eq!(again.remote, RemoteCleanup::Skipped);
    assert_eq!(again.session.finished_at, ended.session.finished_at);
    assert_eq!(h.agent.ended().len(), 1);
}

#[tokio::test]
async fn end_session_requires_voice() {
    let h = harness().build();
    let seeded = h.seed("Platform Engineer", &["Q1"], None);

    let err = h
        .state
        .sessions
        .end_session(seeded.interview_id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Interview(InterviewError::Validation(_))
    ));
}

#[tokio::test]
async fn next_question_walks_position_order_then_completes() {
    let h = harness().build();
    let seeded = h.seed("Platform Engineer", &["First?", "Second?"], None);
    h.state
        .sessions
        .create_session(seeded.interview_id)
        .await
        .unwrap();

    for (index, question_id) in seeded.questions.iter().enumerate() {
        let next = h
            .state
            .sessions
            .get_next_question(seeded.interview_id)
            .await
            .unwrap();
        match next {
            NextQuestion::Question {
                question_id: asked,
                index: at,
                total,
                ..
            } => {
                assert_eq!(asked, *question_id);
                assert_eq!(at, index);
                assert_eq!(total, 2);
            }
            other => panic!("expected a question, got {other:?}"),
        }
        h.state
            .sessions
            .save_voice_answer(
                seeded.interview_id,
                voice_answer(*question_id, "spoken answer", VoiceMetadata::default()),
            )
            .await
            .unwrap();
    }

    let done = h
        .state
        .sessions
        .get_next_question(seeded.interview_id)
        .await
        .unwrap();
    assert!(matches!(done, NextQuestion::Completed { .. }));

    let interview = h.interview(seeded.interview_id);
    assert_eq!(interview.status, InterviewStatus::Finished);
    assert_eq!(interview.result, Some(InterviewResult::Successful));

    // Asking again on a finished interview changes nothing.
    let again = h
        .state
        .sessions
        .get_next_question(seeded.interview_id)
        .await
        .unwrap();
    assert!(matches!(again, NextQuestion::Completed { .. }));
}

#[tokio::test]
async fn low_quality_voice_answers_are_stored_with_warnings() {
    let h = harness().build();
    let seeded = h.seed("Platform Engineer", &["Q1", "Q2"], None);
    h.state
        .sessions
        .create_session(seeded.interview_id)
        .await
        .unwrap();

    let saved = h
        .state
        .sessions
        .save_voice_answer(
            seeded.interview_id,
            voice_answer(
                seeded.questions[0],
                "mumbled answer",
                VoiceMetadata {
                    confidence: Some(0.2),
                    speaker_id: Some("spk-0".into()),
                    emotion: Some("nervous".into()),
                    duration_seconds: Some(420.0),
                },
            ),
        )
        .await
        .unwrap();
    assert_eq!(saved.warnings.len(), 2);

    let clean = h
        .state
        .sessions
        .save_voice_answer(
            seeded.interview_id,
            voice_answer(
                seeded.questions[1],
                "clear answer",
                VoiceMetadata {
                    confidence: Some(0.97),
                    duration_seconds: Some(40.0),
                    ..VoiceMetadata::default()
                },
            ),
        )
        .await
        .unwrap();
    assert!(clean.warnings.is_empty());

    let answers = h.answers(seeded.interview_id);
    assert_eq!(answers.len(), 2);
    assert_eq!(answers[0].confidence, Some(0.2));
    assert_eq!(answers[0].speaker_id.as_deref(), Some("spk-0"));
    assert_eq!(answers[0].emotion.as_deref(), Some("nervous"));
    assert_eq!(answers[0].text_answer.as_deref(), Some("mumbled answer"));
    assert_eq!(answers[0].raw_transcription.as_deref(), Some("mumbled answer"));
    assert_eq!(
        answers[0].formatted_transcription.as_deref(),
        Some("mumbled answer")
    );
}

#[tokio::test]
async fn next_question_is_chosen_by_answer_count() {
    let h = harness().build();
    let seeded = h.seed("Platform Engineer", &["First?", "Second?", "Third?"], None);
    // Answered out of order: the count, not the gap, decides the next index.
    h.answer_all(seeded.interview_id, &[(seeded.questions[2], "jumped ahead")]);

    let next = h
        .state
        .sessions
        .get_next_question(seeded.interview_id)
        .await
        .unwrap();
    match next {
        NextQuestion::Question {
            question_id, index, ..
        } => {
            assert_eq!(index, 1);
            assert_eq!(question_id, seeded.questions[1]);
        }
        other => panic!("expected a question, got {other:?}"),
    }
}

#[tokio::test]
async fn conversation_started_before_create_returns_keeps_the_session() {
    let h = harness()
        .agent(FakeAgent {
            start_conversation_on_create: true,
            ..FakeAgent::default()
        })
        .build();
    let seeded = h.seed("Platform Engineer", &["Q1", "Q2"], None);

    let view = h
        .state
        .sessions
        .create_session(seeded.interview_id)
        .await
        .unwrap();
    assert_eq!(view.status, Some(VoiceSessionStatus::Active));
    assert_eq!(
        view.session_id.as_deref(),
        Some(&*format!("sess-{}", seeded.interview_id))
    );
    assert!(h.agent.ended().is_empty(), "the live session must not be torn down");

    let interview = h.interview(seeded.interview_id);
    assert_eq!(interview.status, InterviewStatus::InProgress);
    assert!(interview.voice_enabled);
    assert!(interview.started_at.is_some());
}

#[tokio::test]
async fn concurrent_completion_requests_finish_once() {
    let h = harness().build();
    let seeded = h.seed("Platform Engineer", &["Only?"], None);
    h.state
        .sessions
        .create_session(seeded.interview_id)
        .await
        .unwrap();
    h.state
        .sessions
        .save_voice_answer(
            seeded.interview_id,
            voice_answer(seeded.questions[0], "done", VoiceMetadata::default()),
        )
        .await
        .unwrap();

    let sessions = &h.state.sessions;
    let (first, second) = tokio::join!(
        sessions.get_next_question(seeded.interview_id),
        sessions.get_next_question(seeded.interview_id),
    );
    assert!(matches!(first.unwrap(), NextQuestion::Completed { .. }));
    assert!(matches!(second.unwrap(), NextQuestion::Completed { .. }));

    let interview = h.interview(seeded.interview_id);
    assert_eq!(interview.status, InterviewStatus::Finished);
    assert_eq!(interview.result, Some(InterviewResult::Successful));
}

#[tokio::test]
async fn duplicate_end_interview_calls_both_succeed() {
    let h = harness().build();
    let seeded = h.seed("Platform Engineer", &["Q1", "Q2"], None);
    h.state
        .sessions
        .create_session(seeded.interview_id)
        .await
        .unwrap();
    h.state
        .sessions
        .save_voice_answer(
            seeded.interview_id,
            voice_answer(seeded.questions[0], "partial", VoiceMetadata::default()),
        )
        .await
        .unwrap();

    let sessions = &h.state.sessions;
    let (first, second) = tokio::join!(
        sessions.end_interview(seeded.interview_id),
        sessions.end_interview(seeded.interview_id),
    );
    let (first, second) = (first.unwrap(), second.unwrap());
    assert_eq!(first.status, Some(VoiceSessionStatus::Ended));
    assert_eq!(second.status, Some(VoiceSessionStatus::Ended));

    let interview = h.interview(seeded.interview_id);
    assert_eq!(interview.status, InterviewStatus::Finished);
    assert!(interview.awaiting_evaluation());

    let again = h
        .state
        .sessions
        .end_interview(seeded.interview_id)
        .await
        .unwrap();
    assert_eq!(again.finished_at, first.finished_at);
    assert_eq!(again.finished_at, second.finished_at);
}
