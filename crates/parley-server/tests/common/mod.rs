//! Shared fixtures: a temp-file database and in-process oracles.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use parley_db::{open_database, DbPool, DbRuntimeSettings};
use parley_interview::{store, InterviewMachine};
use parley_server::config::Config;
use parley_server::stats::MemoryStats;
use parley_server::{build_state, AppState, Oracles};
use parley_voice::{
    SessionHandle, SessionRequest, SpeechToText, TextGenerator, VoiceAgent, VoiceError,
};

pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

type Reply = dyn Fn(&str, Option<&str>) -> Result<String, VoiceError> + Send + Sync;

/// Text generator answering through a closure over `(prompt, system)`.
pub struct FakeLlm {
    reply: Box<Reply>,
    pub calls: AtomicUsize,
    pub available: AtomicBool,
}

impl FakeLlm {
    pub fn new(
        reply: impl Fn(&str, Option<&str>) -> Result<String, VoiceError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            reply: Box::new(reply),
            calls: AtomicUsize::new(0),
            available: AtomicBool::new(true),
        }
    }

    /// Echoes the prompt back in upper case.
    pub fn shouting() -> Self {
        Self::new(|prompt, _| Ok(prompt.to_uppercase()))
    }

    pub fn failing() -> Self {
        Self::new(|_, _| Err(VoiceError::Unavailable("llm down".into())))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for FakeLlm {
    async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String, VoiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.reply)(prompt, system)
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

/// Speech-to-text returning a fixed transcript.
pub struct FakeStt {
    pub transcript: Option<String>,
    pub available: AtomicBool,
    pub seen_content_types: Mutex<Vec<String>>,
    /// Calls that fail before `transcript` is returned.
    pub failures_left: AtomicUsize,
}

impl FakeStt {
    pub fn new(transcript: &str) -> Self {
        Self {
            transcript: Some(transcript.to_string()),
            available: AtomicBool::new(true),
            seen_content_types: Mutex::new(Vec::new()),
            failures_left: AtomicUsize::new(0),
        }
    }

    /// Fails the first `failures` calls, then returns `transcript`.
    pub fn flaky(failures: usize, transcript: &str) -> Self {
        let stt = Self::new(transcript);
        stt.failures_left.store(failures, Ordering::SeqCst);
        stt
    }

    pub fn calls(&self) -> usize {
        self.seen_content_types.lock().unwrap().len()
    }

    pub fn failing() -> Self {
        Self {
            transcript: None,
            ..Self::new("")
        }
    }
}

#[async_trait]
impl SpeechToText for FakeStt {
    async fn transcribe(&self, _audio: &[u8], content_type: &str) -> Result<String, VoiceError> {
        self.seen_content_types
            .lock()
            .unwrap()
            .push(content_type.to_string());
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(VoiceError::Stt("decoder busy".into()));
        }
        self.transcript
            .clone()
            .ok_or_else(|| VoiceError::Stt("decoder crashed".into()))
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

/// Voice agent recording every call.
#[derive(Default)]
pub struct FakeAgent {
    pub created: Mutex<Vec<SessionRequest>>,
    pub ended: Mutex<Vec<String>>,
    pub fail_create: Option<fn() -> VoiceError>,
    pub fail_end: bool,
    /// Delivers the conversation-started event before `create_session`
    /// returns, the way a fast remote agent can.
    pub start_conversation_on_create: bool,
    /// Set by the harness; used by `start_conversation_on_create`.
    pub pool: OnceLock<DbPool>,
}

impl FakeAgent {
    pub fn created(&self) -> Vec<SessionRequest> {
        self.created.lock().unwrap().clone()
    }

    pub fn ended(&self) -> Vec<String> {
        self.ended.lock().unwrap().clone()
    }
}

#[async_trait]
impl VoiceAgent for FakeAgent {
    async fn create_session(&self, request: &SessionRequest) -> Result<SessionHandle, VoiceError> {
        if let Some(fail) = self.fail_create {
            return Err(fail());
        }
        self.created.lock().unwrap().push(request.clone());
        if self.start_conversation_on_create {
            let pool = self.pool.get().expect("harness sets the agent pool");
            let mut conn = pool.get().unwrap();
            InterviewMachine::default()
                .mark_conversation_started(&mut conn, request.interview_id)
                .unwrap();
        }
        Ok(SessionHandle {
            session_id: format!("sess-{}", request.interview_id),
            agent_id: None,
        })
    }

    async fn end_session(&self, session_id: &str) -> Result<(), VoiceError> {
        self.ended.lock().unwrap().push(session_id.to_string());
        if self.fail_end {
            return Err(VoiceError::Unavailable("agent gone".into()));
        }
        Ok(())
    }

    async fn is_available(&self) -> bool {
        true
    }
}

/// Configuration with a configured agent and an enforced webhook secret.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.voice_agent.api_key = "agent-key".into();
    config.voice_agent.agent_id = "agent-1".into();
    config.voice_agent.webhook_url = "https://parley.test/api/webhooks/voice".into();
    config.webhook.validate_signature = true;
    config.webhook.secret = WEBHOOK_SECRET.into();
    config
}

pub struct Harness {
    _dir: tempfile::TempDir,
    pub pool: DbPool,
    pub state: AppState,
    pub stats: Arc<MemoryStats>,
    pub agent: Arc<FakeAgent>,
    pub stt: Arc<FakeStt>,
    pub llm: Arc<FakeLlm>,
}

pub struct HarnessBuilder {
    config: Config,
    agent: FakeAgent,
    stt: FakeStt,
    llm: FakeLlm,
}

impl HarnessBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn agent(mut self, agent: FakeAgent) -> Self {
        self.agent = agent;
        self
    }

    pub fn stt(mut self, stt: FakeStt) -> Self {
        self.stt = stt;
        self
    }

    pub fn llm(mut self, llm: FakeLlm) -> Self {
        self.llm = llm;
        self
    }

    pub fn build(self) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.db");
        let (pool, _) = open_database(path.to_str().unwrap(), DbRuntimeSettings::default()).unwrap();

        let stats = Arc::new(MemoryStats::new());
        let _ = self.agent.pool.set(pool.clone());
        let agent = Arc::new(self.agent);
        let stt = Arc::new(self.stt);
        let llm = Arc::new(self.llm);
        let oracles = Oracles {
            agent: agent.clone(),
            stt: stt.clone(),
            llm: llm.clone(),
        };
        let state = build_state(&self.config, pool.clone(), oracles, stats.clone());

        Harness {
            _dir: dir,
            pool,
            state,
            stats,
            agent,
            stt,
            llm,
        }
    }
}

pub fn harness() -> HarnessBuilder {
    HarnessBuilder {
        config: test_config(),
        agent: FakeAgent::default(),
        stt: FakeStt::new("um so I would use a queue"),
        llm: FakeLlm::shouting(),
    }
}

/// A seeded interview and the ids around it.
pub struct Seeded {
    pub interview_id: i64,
    pub candidate_id: i64,
    pub position_id: i64,
    pub questions: Vec<i64>,
}

impl Harness {
    /// Creates a position with `questions`, a candidate and a `NOT_STARTED`
    /// interview.
    pub fn seed(&self, title: &str, questions: &[&str], min_score: Option<f64>) -> Seeded {
        let conn = self.pool.get().unwrap();
        let position_id = store::create_position(&conn, title, "middle", min_score).unwrap();
        let questions = questions
            .iter()
            .enumerate()
            .map(|(i, text)| store::add_question(&conn, position_id, text, i as i64).unwrap())
            .collect();
        let candidate_id = store::create_candidate(&conn, "Robin", Some("robin@example.com")).unwrap();
        let interview_id = store::convert_candidate(&conn, candidate_id, position_id).unwrap();
        Seeded {
            interview_id,
            candidate_id,
            position_id,
            questions,
        }
    }

    pub fn interview(&self, interview_id: i64) -> parley_interview::Interview {
        let conn = self.pool.get().unwrap();
        store::get_interview(&conn, interview_id).unwrap()
    }

    pub fn answers(&self, interview_id: i64) -> Vec<parley_interview::Answer> {
        let conn = self.pool.get().unwrap();
        store::list_answers(&conn, interview_id).unwrap()
    }

    /// Starts the interview and stores a typed answer for each `(question, text)`.
    pub fn answer_all(&self, interview_id: i64, answers: &[(i64, &str)]) {
        let mut conn = self.pool.get().unwrap();
        let machine = &self.state.machine;
        let interview = store::get_interview(&conn, interview_id).unwrap();
        if interview.status == parley_types::InterviewStatus::NotStarted {
            machine.start(&mut conn, interview_id).unwrap();
        }
        for (question_id, text) in answers {
            machine
                .submit_answer(
                    &mut conn,
                    interview_id,
                    &parley_interview::NewAnswer::text(*question_id, *text),
                )
                .unwrap();
        }
    }
}
