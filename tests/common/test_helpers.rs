#![allow(dead_code)]

use async_trait::async_trait;
use lifeline::jitter::FixedRandom;
use lifeline::telemetry::MemorySink;
use lifeline::{
    ApiConfigTable, Clock, ManualClock, ResilientClient, TrackingSleeper, Transport, TransportError,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// One scripted transport reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16),
    Body(u16, String),
    Fail(TransportError),
    /// Never completes; only a timeout or cancellation ends the attempt.
    Hang,
}

/// Transport that plays back replies in order, then repeats `otherwise`.
#[derive(Debug)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    otherwise: Reply,
    clock: ManualClock,
    started_at: Mutex<Vec<u64>>,
}

impl ScriptedTransport {
    pub fn new(clock: ManualClock, replies: Vec<Reply>, otherwise: Reply) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            otherwise,
            clock,
            started_at: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.started_at.lock().unwrap().len()
    }

    /// Clock reading at the start of each attempt.
    pub fn started_at(&self) -> Vec<u64> {
        self.started_at.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, _request: reqwest::Request) -> Result<reqwest::Response, TransportError> {
        self.started_at.lock().unwrap().push(self.clock.now_millis());
        let reply = self.replies.lock().unwrap().pop_front().unwrap_or_else(|| self.otherwise.clone());
        match reply {
            Reply::Status(status) => Ok(response(status, String::new())),
            Reply::Body(status, body) => Ok(response(status, body)),
            Reply::Fail(err) => Err(err),
            Reply::Hang => futures::future::pending().await,
        }
    }
}

fn response(status: u16, body: String) -> reqwest::Response {
    reqwest::Response::from(http::Response::builder().status(status).body(body).unwrap())
}

pub type TestClient = ResilientClient<Arc<ScriptedTransport>, MemorySink>;

/// Client wired to a manual clock, an advancing tracking sleeper, zero jitter
/// and an in-memory sink.
pub struct Harness {
    pub client: TestClient,
    pub transport: Arc<ScriptedTransport>,
    pub clock: ManualClock,
    pub sleeper: TrackingSleeper,
    pub sink: MemorySink,
}

impl Harness {
    pub fn new(configs: ApiConfigTable, replies: Vec<Reply>, otherwise: Reply) -> Self {
        let clock = ManualClock::starting_at(1_000_000);
        let sleeper = TrackingSleeper::advancing(clock.clone());
        let sink = MemorySink::new();
        let transport = Arc::new(ScriptedTransport::new(clock.clone(), replies, otherwise));
        let client = ResilientClient::builder(transport.clone())
            .configs(configs)
            .clock(clock.clone())
            .sleeper(sleeper.clone())
            .random(FixedRandom::new(0.0))
            .sink(sink.clone())
            .build();
        Self { client, transport, clock, sleeper, sink }
    }

    /// Built-in config table; every call answers `status`.
    pub fn always(status: u16) -> Self {
        Self::new(ApiConfigTable::default(), Vec::new(), Reply::Status(status))
    }
}

pub fn get(url: &str) -> reqwest::Request {
    reqwest::Request::new(reqwest::Method::GET, url.parse().unwrap())
}
