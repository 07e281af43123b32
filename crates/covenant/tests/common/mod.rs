#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use covenant::{
    Actor, ActorContext, ActorId, Behavior, CommitRecord, HandlerFault, HttpActor, HttpOutcome,
    Ledger, LogicalClock, MemorySink, RuntimeBuilder, RuntimeConfig, RuntimeHandle, Transport,
};
use tokio::task::JoinHandle;

/// `init = [0]`, every contract holds, `handle(msg, s) = s ++ msg`.
pub struct AppendActor;

impl Actor for AppendActor {
    fn init(&self, _ctx: &ActorContext) -> Result<Vec<u8>, HandlerFault> {
        Ok(vec![0])
    }

    fn state_contract(&self, _state: &[u8]) -> bool {
        true
    }

    fn message_contract(&self, _message: &[u8], _state: &[u8]) -> bool {
        true
    }

    fn handle(
        &self,
        message: &[u8],
        state: &[u8],
        _ctx: &ActorContext,
    ) -> Result<Vec<u8>, HandlerFault> {
        Ok([state, message].concat())
    }
}

/// Like [`AppendActor`], but refuses messages longer than four bytes and
/// states longer than `max_state` bytes.
pub struct LimitedAppend {
    pub max_state: usize,
}

impl Actor for LimitedAppend {
    fn init(&self, ctx: &ActorContext) -> Result<Vec<u8>, HandlerFault> {
        ctx.log("starting with [0]");
        Ok(vec![0])
    }

    fn state_contract(&self, state: &[u8]) -> bool {
        state.len() <= self.max_state
    }

    fn message_contract(&self, message: &[u8], _state: &[u8]) -> bool {
        message.len() <= 4
    }

    fn handle(
        &self,
        message: &[u8],
        state: &[u8],
        _ctx: &ActorContext,
    ) -> Result<Vec<u8>, HandlerFault> {
        Ok([state, message].concat())
    }
}

/// Appends messages, refuses `reject`, faults on `fault`, panics on `panic`.
pub struct FaultyActor;

impl Actor for FaultyActor {
    fn init(&self, _ctx: &ActorContext) -> Result<Vec<u8>, HandlerFault> {
        Ok(Vec::new())
    }

    fn state_contract(&self, _state: &[u8]) -> bool {
        true
    }

    fn message_contract(&self, message: &[u8], _state: &[u8]) -> bool {
        message != b"reject"
    }

    fn handle(
        &self,
        message: &[u8],
        state: &[u8],
        _ctx: &ActorContext,
    ) -> Result<Vec<u8>, HandlerFault> {
        match message {
            b"fault" => Err(HandlerFault::new("refusing to continue")),
            b"panic" => panic!("handler panicked on purpose"),
            _ => Ok([state, message].concat()),
        }
    }
}

/// Fails during init.
pub struct BrokenInit;

impl Actor for BrokenInit {
    fn init(&self, _ctx: &ActorContext) -> Result<Vec<u8>, HandlerFault> {
        Err(HandlerFault::new("no initial state"))
    }

    fn state_contract(&self, _state: &[u8]) -> bool {
        true
    }

    fn message_contract(&self, _message: &[u8], _state: &[u8]) -> bool {
        true
    }

    fn handle(
        &self,
        _message: &[u8],
        state: &[u8],
        _ctx: &ActorContext,
    ) -> Result<Vec<u8>, HandlerFault> {
        Ok(state.to_vec())
    }
}

/// Counts messages and passes each one on to `target`.
pub struct RelayActor {
    pub target: ActorId,
}

impl Actor for RelayActor {
    fn init(&self, _ctx: &ActorContext) -> Result<Vec<u8>, HandlerFault> {
        Ok(vec![0])
    }

    fn state_contract(&self, state: &[u8]) -> bool {
        state.len() == 1
    }

    fn message_contract(&self, message: &[u8], _state: &[u8]) -> bool {
        message != b"drop"
    }

    fn handle(
        &self,
        message: &[u8],
        state: &[u8],
        ctx: &ActorContext,
    ) -> Result<Vec<u8>, HandlerFault> {
        ctx.send(self.target.clone(), message.to_vec());
        Ok(vec![state[0].wrapping_add(1)])
    }
}

/// [`AppendActor`] with a handler that takes `delay` of wall time.
pub struct SlowAppend {
    pub delay: Duration,
}

impl Actor for SlowAppend {
    fn init(&self, _ctx: &ActorContext) -> Result<Vec<u8>, HandlerFault> {
        Ok(vec![0])
    }

    fn state_contract(&self, _state: &[u8]) -> bool {
        true
    }

    fn message_contract(&self, _message: &[u8], _state: &[u8]) -> bool {
        true
    }

    fn handle(
        &self,
        message: &[u8],
        state: &[u8],
        _ctx: &ActorContext,
    ) -> Result<Vec<u8>, HandlerFault> {
        std::thread::sleep(self.delay);
        Ok([state, message].concat())
    }
}

/// Sends `count` numbered messages to `target` from a single transition.
pub struct FanOut {
    pub target: ActorId,
    pub count: u8,
}

impl Actor for FanOut {
    fn init(&self, _ctx: &ActorContext) -> Result<Vec<u8>, HandlerFault> {
        Ok(vec![0])
    }

    fn state_contract(&self, _state: &[u8]) -> bool {
        true
    }

    fn message_contract(&self, _message: &[u8], _state: &[u8]) -> bool {
        true
    }

    fn handle(
        &self,
        _message: &[u8],
        state: &[u8],
        ctx: &ActorContext,
    ) -> Result<Vec<u8>, HandlerFault> {
        for i in 1..=self.count {
            ctx.send(self.target.clone(), vec![i]);
        }
        Ok(vec![state[0].wrapping_add(1)])
    }
}

/// A one-byte counter served over HTTP.
///
/// * `GET` answers with the count and changes nothing.
/// * `INC` increments; the count may not exceed 2.
/// * Empty requests are refused by the http contract.
pub struct CounterHttp;

impl Actor for CounterHttp {
    fn init(&self, _ctx: &ActorContext) -> Result<Vec<u8>, HandlerFault> {
        Ok(vec![0])
    }

    fn state_contract(&self, state: &[u8]) -> bool {
        state.len() == 1 && state[0] <= 2
    }

    fn message_contract(&self, _message: &[u8], _state: &[u8]) -> bool {
        true
    }

    fn handle(
        &self,
        _message: &[u8],
        state: &[u8],
        _ctx: &ActorContext,
    ) -> Result<Vec<u8>, HandlerFault> {
        Ok(state.to_vec())
    }
}

impl HttpActor for CounterHttp {
    fn http_contract(&self, request: &[u8], _state: &[u8]) -> bool {
        !request.is_empty()
    }

    fn handle_http(
        &self,
        request: &[u8],
        state: &[u8],
        _ctx: &ActorContext,
    ) -> Result<HttpOutcome, HandlerFault> {
        match request {
            b"GET" => Ok(HttpOutcome::read_only(format!("count={}", state[0]))),
            b"INC" => {
                let next = state[0] + 1;
                Ok(HttpOutcome::with_state(format!("count={}", next), vec![next]))
            }
            _ => Err(HandlerFault::new("unknown request")),
        }
    }
}

pub struct TestRuntime {
    pub handle: RuntimeHandle,
    pub sink: MemorySink,
    pub ledger: Arc<Ledger>,
    pub task: JoinHandle<()>,
}

impl TestRuntime {
    pub async fn start() -> Self {
        Self::start_with(RuntimeConfig::default(), None).await
    }

    pub async fn start_with(config: RuntimeConfig, transport: Option<Arc<dyn Transport>>) -> Self {
        let sink = MemorySink::default();
        let ledger = Arc::new(Ledger::with_clock(Arc::new(LogicalClock::from_unix_epoch())));
        let mut builder = RuntimeBuilder::new(config)
            .ledger(ledger.clone())
            .sinks(vec![Box::new(sink.clone())]);
        if let Some(transport) = transport {
            builder = builder.transport(transport);
        }
        let (runtime, handle) = builder.build().expect("runtime builds");
        let task = tokio::spawn(runtime.run());
        Self {
            handle,
            sink,
            ledger,
            task,
        }
    }

    /// Waits for the logger to write everything enqueued so far and returns
    /// every line written.
    pub async fn log_lines(&self) -> Vec<String> {
        self.handle.logger().flush().await;
        self.sink.lines()
    }

    pub async fn stop(self) {
        self.handle.shutdown().await.expect("runtime shuts down");
        self.task.await.expect("runtime task joins");
    }
}

pub fn states(chain: &[CommitRecord]) -> Vec<Vec<u8>> {
    chain.iter().map(|r| r.data.state().to_vec()).collect()
}

/// Polls until `actor` has `len` commits.
pub async fn wait_for_chain(handle: &RuntimeHandle, actor: &str, len: usize) -> Vec<CommitRecord> {
    for _ in 0..200 {
        let chain = handle.get_chain(actor).await.expect("chain readable");
        if chain.len() >= len {
            return chain;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("actor {} never reached {} commits", actor, len);
}
