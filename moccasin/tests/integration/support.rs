//! Test actors shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use moccasin::actor::{Actor, Context, PortSpec};
use moccasin::error::ActionError;
use moccasin::time::SuperdenseTime;
use moccasin::token::{Token, TokenType};

/// Installs a `fmt` subscriber filtered by `RUST_LOG`.
///
/// Only the first call in a test binary takes effect.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Number of calls of each lifecycle method.
#[derive(Debug, Default)]
pub struct Counters {
    pub preinitialize: AtomicUsize,
    pub initialize: AtomicUsize,
    pub fire: AtomicUsize,
    pub wrapup: AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Initialize,
    Fire,
    Wrapup,
}

/// Counts its lifecycle calls and optionally fails in one phase.
///
/// Reads whatever is available on its `in` multiport and emits the number of
/// firings on `out`.
pub struct Probe {
    counters: Arc<Counters>,
    failure: Option<(Phase, usize)>,
}

impl Probe {
    pub fn new() -> (Self, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let probe = Self {
            counters: counters.clone(),
            failure: None,
        };

        (probe, counters)
    }

    /// Creates a probe failing on the `nth` call (1-based) of `phase`.
    pub fn failing(phase: Phase, nth: usize) -> (Self, Arc<Counters>) {
        let (mut probe, counters) = Self::new();
        probe.failure = Some((phase, nth));

        (probe, counters)
    }

    fn check(&self, ctx: &Context<'_>, phase: Phase, calls: usize) -> Result<(), ActionError> {
        if self.failure == Some((phase, calls)) {
            return Err(ctx.error(format!("{phase:?} failure")));
        }

        Ok(())
    }
}

impl Actor for Probe {
    fn ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::input("in", TokenType::General).multiport(),
            PortSpec::output("out", TokenType::Int),
        ]
    }

    fn preinitialize(&mut self, _: &mut Context<'_>) -> Result<(), ActionError> {
        self.counters.preinitialize.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }

    fn initialize(&mut self, ctx: &mut Context<'_>) -> Result<(), ActionError> {
        let calls = self.counters.initialize.fetch_add(1, Ordering::SeqCst) + 1;

        self.check(ctx, Phase::Initialize, calls)
    }

    fn fire(&mut self, ctx: &mut Context<'_>) -> Result<(), ActionError> {
        let calls = self.counters.fire.fetch_add(1, Ordering::SeqCst) + 1;
        self.check(ctx, Phase::Fire, calls)?;

        for channel in 0..ctx.width("in") {
            while ctx.has_tokens("in", channel, 1) {
                ctx.get_from("in", channel)?;
            }
        }

        ctx.send("out", calls as i64)
    }

    fn wrapup(&mut self, ctx: &mut Context<'_>) -> Result<(), ActionError> {
        let calls = self.counters.wrapup.fetch_add(1, Ordering::SeqCst) + 1;

        self.check(ctx, Phase::Wrapup, calls)
    }
}

/// Forwards each integer received on `in` to `out`.
pub struct Echo;

impl Actor for Echo {
    fn ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::input("in", TokenType::Int),
            PortSpec::output("out", TokenType::Int),
        ]
    }

    fn fire(&mut self, ctx: &mut Context<'_>) -> Result<(), ActionError> {
        let token = ctx.get("in")?;

        ctx.send("out", token)
    }
}

/// Adds one to each integer received on `in`.
pub struct Increment;

impl Actor for Increment {
    fn ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::input("in", TokenType::Int),
            PortSpec::output("out", TokenType::Int),
        ]
    }

    fn fire(&mut self, ctx: &mut Context<'_>) -> Result<(), ActionError> {
        let value = ctx.get("in")?.as_int().unwrap_or_default();

        ctx.send("out", value + 1)
    }
}

/// Shared record of firings.
pub type FiringLog = Arc<Mutex<Vec<(SuperdenseTime, String)>>>;

/// Logs each of its firings, drains its `in` multiport and emits a unit
/// token on `out`.
pub struct Tracer {
    name: String,
    log: FiringLog,
}

impl Tracer {
    pub fn new(name: &str, log: &FiringLog) -> Self {
        Self {
            name: name.to_owned(),
            log: log.clone(),
        }
    }
}

impl Actor for Tracer {
    fn ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::input("in", TokenType::General).multiport(),
            PortSpec::output("out", TokenType::Unit),
        ]
    }

    fn fire(&mut self, ctx: &mut Context<'_>) -> Result<(), ActionError> {
        for channel in 0..ctx.width("in") {
            while ctx.has_tokens("in", channel, 1) {
                ctx.get_from("in", channel)?;
            }
        }
        self.log.lock().unwrap().push((ctx.tag(), self.name.clone()));

        ctx.send("out", Token::Unit)
    }
}
