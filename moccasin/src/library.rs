//! Stock actors.
//!
//! A handful of sources, transformers and sinks that work under every
//! director. They are mostly useful to assemble test models:
//!
//! * sources: [`Ramp`], [`Const`], [`PeriodicSource`], [`TimedSource`],
//! * transformers: [`Scale`], [`SampleDelay`], [`TimeDelay`],
//!   [`Integrator`],
//! * sink: [`Recorder`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::actor::{Actor, Context, PortSpec};
use crate::error::ActionError;
use crate::receiver::ReceiverError;
use crate::time::{MonotonicTime, SuperdenseTime};
use crate::token::{Token, TokenType};

/// Emits an arithmetic sequence of integers on `out`.
///
/// Each firing emits `rate` consecutive values. With a limit, postfire
/// requests termination after the specified number of firings.
#[derive(Clone, Debug)]
pub struct Ramp {
    start: i64,
    step: i64,
    rate: usize,
    limit: Option<u64>,
    next: i64,
    firings: u64,
}

impl Ramp {
    /// Creates a ramp starting at `start` with a step of 1.
    pub fn new(start: i64) -> Self {
        Self {
            start,
            step: 1,
            rate: 1,
            limit: None,
            next: start,
            firings: 0,
        }
    }

    /// Sets the increment between consecutive values.
    pub fn with_step(mut self, step: i64) -> Self {
        self.step = step;
        self
    }

    /// Sets the number of values emitted per firing.
    pub fn with_rate(mut self, rate: usize) -> Self {
        self.rate = rate;
        self
    }

    /// Requests termination after `firings` firings.
    pub fn with_limit(mut self, firings: u64) -> Self {
        self.limit = Some(firings);
        self
    }
}

impl Actor for Ramp {
    fn ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::output("out", TokenType::Int).with_rate(self.rate)]
    }

    fn initialize(&mut self, _: &mut Context<'_>) -> Result<(), ActionError> {
        self.next = self.start;
        self.firings = 0;

        Ok(())
    }

    fn fire(&mut self, ctx: &mut Context<'_>) -> Result<(), ActionError> {
        let rate = ctx.rate("out").unwrap_or(self.rate);
        for i in 0..rate {
            ctx.send("out", self.next + i as i64 * self.step)?;
        }

        Ok(())
    }

    fn postfire(&mut self, ctx: &mut Context<'_>) -> Result<bool, ActionError> {
        let rate = ctx.rate("out").unwrap_or(self.rate);
        self.next += rate as i64 * self.step;
        self.firings += 1;

        Ok(self.limit.map_or(true, |limit| self.firings < limit))
    }
}

/// Emits a constant on `out` each time it fires.
///
/// Tokens received on the optional `trigger` multiport are consumed and
/// discarded; under a discrete-event director they are what makes the actor
/// fire.
#[derive(Clone, Debug)]
pub struct Const {
    value: Token,
}

impl Const {
    /// Creates an actor emitting `value`.
    pub fn new(value: impl Into<Token>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl Actor for Const {
    fn ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::input("trigger", TokenType::General).multiport(),
            PortSpec::output("out", self.value.ty()),
        ]
    }

    fn fire(&mut self, ctx: &mut Context<'_>) -> Result<(), ActionError> {
        for channel in 0..ctx.width("trigger") {
            while ctx.has_tokens("trigger", channel, 1) {
                ctx.get_from("trigger", channel)?;
            }
        }

        ctx.send("out", self.value.clone())
    }
}

/// Multiplies each number received on `in` by a factor and emits the
/// product as a double on `out`.
#[derive(Clone, Debug)]
pub struct Scale {
    factor: f64,
}

impl Scale {
    /// Creates a scaler.
    pub fn new(factor: f64) -> Self {
        Self { factor }
    }
}

impl Actor for Scale {
    fn ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::input("in", TokenType::Double),
            PortSpec::output("out", TokenType::Double),
        ]
    }

    fn fire(&mut self, ctx: &mut Context<'_>) -> Result<(), ActionError> {
        let token = ctx.get("in")?;
        let value = token
            .as_double()
            .ok_or_else(|| ctx.error(format!("expected a number, got {token}")))?;

        ctx.send("out", value * self.factor)
    }
}

/// Tokens recorded by a [`Recorder`], with the tag at which each was
/// received.
#[derive(Clone, Debug, Default)]
pub struct RecorderHandle {
    entries: Arc<Mutex<Vec<(SuperdenseTime, Token)>>>,
}

impl RecorderHandle {
    /// Returns the number of recorded tokens.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Checks whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Returns the recorded tokens in arrival order.
    pub fn tokens(&self) -> Vec<Token> {
        self.entries.lock().iter().map(|(_, t)| t.clone()).collect()
    }

    /// Returns the recorded tags in arrival order.
    pub fn tags(&self) -> Vec<SuperdenseTime> {
        self.entries.lock().iter().map(|&(tag, _)| tag).collect()
    }

    /// Returns the recorded tags and tokens in arrival order.
    pub fn entries(&self) -> Vec<(SuperdenseTime, Token)> {
        self.entries.lock().clone()
    }
}

/// Records the tokens received on its `in` multiport.
///
/// Each firing reads up to `rate` tokens per channel, blocking under a
/// process-network director. With a limit, postfire requests termination
/// once that many tokens were recorded.
#[derive(Clone, Debug)]
pub struct Recorder {
    rate: usize,
    limit: Option<usize>,
    log: RecorderHandle,
}

impl Recorder {
    /// Creates a recorder reading one token per channel and firing.
    pub fn new() -> Self {
        Self {
            rate: 1,
            limit: None,
            log: RecorderHandle::default(),
        }
    }

    /// Sets the number of tokens read per channel and firing.
    pub fn with_rate(mut self, rate: usize) -> Self {
        self.rate = rate;
        self
    }

    /// Requests termination once `tokens` tokens were recorded.
    pub fn with_limit(mut self, tokens: usize) -> Self {
        self.limit = Some(tokens);
        self
    }

    /// Returns a handle to the recorded tokens, which remains valid after
    /// the recorder was moved into a composite.
    pub fn handle(&self) -> RecorderHandle {
        self.log.clone()
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Actor for Recorder {
    fn ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::input("in", TokenType::General)
            .multiport()
            .with_rate(self.rate)]
    }

    fn initialize(&mut self, _: &mut Context<'_>) -> Result<(), ActionError> {
        self.log.entries.lock().clear();

        Ok(())
    }

    fn fire(&mut self, ctx: &mut Context<'_>) -> Result<(), ActionError> {
        let rate = ctx.rate("in").unwrap_or(self.rate);
        let tag = ctx.tag();
        for channel in 0..ctx.width("in") {
            for _ in 0..rate {
                match ctx.get_from("in", channel) {
                    Ok(token) => self.log.entries.lock().push((tag, token)),
                    Err(ActionError::Receiver {
                        error: ReceiverError::NoToken,
                        ..
                    }) => break,
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(())
    }

    fn postfire(&mut self, _: &mut Context<'_>) -> Result<bool, ActionError> {
        Ok(self.limit.map_or(true, |limit| self.log.len() < limit))
    }
}

/// Forwards tokens from `in` to `out`, after emitting a fixed sequence of
/// initial tokens.
///
/// The output is delayed, which breaks dataflow cycles and zero-delay loops.
#[derive(Clone, Debug)]
pub struct SampleDelay {
    initial: Vec<Token>,
}

impl SampleDelay {
    /// Creates a delay emitting `initial` before anything else.
    pub fn new(initial: impl IntoIterator<Item = Token>) -> Self {
        Self {
            initial: initial.into_iter().collect(),
        }
    }
}

impl Actor for SampleDelay {
    fn ports(&self) -> Vec<PortSpec> {
        // The ports take the type of the initial tokens when they agree.
        let ty = match self.initial.split_first() {
            Some((first, rest)) if rest.iter().all(|t| t.ty() == first.ty()) => first.ty(),
            _ => TokenType::General,
        };

        vec![
            PortSpec::input("in", ty),
            PortSpec::output("out", ty)
                .with_initial_tokens(self.initial.iter().cloned())
                .delayed(),
        ]
    }

    fn fire(&mut self, ctx: &mut Context<'_>) -> Result<(), ActionError> {
        let token = ctx.get("in")?;

        ctx.send("out", token)
    }
}

/// Emits each token of a list at its associated time.
#[derive(Clone, Debug)]
pub struct TimedSource {
    events: Vec<(MonotonicTime, Token)>,
    next: usize,
}

impl TimedSource {
    /// Creates a source emitting the specified events.
    ///
    /// Events are sorted by time; events sharing a time are emitted in list
    /// order during the same firing.
    pub fn new(events: impl IntoIterator<Item = (MonotonicTime, Token)>) -> Self {
        let mut events: Vec<_> = events.into_iter().collect();
        events.sort_by_key(|&(time, _)| time);

        Self { events, next: 0 }
    }
}

impl Actor for TimedSource {
    fn ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::output("out", TokenType::General)]
    }

    fn initialize(&mut self, ctx: &mut Context<'_>) -> Result<(), ActionError> {
        self.next = self.events.partition_point(|&(time, _)| time < ctx.time());
        if let Some(&(time, _)) = self.events.get(self.next) {
            ctx.fire_at(time)?;
        }

        Ok(())
    }

    fn fire(&mut self, ctx: &mut Context<'_>) -> Result<(), ActionError> {
        let now = ctx.time();
        while let Some((time, token)) = self.events.get(self.next) {
            if *time > now {
                break;
            }
            ctx.send("out", token.clone())?;
            self.next += 1;
        }

        Ok(())
    }

    fn postfire(&mut self, ctx: &mut Context<'_>) -> Result<bool, ActionError> {
        if let Some(&(time, _)) = self.events.get(self.next) {
            ctx.fire_at(time)?;
        }

        Ok(true)
    }
}

/// Emits an increasing integer on `out` at regular intervals.
#[derive(Clone, Debug)]
pub struct PeriodicSource {
    period: Duration,
    offset: Duration,
    count: i64,
}

impl PeriodicSource {
    /// Creates a source firing at the start time and then every `period`.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            offset: Duration::ZERO,
            count: 0,
        }
    }

    /// Delays the first firing by `offset`.
    pub fn with_offset(mut self, offset: Duration) -> Self {
        self.offset = offset;
        self
    }
}

impl Actor for PeriodicSource {
    fn ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::output("out", TokenType::Int)]
    }

    fn preinitialize(&mut self, ctx: &mut Context<'_>) -> Result<(), ActionError> {
        if self.period.is_zero() {
            return Err(ctx.error("the period must be positive"));
        }

        Ok(())
    }

    fn initialize(&mut self, ctx: &mut Context<'_>) -> Result<(), ActionError> {
        self.count = 0;

        ctx.fire_after(self.offset)
    }

    fn fire(&mut self, ctx: &mut Context<'_>) -> Result<(), ActionError> {
        ctx.send("out", self.count)
    }

    fn postfire(&mut self, ctx: &mut Context<'_>) -> Result<bool, ActionError> {
        self.count += 1;
        ctx.fire_after(self.period)?;

        Ok(true)
    }
}

/// Re-emits each token received on `in` after a fixed model-time delay.
///
/// A zero delay emits the token at the next microstep. The output is
/// delayed, which breaks zero-delay loops.
#[derive(Clone, Debug)]
pub struct TimeDelay {
    delay: Duration,
    pending: VecDeque<(MonotonicTime, Token)>,
}

impl TimeDelay {
    /// Creates a delay of `delay`.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: VecDeque::new(),
        }
    }
}

impl Actor for TimeDelay {
    fn ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::input("in", TokenType::General),
            PortSpec::output("out", TokenType::General).delayed(),
        ]
    }

    fn initialize(&mut self, _: &mut Context<'_>) -> Result<(), ActionError> {
        self.pending.clear();

        Ok(())
    }

    fn fire(&mut self, ctx: &mut Context<'_>) -> Result<(), ActionError> {
        let now = ctx.time();
        while self.pending.front().is_some_and(|(time, _)| *time <= now) {
            if let Some((_, token)) = self.pending.pop_front() {
                ctx.send("out", token)?;
            }
        }

        let due = now + self.delay;
        while ctx.has_token("in") {
            let token = ctx.get("in")?;
            self.pending.push_back((due, token));
            ctx.fire_at(due)?;
        }

        Ok(())
    }
}

/// Forward-Euler integrator for continuous-time models.
///
/// Each firing emits the current state on `state`; postfire then adds the
/// product of the latest value received on `derivative` by the step size.
#[derive(Clone, Debug)]
pub struct Integrator {
    initial: f64,
    state: f64,
}

impl Integrator {
    /// Creates an integrator with the specified initial state.
    pub fn new(initial: f64) -> Self {
        Self {
            initial,
            state: initial,
        }
    }
}

impl Actor for Integrator {
    fn ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::input("derivative", TokenType::Double),
            PortSpec::output("state", TokenType::Double).delayed(),
        ]
    }

    fn initialize(&mut self, _: &mut Context<'_>) -> Result<(), ActionError> {
        self.state = self.initial;

        Ok(())
    }

    fn fire(&mut self, ctx: &mut Context<'_>) -> Result<(), ActionError> {
        ctx.send("state", self.state)
    }

    fn postfire(&mut self, ctx: &mut Context<'_>) -> Result<bool, ActionError> {
        let Some(step) = ctx.step_size() else {
            return Err(ctx.error("an integrator needs a continuous director"));
        };
        if ctx.has_token("derivative") {
            let token = ctx.get("derivative")?;
            let derivative = token
                .as_double()
                .ok_or_else(|| ctx.error(format!("expected a number, got {token}")))?;
            self.state += derivative * step.as_secs_f64();
        }

        Ok(true)
    }
}
