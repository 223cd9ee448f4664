//! Discrete-event ordering.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use moccasin::actor::{Actor, Context, PortSpec};
use moccasin::composite::CompositeActor;
use moccasin::director::DeDirector;
use moccasin::error::{ActionError, ExecutionError, SchedulingError};
use moccasin::library::{PeriodicSource, Recorder, Scale, TimeDelay, TimedSource};
use moccasin::manager::{Manager, RunConfig, RunOutcome};
use moccasin::time::{MonotonicTime, SuperdenseTime};
use moccasin::token::Token;

use crate::support::{init_logging, FiringLog, Tracer};

fn secs(s: u64) -> MonotonicTime {
    MonotonicTime::EPOCH + Duration::from_secs(s)
}

/// Requests firings at fixed times during initialization and logs the tag of
/// each firing.
struct Requester {
    times: Vec<MonotonicTime>,
    log: Arc<Mutex<Vec<SuperdenseTime>>>,
}

impl Actor for Requester {
    fn ports(&self) -> Vec<PortSpec> {
        Vec::new()
    }

    fn initialize(&mut self, ctx: &mut Context<'_>) -> Result<(), ActionError> {
        for &time in &self.times {
            ctx.fire_at(time)?;
        }

        Ok(())
    }

    fn fire(&mut self, ctx: &mut Context<'_>) -> Result<(), ActionError> {
        self.log.lock().unwrap().push(ctx.tag());

        Ok(())
    }
}

/// Asks to be fired at the epoch once model time has moved past it.
struct PastRequester;

impl Actor for PastRequester {
    fn ports(&self) -> Vec<PortSpec> {
        Vec::new()
    }

    fn initialize(&mut self, ctx: &mut Context<'_>) -> Result<(), ActionError> {
        ctx.fire_at(secs(1))
    }

    fn fire(&mut self, ctx: &mut Context<'_>) -> Result<(), ActionError> {
        ctx.fire_at(MonotonicTime::EPOCH)
    }
}

#[test]
fn de_same_timestamp_microsteps() {
    init_logging();
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut top = CompositeActor::new("top", DeDirector::new());
    top.add_actor(
        "requester",
        Requester {
            times: vec![secs(5), secs(5), secs(7)],
            log: log.clone(),
        },
    )
    .unwrap();

    assert_eq!(
        Manager::new(top, RunConfig::new()).run(),
        Ok(RunOutcome::Completed)
    );
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            SuperdenseTime::new(secs(5), 0),
            SuperdenseTime::new(secs(5), 1),
            SuperdenseTime::new(secs(7), 0),
        ]
    );
}

#[test]
fn de_simultaneous_tokens_are_read_at_successive_microsteps() {
    init_logging();
    let mut top = CompositeActor::new("top", DeDirector::new());
    let source = top
        .add_actor(
            "source",
            TimedSource::new([
                (secs(5), Token::Int(1)),
                (secs(7), Token::Int(3)),
                (secs(5), Token::Int(2)),
            ]),
        )
        .unwrap();
    let recorder = Recorder::new();
    let log = recorder.handle();
    let sink = top.add_actor("sink", recorder).unwrap();
    top.connect(source.port("out"), sink.port("in")).unwrap();

    assert_eq!(
        Manager::new(top, RunConfig::new()).run(),
        Ok(RunOutcome::Completed)
    );
    assert_eq!(
        log.entries(),
        vec![
            (SuperdenseTime::new(secs(5), 0), Token::Int(1)),
            (SuperdenseTime::new(secs(5), 1), Token::Int(2)),
            (SuperdenseTime::new(secs(7), 0), Token::Int(3)),
        ]
    );
}

fn diamond(log: &FiringLog) -> CompositeActor {
    let mut top = CompositeActor::new("top", DeDirector::new());
    let source = top
        .add_actor("source", PeriodicSource::new(Duration::from_secs(1)))
        .unwrap();
    let a = top.add_actor("a", Tracer::new("a", log)).unwrap();
    let b = top.add_actor("b", Tracer::new("b", log)).unwrap();
    let c = top.add_actor("c", Tracer::new("c", log)).unwrap();
    top.connect(source.port("out"), a.port("in")).unwrap();
    top.connect(source.port("out"), b.port("in")).unwrap();
    top.connect(a.port("out"), c.port("in")).unwrap();
    top.connect(b.port("out"), c.port("in")).unwrap();

    top
}

#[test]
fn de_firing_order_is_causal_and_deterministic() {
    init_logging();
    let run = || {
        let log = FiringLog::default();
        let config = RunConfig::new().with_stop_time(secs(2));
        assert_eq!(
            Manager::new(diamond(&log), config).run(),
            Ok(RunOutcome::Completed)
        );
        let entries = log.lock().unwrap().clone();

        entries
    };

    let first = run();
    let expected: Vec<(SuperdenseTime, String)> = (0..3)
        .flat_map(|s| {
            ["a", "b", "c"]
                .into_iter()
                .map(move |name| (SuperdenseTime::at(secs(s)), name.to_owned()))
        })
        .collect();
    assert_eq!(first, expected);
    assert!(first.windows(2).all(|w| w[0].0 <= w[1].0));

    assert_eq!(run(), first);
}

#[test]
fn de_request_in_the_past_fails() {
    init_logging();
    let mut top = CompositeActor::new("top", DeDirector::new());
    top.add_actor("past", PastRequester).unwrap();

    let result = Manager::new(top, RunConfig::new()).run();

    assert_eq!(
        result,
        Err(ExecutionError::Action(ActionError::InvalidTime {
            actor: "past".to_owned(),
            requested: MonotonicTime::EPOCH,
            current: SuperdenseTime::at(secs(1)),
        }))
    );
}

#[test]
fn de_time_delay() {
    init_logging();
    let mut top = CompositeActor::new("top", DeDirector::new());
    let source = top
        .add_actor("source", TimedSource::new([(secs(1), Token::Int(7))]))
        .unwrap();
    let delay = top
        .add_actor("delay", TimeDelay::new(Duration::from_secs(2)))
        .unwrap();
    let recorder = Recorder::new();
    let log = recorder.handle();
    let sink = top.add_actor("sink", recorder).unwrap();
    top.connect(source.port("out"), delay.port("in")).unwrap();
    top.connect(delay.port("out"), sink.port("in")).unwrap();

    assert_eq!(
        Manager::new(top, RunConfig::new()).run(),
        Ok(RunOutcome::Completed)
    );
    assert_eq!(
        log.entries(),
        vec![(SuperdenseTime::at(secs(3)), Token::Int(7))]
    );
}

#[test]
fn de_stop_time() {
    init_logging();
    let mut top = CompositeActor::new("top", DeDirector::new());
    let source = top
        .add_actor("source", PeriodicSource::new(Duration::from_secs(1)))
        .unwrap();
    let recorder = Recorder::new();
    let log = recorder.handle();
    let sink = top.add_actor("sink", recorder).unwrap();
    top.connect(source.port("out"), sink.port("in")).unwrap();

    let stop = secs(2) + Duration::from_millis(500);
    let mut manager = Manager::new(top, RunConfig::new().with_stop_time(stop));
    let handle = manager.handle();

    assert_eq!(manager.run(), Ok(RunOutcome::Completed));
    assert_eq!(
        log.tokens(),
        vec![Token::Int(0), Token::Int(1), Token::Int(2)]
    );
    assert_eq!(handle.time(), SuperdenseTime::at(stop));
}

#[test]
fn de_events_past_stop_time_are_not_processed() {
    init_logging();
    let mut top = CompositeActor::new("top", DeDirector::new());
    let source = top
        .add_actor("source", TimedSource::new([(secs(10), Token::Int(1))]))
        .unwrap();
    let recorder = Recorder::new();
    let log = recorder.handle();
    let sink = top.add_actor("sink", recorder).unwrap();
    top.connect(source.port("out"), sink.port("in")).unwrap();

    let mut manager = Manager::new(top, RunConfig::new().with_stop_time(secs(3)));
    let handle = manager.handle();

    assert_eq!(manager.run(), Ok(RunOutcome::Completed));
    assert!(log.entries().is_empty());
    assert_eq!(handle.time(), SuperdenseTime::at(secs(3)));
}

#[test]
fn de_empty_queue_runs_to_stop_time() {
    init_logging();
    let director = DeDirector::new().with_stop_when_queue_is_empty(false);
    let mut top = CompositeActor::new("top", director);
    let source = top
        .add_actor("source", TimedSource::new([(secs(1), Token::Int(1))]))
        .unwrap();
    let recorder = Recorder::new();
    let log = recorder.handle();
    let sink = top.add_actor("sink", recorder).unwrap();
    top.connect(source.port("out"), sink.port("in")).unwrap();

    let config = RunConfig::new()
        .with_stop_time(secs(3))
        .with_timeout(Duration::from_secs(5));
    let mut manager = Manager::new(top, config);
    let handle = manager.handle();

    assert_eq!(manager.run(), Ok(RunOutcome::Completed));
    assert_eq!(
        log.entries(),
        vec![(SuperdenseTime::at(secs(1)), Token::Int(1))]
    );
    assert_eq!(handle.time(), SuperdenseTime::at(secs(3)));
    assert_eq!(handle.iterations(), 1);
}

#[test]
fn de_zero_delay_loop_is_rejected() {
    init_logging();
    let mut top = CompositeActor::new("top", DeDirector::new());
    let a = top.add_actor("a", Scale::new(1.0)).unwrap();
    let b = top.add_actor("b", Scale::new(2.0)).unwrap();
    top.connect(a.port("out"), b.port("in")).unwrap();
    top.connect(b.port("out"), a.port("in")).unwrap();

    let result = Manager::new(top, RunConfig::new()).run();

    assert!(matches!(
        result,
        Err(ExecutionError::Scheduling(SchedulingError::CausalityLoop { .. }))
    ));
}

#[test]
fn de_loop_through_time_delay_is_accepted() {
    init_logging();
    let log = FiringLog::default();
    let mut top = CompositeActor::new("top", DeDirector::new());
    let tracer = top.add_actor("tracer", Tracer::new("tracer", &log)).unwrap();
    let delay = top
        .add_actor("delay", TimeDelay::new(Duration::from_secs(1)))
        .unwrap();
    top.connect(tracer.port("out"), delay.port("in")).unwrap();
    top.connect(delay.port("out"), tracer.port("in")).unwrap();

    assert!(top.validate().is_ok());
}

#[test]
fn de_keep_running_on_empty_queue() {
    init_logging();
    let build = |stop_when_empty: bool| {
        let director = DeDirector::new().with_stop_when_queue_is_empty(stop_when_empty);
        let mut top = CompositeActor::new("top", director);
        let source = top
            .add_actor("source", TimedSource::new([(secs(1), Token::Int(1))]))
            .unwrap();
        let sink = top.add_actor("sink", Recorder::new()).unwrap();
        top.connect(source.port("out"), sink.port("in")).unwrap();

        Manager::new(top, RunConfig::new().with_iteration_limit(5))
    };

    let mut manager = build(true);
    let handle = manager.handle();
    assert_eq!(manager.run(), Ok(RunOutcome::Completed));
    assert_eq!(handle.iterations(), 1);

    let mut manager = build(false);
    let handle = manager.handle();
    assert_eq!(manager.run(), Ok(RunOutcome::Completed));
    assert_eq!(handle.iterations(), 5);
}
