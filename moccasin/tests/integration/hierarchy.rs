//! Composites governed by a director different from their container's.

use std::time::Duration;

use moccasin::actor::PortSpec;
use moccasin::composite::CompositeActor;
use moccasin::director::{ContinuousDirector, DeDirector, SdfDirector};
use moccasin::library::{
    Const, Integrator, PeriodicSource, Ramp, Recorder, Scale, TimeDelay, TimedSource,
};
use moccasin::manager::{Manager, RunConfig, RunOutcome};
use moccasin::time::{MonotonicTime, SuperdenseTime};
use moccasin::token::{Token, TokenType};

fn secs(s: u64) -> MonotonicTime {
    MonotonicTime::EPOCH + Duration::from_secs(s)
}

#[test]
fn hierarchy_dataflow_inside_discrete_events() {
    let mut inner = CompositeActor::new("doubler", SdfDirector::new());
    inner
        .add_port(PortSpec::input("in", TokenType::Double))
        .unwrap();
    inner
        .add_port(PortSpec::output("out", TokenType::Double))
        .unwrap();
    let scale = inner.add_actor("scale", Scale::new(2.0)).unwrap();
    inner
        .connect(CompositeActor::boundary("in"), scale.port("in"))
        .unwrap();
    inner
        .connect(scale.port("out"), CompositeActor::boundary("out"))
        .unwrap();

    let mut top = CompositeActor::new("top", DeDirector::new());
    let source = top
        .add_actor("source", PeriodicSource::new(Duration::from_secs(1)))
        .unwrap();
    let doubler = top.add_actor("doubler", inner).unwrap();
    let recorder = Recorder::new();
    let log = recorder.handle();
    let sink = top.add_actor("sink", recorder).unwrap();
    top.connect(source.port("out"), doubler.port("in")).unwrap();
    top.connect(doubler.port("out"), sink.port("in")).unwrap();

    let config = RunConfig::new().with_stop_time(secs(2));
    assert_eq!(Manager::new(top, config).run(), Ok(RunOutcome::Completed));

    assert_eq!(
        log.entries(),
        vec![
            (SuperdenseTime::at(secs(0)), Token::Double(0.0)),
            (SuperdenseTime::at(secs(1)), Token::Double(2.0)),
            (SuperdenseTime::at(secs(2)), Token::Double(4.0)),
        ]
    );
}

#[test]
fn hierarchy_periodic_dataflow_inside_discrete_events() {
    let mut inner = CompositeActor::new(
        "clocked",
        SdfDirector::new().with_period(Duration::from_secs(1)),
    );
    inner
        .add_port(PortSpec::output("out", TokenType::Int))
        .unwrap();
    let ramp = inner.add_actor("ramp", Ramp::new(0)).unwrap();
    inner
        .connect(ramp.port("out"), CompositeActor::boundary("out"))
        .unwrap();

    let mut top = CompositeActor::new("top", DeDirector::new());
    let clocked = top.add_actor("clocked", inner).unwrap();
    let recorder = Recorder::new();
    let log = recorder.handle();
    let sink = top.add_actor("sink", recorder).unwrap();
    top.connect(clocked.port("out"), sink.port("in")).unwrap();

    let config = RunConfig::new().with_stop_time(secs(2));
    assert_eq!(Manager::new(top, config).run(), Ok(RunOutcome::Completed));

    assert_eq!(
        log.entries(),
        vec![
            (SuperdenseTime::at(secs(0)), Token::Int(0)),
            (SuperdenseTime::at(secs(1)), Token::Int(1)),
            (SuperdenseTime::at(secs(2)), Token::Int(2)),
        ]
    );
}

#[test]
fn hierarchy_discrete_events_inside_discrete_events() {
    let mut inner = CompositeActor::new("delayed", DeDirector::new());
    inner
        .add_port(PortSpec::input("in", TokenType::General))
        .unwrap();
    inner
        .add_port(PortSpec::output("out", TokenType::General))
        .unwrap();
    let delay = inner
        .add_actor("delay", TimeDelay::new(Duration::from_secs(2)))
        .unwrap();
    inner
        .connect(CompositeActor::boundary("in"), delay.port("in"))
        .unwrap();
    inner
        .connect(delay.port("out"), CompositeActor::boundary("out"))
        .unwrap();

    let mut top = CompositeActor::new("top", DeDirector::new());
    let source = top
        .add_actor("source", TimedSource::new([(secs(1), Token::Int(7))]))
        .unwrap();
    let delayed = top.add_actor("delayed", inner).unwrap();
    let recorder = Recorder::new();
    let log = recorder.handle();
    let sink = top.add_actor("sink", recorder).unwrap();
    top.connect(source.port("out"), delayed.port("in")).unwrap();
    top.connect(delayed.port("out"), sink.port("in")).unwrap();

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
fn hierarchy_continuous_integration() {
    let step = Duration::from_millis(100);
    let mut top = CompositeActor::new("top", ContinuousDirector::new(step));
    let slope = top.add_actor("slope", Const::new(1.0)).unwrap();
    let integrator = top.add_actor("integrator", Integrator::new(0.0)).unwrap();
    let recorder = Recorder::new();
    let log = recorder.handle();
    let sink = top.add_actor("sink", recorder).unwrap();
    top.connect(slope.port("out"), integrator.port("derivative"))
        .unwrap();
    top.connect(integrator.port("state"), sink.port("in"))
        .unwrap();

    let config = RunConfig::new().with_stop_time(secs(1));
    assert_eq!(Manager::new(top, config).run(), Ok(RunOutcome::Completed));

    let entries = log.entries();
    assert_eq!(entries.len(), 11);
    for (i, (tag, token)) in entries.iter().enumerate() {
        assert_eq!(*tag, SuperdenseTime::at(MonotonicTime::EPOCH + step * i as u32));
        let value = token.as_double().unwrap();
        assert!((value - 0.1 * i as f64).abs() < 1e-9, "sample {i}: {value}");
    }
}
