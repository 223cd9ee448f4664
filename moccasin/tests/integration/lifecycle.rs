//! Actor lifecycle and run control.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use moccasin::actor::ActorState;
use moccasin::composite::{ActorId, CompositeActor};
use moccasin::director::{DeDirector, SdfDirector};
use moccasin::error::{ActionError, ExecutionError};
use moccasin::library::{PeriodicSource, Ramp};
use moccasin::manager::{Manager, ManagerState, RunConfig, RunOutcome};

use crate::support::{Counters, Phase, Probe};

/// Builds `ramp -> probe` under a dataflow director.
fn ramp_into(probe: Probe) -> (CompositeActor, ActorId) {
    let mut top = CompositeActor::new("top", SdfDirector::new());
    let ramp = top.add_actor("ramp", Ramp::new(0)).unwrap();
    let probe = top.add_actor("probe", probe).unwrap();
    top.connect(ramp.port("out"), probe.port("in")).unwrap();

    (top, probe)
}

fn assert_calls(
    counters: &Counters,
    preinitialize: usize,
    initialize: usize,
    fire: usize,
    wrapup: usize,
) {
    assert_eq!(Counters::get(&counters.preinitialize), preinitialize, "preinitialize");
    assert_eq!(Counters::get(&counters.initialize), initialize, "initialize");
    assert_eq!(Counters::get(&counters.fire), fire, "fire");
    assert_eq!(Counters::get(&counters.wrapup), wrapup, "wrapup");
}

#[test]
fn lifecycle_normal_run() {
    let (probe, counters) = Probe::new();
    let (top, probe) = ramp_into(probe);

    let mut manager = Manager::new(top, RunConfig::new().with_iteration_limit(3));
    let handle = manager.handle();
    assert_eq!(handle.state(), ManagerState::Idle);

    assert_eq!(manager.run(), Ok(RunOutcome::Completed));
    assert_calls(&counters, 1, 1, 3, 1);
    assert_eq!(handle.iterations(), 3);
    assert_eq!(handle.state(), ManagerState::Finished);
    assert_eq!(manager.top().actor_state(probe), Some(ActorState::WrappedUp));
}

#[test]
fn lifecycle_wrapup_after_fire_error() {
    let (probe, counters) = Probe::failing(Phase::Fire, 2);
    let (top, _) = ramp_into(probe);

    let result = Manager::new(top, RunConfig::new().with_iteration_limit(5)).run();

    assert_eq!(
        result,
        Err(ExecutionError::Action(ActionError::Failed {
            actor: "probe".to_owned(),
            message: "Fire failure".to_owned(),
        }))
    );
    assert_calls(&counters, 1, 1, 2, 1);
}

#[test]
fn lifecycle_wrapup_after_initialize_error() {
    let (probe, counters) = Probe::failing(Phase::Initialize, 1);
    let (top, _) = ramp_into(probe);

    let result = Manager::new(top, RunConfig::new().with_iteration_limit(5)).run();

    assert!(matches!(
        result,
        Err(ExecutionError::Action(ActionError::Failed { .. }))
    ));
    assert_calls(&counters, 1, 1, 0, 1);
}

#[test]
fn lifecycle_wrapup_error_is_reported_after_success() {
    let (probe, counters) = Probe::failing(Phase::Wrapup, 1);
    let (top, _) = ramp_into(probe);

    let result = Manager::new(top, RunConfig::new().with_iteration_limit(2)).run();

    assert_eq!(
        result,
        Err(ExecutionError::Action(ActionError::Failed {
            actor: "probe".to_owned(),
            message: "Wrapup failure".to_owned(),
        }))
    );
    assert_calls(&counters, 1, 1, 2, 1);
}

#[test]
fn lifecycle_first_error_wins_over_wrapup_error() {
    let (failing_fire, fire_counters) = Probe::failing(Phase::Fire, 1);
    let (failing_wrapup, wrapup_counters) = Probe::failing(Phase::Wrapup, 1);

    let mut top = CompositeActor::new("top", SdfDirector::new());
    let ramp = top.add_actor("ramp", Ramp::new(0)).unwrap();
    let first = top.add_actor("first", failing_fire).unwrap();
    let second = top.add_actor("second", failing_wrapup).unwrap();
    top.connect(ramp.port("out"), first.port("in")).unwrap();
    top.connect(first.port("out"), second.port("in")).unwrap();

    let result = Manager::new(top, RunConfig::new().with_iteration_limit(2)).run();

    assert_eq!(
        result,
        Err(ExecutionError::Action(ActionError::Failed {
            actor: "first".to_owned(),
            message: "Fire failure".to_owned(),
        }))
    );
    assert_eq!(Counters::get(&fire_counters.wrapup), 1);
    assert_eq!(Counters::get(&wrapup_counters.wrapup), 1);
}

#[test]
fn lifecycle_actor_terminates_run() {
    let mut top = CompositeActor::new("top", SdfDirector::new());
    top.add_actor("ramp", Ramp::new(0).with_limit(2)).unwrap();

    let mut manager = Manager::new(top, RunConfig::new().with_iteration_limit(10));
    let handle = manager.handle();

    assert_eq!(manager.run(), Ok(RunOutcome::Terminated));
    assert_eq!(handle.iterations(), 2);
}

#[test]
fn lifecycle_rerun_reinitializes() {
    let (probe, counters) = Probe::new();
    let (top, _) = ramp_into(probe);

    let mut manager = Manager::new(top, RunConfig::new().with_iteration_limit(2));
    assert_eq!(manager.run(), Ok(RunOutcome::Completed));
    assert_eq!(manager.run(), Ok(RunOutcome::Completed));

    assert_calls(&counters, 2, 2, 4, 2);
}

#[test]
fn lifecycle_pause_and_resume() {
    let (probe, counters) = Probe::new();
    let (top, _) = ramp_into(probe);

    let mut manager = Manager::new(top, RunConfig::new().with_iteration_limit(5));
    let handle = manager.handle();
    handle.pause();

    let observer = {
        let counters = Arc::clone(&counters);
        let handle = handle.clone();

        thread::spawn(move || {
            while handle.state() != ManagerState::Paused {
                thread::sleep(Duration::from_millis(1));
            }
            let fired_while_paused = Counters::get(&counters.fire);
            let iterations_while_paused = handle.iterations();
            handle.resume();

            (fired_while_paused, iterations_while_paused)
        })
    };

    assert_eq!(manager.run(), Ok(RunOutcome::Completed));
    assert_eq!(observer.join().unwrap(), (0, 0));
    assert_eq!(handle.iterations(), 5);
    assert_eq!(Counters::get(&counters.fire), 5);
}

#[test]
fn lifecycle_timeout_stops_endless_run() {
    let mut top = CompositeActor::new("top", DeDirector::new());
    top.add_actor("source", PeriodicSource::new(Duration::from_millis(1)))
        .unwrap();

    let config = RunConfig::new().with_timeout(Duration::from_millis(50));
    let mut manager = Manager::new(top, config);
    let handle = manager.handle();

    assert_eq!(manager.run(), Ok(RunOutcome::Terminated));
    assert!(handle.iterations() > 0);
}
