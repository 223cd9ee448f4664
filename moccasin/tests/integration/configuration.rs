//! Graph construction and validation errors.

use moccasin::actor::{Actor, Context, PortDirection, PortSpec};
use moccasin::composite::CompositeActor;
use moccasin::director::{DeDirector, ProcessDirector, SdfDirector};
use moccasin::error::{ActionError, ConfigurationError, ExecutionError};
use moccasin::library::{Const, Ramp, Recorder, Scale};
use moccasin::manager::{Manager, RunConfig};
use moccasin::token::TokenType;

/// Declares an integer output but sends a double.
struct Liar;

impl Actor for Liar {
    fn ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::output("out", TokenType::Int)]
    }

    fn fire(&mut self, ctx: &mut Context<'_>) -> Result<(), ActionError> {
        ctx.send("out", 0.5)
    }
}

#[test]
fn config_type_mismatch() {
    let mut top = CompositeActor::new("top", SdfDirector::new());
    let text = top.add_actor("text", Const::new("text")).unwrap();
    let scale = top.add_actor("scale", Scale::new(2.0)).unwrap();

    let result = top.connect(text.port("out"), scale.port("in"));

    assert_eq!(
        result,
        Err(ConfigurationError::TypeMismatch {
            source: "text.out".to_owned(),
            source_type: TokenType::String,
            sink: "scale.in".to_owned(),
            sink_type: TokenType::Double,
        })
    );
    assert!(top.connections().is_empty());
}

#[test]
fn config_int_widens_to_double() {
    let mut top = CompositeActor::new("top", SdfDirector::new());
    let ramp = top.add_actor("ramp", Ramp::new(0)).unwrap();
    let scale = top.add_actor("scale", Scale::new(2.0)).unwrap();

    assert!(top.connect(ramp.port("out"), scale.port("in")).is_ok());
}

#[test]
fn config_name_collision() {
    let mut top = CompositeActor::new("top", SdfDirector::new());
    top.add_actor("a", Ramp::new(0)).unwrap();

    assert_eq!(
        top.add_actor("a", Recorder::new()).err(),
        Some(ConfigurationError::NameCollision {
            container: "top".to_owned(),
            name: "a".to_owned(),
        })
    );
    assert_eq!(top.actors().count(), 1);
}

#[test]
fn config_duplicate_boundary_port() {
    let mut inner = CompositeActor::new("inner", SdfDirector::new());
    inner.add_port(PortSpec::input("in", TokenType::Int)).unwrap();

    assert_eq!(
        inner.add_port(PortSpec::output("in", TokenType::Int)),
        Err(ConfigurationError::NameCollision {
            container: "inner".to_owned(),
            name: "in".to_owned(),
        })
    );
}

#[test]
fn config_direction_mismatch() {
    let mut top = CompositeActor::new("top", SdfDirector::new());
    let ramp = top.add_actor("ramp", Ramp::new(0)).unwrap();
    let sink = top.add_actor("sink", Recorder::new()).unwrap();

    assert_eq!(
        top.connect(sink.port("in"), ramp.port("out")),
        Err(ConfigurationError::DirectionMismatch {
            port: "sink.in".to_owned(),
            expected: PortDirection::Output,
        })
    );
}

#[test]
fn config_multiple_sources() {
    let mut top = CompositeActor::new("top", SdfDirector::new());
    let a = top.add_actor("a", Ramp::new(0)).unwrap();
    let b = top.add_actor("b", Ramp::new(10)).unwrap();
    let scale = top.add_actor("scale", Scale::new(2.0)).unwrap();
    top.connect(a.port("out"), scale.port("in")).unwrap();

    assert_eq!(
        top.connect(b.port("out"), scale.port("in")),
        Err(ConfigurationError::MultipleSources {
            port: "scale.in".to_owned(),
        })
    );

    // A multiport accepts any number of sources.
    let sink = top.add_actor("sink", Recorder::new()).unwrap();
    top.connect(a.port("out"), sink.port("in")).unwrap();
    top.connect(b.port("out"), sink.port("in")).unwrap();
}

#[test]
fn config_unknown_port() {
    let mut top = CompositeActor::new("top", SdfDirector::new());
    let ramp = top.add_actor("ramp", Ramp::new(0)).unwrap();
    let sink = top.add_actor("sink", Recorder::new()).unwrap();

    assert_eq!(
        top.connect(ramp.port("nope"), sink.port("in")),
        Err(ConfigurationError::UnknownPort {
            actor: "ramp".to_owned(),
            port: "nope".to_owned(),
        })
    );
}

#[test]
fn config_removed_actor_is_unknown() {
    let mut top = CompositeActor::new("top", SdfDirector::new());
    let ramp = top.add_actor("ramp", Ramp::new(0)).unwrap();
    let sink = top.add_actor("sink", Recorder::new()).unwrap();
    top.connect(ramp.port("out"), sink.port("in")).unwrap();

    top.remove_actor(ramp).unwrap();

    assert!(top.connections().is_empty());
    assert_eq!(top.actor_id("ramp"), None);
    assert_eq!(
        top.connect(ramp.port("out"), sink.port("in")),
        Err(ConfigurationError::UnknownActor {
            container: "top".to_owned(),
        })
    );
}

#[test]
fn config_disconnect_frees_single_input() {
    let mut top = CompositeActor::new("top", SdfDirector::new());
    let a = top.add_actor("a", Ramp::new(0)).unwrap();
    let b = top.add_actor("b", Ramp::new(10)).unwrap();
    let scale = top.add_actor("scale", Scale::new(2.0)).unwrap();
    let connection = top.connect(a.port("out"), scale.port("in")).unwrap();
    let version = top.version();

    let removed = top.disconnect(connection).unwrap();
    assert_eq!(removed.source(), &a.port("out"));
    assert_eq!(removed.sink(), &scale.port("in"));
    assert!(top.version() > version);
    assert_eq!(top.disconnect(connection), None);

    assert!(top.connect(b.port("out"), scale.port("in")).is_ok());
}

#[test]
fn config_dangling_input_under_dataflow() {
    let mut top = CompositeActor::new("top", SdfDirector::new());
    top.add_actor("scale", Scale::new(2.0)).unwrap();

    assert_eq!(
        Manager::new(top, RunConfig::new()).run(),
        Err(ExecutionError::Configuration(
            ConfigurationError::DanglingPort {
                port: "scale.in".to_owned(),
            }
        ))
    );
}

#[test]
fn config_process_network_rejects_boundary() {
    let mut inner = CompositeActor::new("inner", ProcessDirector::rendezvous());
    inner.add_port(PortSpec::input("in", TokenType::Int)).unwrap();
    let sink = inner.add_actor("sink", Recorder::new()).unwrap();
    inner
        .connect(CompositeActor::boundary("in"), sink.port("in"))
        .unwrap();

    let mut top = CompositeActor::new("top", DeDirector::new());
    let ramp = top.add_actor("ramp", Ramp::new(0)).unwrap();
    let inner = top.add_actor("inner", inner).unwrap();
    top.connect(ramp.port("out"), inner.port("in")).unwrap();

    assert_eq!(
        top.validate(),
        Err(ExecutionError::Configuration(
            ConfigurationError::UnsupportedBoundary {
                composite: "inner".to_owned(),
                director: "PN",
            }
        ))
    );
}

#[test]
fn config_queue_capacities() {
    for (director, name) in [
        (ProcessDirector::bounded_queues(0, 4), "initial_capacity"),
        (ProcessDirector::bounded_queues(4, 2), "maximum_capacity"),
    ] {
        let mut top = CompositeActor::new("top", director);
        let ramp = top.add_actor("ramp", Ramp::new(0)).unwrap();
        let sink = top.add_actor("sink", Recorder::new()).unwrap();
        top.connect(ramp.port("out"), sink.port("in")).unwrap();

        match top.validate() {
            Err(ExecutionError::Configuration(ConfigurationError::InvalidParameter {
                name: found,
                ..
            })) => assert_eq!(found, name),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}

#[test]
fn config_runtime_type_check() {
    let mut top = CompositeActor::new("top", SdfDirector::new());
    let liar = top.add_actor("liar", Liar).unwrap();
    let sink = top.add_actor("sink", Recorder::new()).unwrap();
    top.connect(liar.port("out"), sink.port("in")).unwrap();

    let result = Manager::new(top, RunConfig::new().with_iteration_limit(1)).run();

    assert_eq!(
        result,
        Err(ExecutionError::Action(ActionError::TypeMismatch {
            actor: "liar".to_owned(),
            port: "out".to_owned(),
            expected: TokenType::Int,
            found: TokenType::Double,
        }))
    );
}

#[test]
fn config_error_messages() {
    let error = ConfigurationError::MultipleSources {
        port: "scale.in".to_owned(),
    };

    assert_eq!(
        error.to_string(),
        "the single input port 'scale.in' is already connected"
    );
}
