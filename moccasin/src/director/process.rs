use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_utils::thread;
use tracing::{debug, warn};

use crate::actor::{ActorSlot, Context, Frame};
use crate::composite::{ActorId, Graph, PortLoc};
use crate::director::{setup_error, Continuation};
use crate::error::{ActionError, ConfigurationError, ExecutionError};
use crate::receiver::{ChannelEnds, ProcessMonitor, Receiver};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Discipline {
    Rendezvous,
    Bounded { initial: usize, maximum: usize },
}

/// Process-network director.
///
/// Every contained actor runs on its own thread and loops over
/// prefire/fire/postfire until it declines to fire, returns `false` from
/// postfire, or finds that a peer it communicates with has ended. Reads and
/// writes block: channels are either rendezvous points or bounded queues.
///
/// The director detects when all live processes are blocked. With bounded
/// queues, such a deadlock is resolved if possible by growing the smallest
/// full queue a writer is waiting on, up to a maximum capacity. A deadlock
/// that cannot be resolved ends the run with [`ActionError::Deadlock`].
///
/// A single iteration runs the network to completion, after which the
/// director requests termination.
#[derive(Debug)]
pub struct ProcessDirector {
    discipline: Discipline,
    monitor: Option<Arc<ProcessMonitor>>,
}

impl ProcessDirector {
    /// Creates a director whose channels are rendezvous points.
    pub fn rendezvous() -> Self {
        Self {
            discipline: Discipline::Rendezvous,
            monitor: None,
        }
    }

    /// Creates a director whose channels are bounded queues.
    ///
    /// Queues start with capacity `initial` and may grow up to `maximum` to
    /// resolve artificial deadlocks.
    pub fn bounded_queues(initial: usize, maximum: usize) -> Self {
        Self {
            discipline: Discipline::Bounded { initial, maximum },
            monitor: None,
        }
    }

    /// Returns the maximum queue capacity, or `None` for rendezvous
    /// channels.
    pub fn max_capacity(&self) -> Option<usize> {
        match self.discipline {
            Discipline::Rendezvous => None,
            Discipline::Bounded { maximum, .. } => Some(maximum),
        }
    }

    pub(super) fn validate(&mut self, graph: &Graph) -> Result<(), ExecutionError> {
        if let Discipline::Bounded { initial, maximum } = self.discipline {
            if initial == 0 {
                return Err(ConfigurationError::InvalidParameter {
                    name: "initial_capacity",
                    reason: "queues need a non-zero capacity".to_owned(),
                }
                .into());
            }
            if initial > maximum {
                return Err(ConfigurationError::InvalidParameter {
                    name: "maximum_capacity",
                    reason: format!("{maximum} is smaller than the initial capacity {initial}"),
                }
                .into());
            }
        }

        let crosses_boundary = graph
            .edges()?
            .iter()
            .any(|e| {
                matches!(e.source, PortLoc::Boundary(_)) || matches!(e.sink, PortLoc::Boundary(_))
            });
        if crosses_boundary {
            return Err(ConfigurationError::UnsupportedBoundary {
                composite: graph.name.clone(),
                director: "PN",
            }
            .into());
        }

        Ok(())
    }

    pub(super) fn preinitialize(
        &mut self,
        graph: &mut Graph,
        frame: &mut Frame,
        _outer: &mut Context<'_>,
    ) -> Result<(), ActionError> {
        let maximum = match self.discipline {
            Discipline::Rendezvous => 0,
            Discipline::Bounded { maximum, .. } => maximum,
        };
        let monitor = ProcessMonitor::new(maximum);
        let process: HashMap<ActorId, usize> =
            graph.order.iter().enumerate().map(|(i, &id)| (id, i)).collect();

        let discipline = self.discipline;
        graph
            .create_receivers(|link| {
                let ends = ChannelEnds {
                    producer: link.edge.source.actor().and_then(|id| process.get(&id).copied()),
                    consumer: link.edge.sink.actor().and_then(|id| process.get(&id).copied()),
                    producer_name: link.producer_name.to_owned(),
                    consumer_name: link.consumer_name.to_owned(),
                    name: link.address.to_string(),
                };
                let address = Some(link.address.clone());

                match discipline {
                    Discipline::Rendezvous => Arc::new(monitor.rendezvous(ends, address)),
                    Discipline::Bounded { initial, .. } => {
                        Arc::new(monitor.blocking_fifo(ends, initial, address))
                    }
                }
            })
            .map_err(|e| setup_error(graph, e))?;
        self.monitor = Some(monitor);

        graph.preinitialize_all(frame)
    }

    pub(super) fn initialize(
        &mut self,
        graph: &mut Graph,
        frame: &mut Frame,
        outer: &mut Context<'_>,
    ) -> Result<(), ActionError> {
        frame.tag = outer.tag();
        if let Some(monitor) = &self.monitor {
            monitor.clear();
        }
        for slot in graph.slots_in_order() {
            slot.initialize(frame)?;
            // Process networks are untimed.
            frame.refires.clear();
        }

        Ok(())
    }

    pub(super) fn prefire(
        &mut self,
        _graph: &mut Graph,
        _frame: &mut Frame,
        _outer: &mut Context<'_>,
    ) -> Result<bool, ActionError> {
        Ok(true)
    }

    pub(super) fn fire(
        &mut self,
        graph: &mut Graph,
        frame: &mut Frame,
        _outer: &mut Context<'_>,
    ) -> Result<(), ActionError> {
        let monitor = self
            .monitor
            .clone()
            .ok_or_else(|| setup_error(graph, "the process network was not preinitialized"))?;
        let composite = graph.name.clone();
        let slots = graph.slots_in_order();
        debug!(composite = %composite, processes = slots.len(), "starting process network");

        monitor.start(slots.len());
        let _interrupt = frame.control.register_interrupt(monitor.clone());
        if frame.control.is_stop_requested() {
            monitor.abort();
        }

        let results = thread::scope(|scope| {
            let mut handles = Vec::new();
            let mut failures = Vec::new();
            for (index, slot) in slots.into_iter().enumerate() {
                let name = slot.name.clone();
                let monitor = &monitor;
                let mut process_frame = frame.fork();
                let spawned = scope
                    .builder()
                    .name(format!("moccasin-{name}"))
                    .spawn(move |_| run_process(index, slot, &mut process_frame, monitor));

                match spawned {
                    Ok(handle) => handles.push((name, handle)),
                    Err(e) => {
                        monitor.abort();
                        monitor.process_finished(index);
                        failures.push(Err(ActionError::Failed {
                            actor: name,
                            message: format!("could not spawn the process thread: {e}"),
                        }));
                    }
                }
            }

            let mut results: Vec<Result<(), ActionError>> = handles
                .into_iter()
                .map(|(name, handle)| {
                    handle.join().unwrap_or_else(|payload| {
                        let message = panic_message(&*payload);
                        warn!(actor = %name, %message, "process panicked");

                        Err(ActionError::Panicked {
                            actor: name,
                            message,
                        })
                    })
                })
                .collect();
            results.append(&mut failures);

            results
        })
        .map_err(|payload| ActionError::Panicked {
            actor: composite.clone(),
            message: panic_message(&*payload),
        })?;

        for result in results {
            result?;
        }
        debug!(composite = %composite, "process network ended");

        monitor.take_outcome()
    }

    pub(super) fn postfire(
        &mut self,
        _graph: &mut Graph,
        _frame: &mut Frame,
        _outer: &mut Context<'_>,
    ) -> Result<Continuation, ActionError> {
        Ok(Continuation::Terminate)
    }
}

/// Marks a process as finished when its thread exits, including by unwinding.
struct ProcessExit<'a> {
    monitor: &'a ProcessMonitor,
    process: usize,
}

impl Drop for ProcessExit<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.monitor.abort();
        }
        self.monitor.process_finished(self.process);
    }
}

/// Body of the thread of a process.
fn run_process(
    process: usize,
    slot: &mut ActorSlot,
    frame: &mut Frame,
    monitor: &ProcessMonitor,
) -> Result<(), ActionError> {
    let _exit = ProcessExit { monitor, process };

    let mut iterate = || -> Result<(), ActionError> {
        slot.emit_initial_tokens()?;
        while !frame.control.is_stop_requested() {
            if slot.iterate(frame)? != Some(true) {
                break;
            }
            frame.refires.clear();
        }

        Ok(())
    };

    match iterate() {
        Err(e) if e.is_termination() => Ok(()),
        Err(e) => {
            monitor.abort();
            Err(e)
        }
        Ok(()) => Ok(()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
