use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::command::CommandReport;
use crate::orchestrator::RunState;
use crate::supervisor::OutputStream;

/// Events published while a tunnel run progresses.
#[derive(Debug, Clone)]
pub enum Event {
    /// The orchestrator entered a new state.
    StateChanged(RunState),
    /// A configuration command finished (successfully or not).
    CommandCompleted(CommandReport),
    /// A line printed by the tunnel process.
    TunnelOutput(OutputStream, String),
    /// The tunnel process terminated. `None` when it was killed by a signal.
    TunnelExited(Option<i32>),
}

impl Display for Event {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::StateChanged(state) => {
                write!(f, "StateChanged{{ state={} }}", state)
            }
            Event::CommandCompleted(report) => {
                write!(
                    f,
                    "CommandCompleted{{ cmd={} outcome={} }}",
                    report.spec, report.outcome
                )
            }
            Event::TunnelOutput(stream, line) => {
                write!(f, "TunnelOutput{{ stream={} size={} }}", stream, line.len())
            }
            Event::TunnelExited(code) => {
                write!(f, "TunnelExited{{ code={:?} }}", code)
            }
        }
    }
}

#[derive(Clone)]
pub struct Bus {
    counter: Arc<AtomicU32>,
    bus: Arc<tokio::sync::broadcast::Sender<(u32, Event)>>,
}

impl Bus {
    /// Creates a new event bus.
    pub fn new() -> Self {
        let (bus, _) = tokio::sync::broadcast::channel(1000);
        let bus = Arc::new(bus);
        let counter = Arc::new(AtomicU32::default());
        Self { bus, counter }
    }

    /// Creates a new endpoint on the event bus.
    pub fn new_endpoint(&self) -> BusEndpoint {
        let id = self.counter.fetch_add(1, Ordering::Relaxed);
        let tx = (*self.bus).clone();
        let rx = self.bus.subscribe();

        let tx = BusSender { id, tx };
        BusEndpoint { id, tx, rx }
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct BusEndpoint {
    id: u32,
    tx: BusSender,
    rx: tokio::sync::broadcast::Receiver<(u32, Event)>,
}

impl BusEndpoint {
    /// Sends the event on the bus. Note that the messages sent by this endpoint won't reach itself.
    pub fn send(&self, event: Event) {
        self.tx.send(event)
    }

    /// Returns the unique sequential ID of this endpoint.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Awaits the next `Event` on the bus to be read.
    pub async fn recv(&mut self) -> Event {
        loop {
            match self.rx.recv().await {
                Ok((id, event)) => {
                    if id == self.id {
                        // If the event was sent by this endpoint, it is skipped
                        continue;
                    } else {
                        return event;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        "Endpoint #{} lagged behind, {} events skipped",
                        self.id, skipped
                    );
                }
                Err(e) => {
                    error!(
                        "Failed to read event bus from endpoint #{}: {:?}",
                        self.id, e
                    );
                    return futures::future::pending().await;
                }
            }
        }
    }

    /// Returns the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.try_recv() {
                Ok((id, _)) if id == self.id => continue,
                Ok((_, event)) => return Some(event),
                Err(tokio::sync::broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Creates a new sender for this endpoint that can be cloned.
    pub fn sender(&self) -> BusSender {
        self.tx.clone()
    }
}

#[derive(Clone)]
pub struct BusSender {
    id: u32,
    tx: tokio::sync::broadcast::Sender<(u32, Event)>,
}

impl BusSender {
    /// Sends the event on the bus. Note that the messages sent by this endpoint won't reach itself.
    pub fn send(&self, event: Event) {
        trace!("#{} -> {}", self.id, event);
        if self.tx.send((self.id, event)).is_err() {
            // Only fails when nobody is subscribed.
            trace!("No subscriber for event from endpoint #{}", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::Terminal;

    #[tokio::test]
    async fn test_bus() {
        let bus = Bus::new();

        let mut endpoint_1 = bus.new_endpoint();
        let mut endpoint_2 = bus.new_endpoint();
        let mut endpoint_3 = bus.new_endpoint();

        assert_eq!(endpoint_1.id(), 0);
        assert_eq!(endpoint_2.id(), 1);
        assert_eq!(endpoint_3.id(), 2);

        endpoint_1.send(Event::TunnelExited(None));
        let recv_2 = endpoint_2.recv().await;
        let recv_3 = endpoint_3.recv().await;
        assert!(matches!(recv_2, Event::TunnelExited(None)));
        assert!(matches!(recv_3, Event::TunnelExited(None)));

        endpoint_2.send(Event::StateChanged(RunState::Running));
        let recv_1 = endpoint_1.recv().await;
        let recv_3 = endpoint_3.recv().await;
        assert!(matches!(recv_1, Event::StateChanged(RunState::Running)));
        assert!(matches!(recv_3, Event::StateChanged(RunState::Running)));
    }

    #[test]
    fn test_send_without_subscribers_is_harmless() {
        let bus = Bus::new();
        let sender = bus.new_endpoint().sender();
        sender.send(Event::StateChanged(RunState::Terminal(Terminal::Exited(Some(0)))));
    }

    #[tokio::test]
    async fn test_try_recv_skips_own_events() {
        let bus = Bus::new();
        let mut endpoint_1 = bus.new_endpoint();
        let endpoint_2 = bus.new_endpoint();

        endpoint_1.send(Event::StateChanged(RunState::Init));
        endpoint_2.send(Event::TunnelExited(Some(1)));
        assert!(matches!(endpoint_1.try_recv(), Some(Event::TunnelExited(Some(1)))));
        assert!(endpoint_1.try_recv().is_none());
    }
}
