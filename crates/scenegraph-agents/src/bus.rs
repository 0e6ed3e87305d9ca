use crossbeam_channel::{unbounded, Receiver, Sender};
use dashmap::DashMap;
use scenegraph_core::{AgentMessage, NodeId};

/// In-process message bus: one FIFO inbox per receiver. Within a
/// sender-receiver pair, delivery order is send order; across pairs the
/// order is whatever the deterministic sender iteration produced.
#[derive(Default)]
pub struct MessageBus {
    queues: DashMap<NodeId, (Sender<AgentMessage>, Receiver<AgentMessage>)>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&self, msg: AgentMessage) {
        let entry = self
            .queues
            .entry(msg.receiver.clone())
            .or_insert_with(unbounded);
        // Unbounded channel: send cannot fail while we hold the receiver.
        let _ = entry.0.send(msg);
    }

    /// Return and clear the receiver's queue.
    pub fn drain(&self, id: &str) -> Vec<AgentMessage> {
        match self.queues.get(id) {
            Some(entry) => entry.1.try_iter().collect(),
            None => Vec::new(),
        }
    }

    pub fn pending(&self, id: &str) -> usize {
        self.queues.get(id).map_or(0, |entry| entry.1.len())
    }

    /// Drop the inbox of a receiver that no longer exists.
    pub fn remove_queue(&self, id: &str) {
        self.queues.remove(id);
    }
}
