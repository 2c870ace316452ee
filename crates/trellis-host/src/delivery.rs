//! Per-instance outbound delivery queue with snapshot coalescing.
//!
//! Every plugin instance gets one queue carrying host→sandbox messages.
//! The queue is unbounded in principle, but a pending `DataEvent` for a
//! topic is overwritten in place by a newer snapshot for the same topic:
//! a slow plugin that misses intermediate updates receives only the latest
//! snapshot per topic once it drains, never a growing backlog. Control
//! messages are never coalesced. Sequence numbers are assigned at dequeue,
//! so delivered frames stay monotonic and contiguous even when payloads
//! were replaced while queued.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;
use tracing::debug;

use trellis_protocol::{Envelope, Message, ProtocolError, SeqCounter};

#[derive(Debug)]
pub struct DeliveryQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    seq: SeqCounter,
}

#[derive(Debug, Default)]
struct QueueState {
    entries: VecDeque<Message>,
    closed: bool,
}

impl Default for DeliveryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DeliveryQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            seq: SeqCounter::new(),
        }
    }

    /// Enqueue a message for delivery. Returns `false` if the queue is
    /// closed and the message was dropped.
    ///
    /// A `DataEvent` whose topic already has a pending `DataEvent` replaces
    /// that entry's payload in place, keeping its queue position.
    pub fn enqueue(&self, message: Message) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            debug!(kind = message.kind(), "delivery queue closed, message dropped");
            return false;
        }

        match message {
            Message::DataEvent { topic, payload } => {
                for entry in state.entries.iter_mut() {
                    if let Message::DataEvent {
                        topic: pending_topic,
                        payload: pending_payload,
                    } = entry
                    {
                        if *pending_topic == topic {
                            // Latest value wins; queue position is kept
                            *pending_payload = payload;
                            drop(state);
                            self.notify.notify_one();
                            return true;
                        }
                    }
                }
                state.entries.push_back(Message::DataEvent { topic, payload });
            }
            control => state.entries.push_back(control),
        }
        drop(state);
        self.notify.notify_one();
        true
    }

    /// Wait for the next message. Returns `None` once the queue is closed
    /// and will deliver nothing further.
    pub async fn recv(&self) -> Option<Message> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().unwrap();
                if let Some(message) = state.entries.pop_front() {
                    return Some(message);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Next outbound sequence number; called by the drain task when a
    /// dequeued message is encoded into a frame.
    pub fn next_seq(&self) -> u64 {
        self.seq.next()
    }

    /// Encode a dequeued message into its wire frame, assigning the seq.
    pub fn encode(&self, message: Message) -> Result<Vec<u8>, ProtocolError> {
        Envelope::new(self.next_seq(), message).encode()
    }

    /// Close the queue: pending undelivered messages are discarded and
    /// every later `enqueue` becomes a no-op.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        state.entries.clear();
        drop(state);
        self.notify.notify_waiters();
        // A receiver parked before close may hold a stored permit instead
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().unwrap().entries.is_empty()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
