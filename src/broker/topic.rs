//! Topic management
//!
//! A `Topic` owns the subscribers joined under one id and a single dispatch
//! loop that consumes envelopes in arrival order and hands each frame to the
//! subscribers its targets admit.
//!
//! Concurrency notes:
//! - Subscribers live in a `DashMap` keyed by connection id. Join, exit and
//!   identity changes mutate it from caller tasks while the dispatch loop
//!   reads it; the loop copies out the senders it needs before awaiting so no
//!   shard lock is held across a handoff.
//! - Handoff is sequential and blocking per subscriber: a slow consumer holds
//!   up everyone after it, and the next envelope. An optional delivery timeout
//!   drops the frame for that subscriber only.
//! - Closing marks the topic, drops the inbound sender, signals the loop to
//!   stop and removes every subscriber slot, which closes their channels once
//!   the loop lets go of its copies.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::broker::envelope::{Envelope, Frame, Targets};
use crate::broker::listener_index::ListenerIndex;
use crate::broker::publisher::Publisher;
use crate::broker::subscriber::Subscriber;
use crate::config::BrokerSettings;
use crate::utils::{BrokerError, Result};

pub type ConnectionId = String;

#[derive(Debug)]
struct SubscriberSlot {
    sender: mpsc::Sender<Frame>,
    identity: Option<String>,
}

#[derive(Debug)]
pub struct Topic {
    id: String,
    settings: BrokerSettings,
    inbound: Mutex<Option<mpsc::Sender<Envelope>>>,
    subscribers: Arc<DashMap<ConnectionId, SubscriberSlot>>,
    listeners: Arc<ListenerIndex>,
    shutdown: watch::Sender<bool>,
    closed: AtomicBool,
}

impl Topic {
    /// Creates the topic and starts its dispatch loop.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub(crate) fn spawn(
        id: String,
        settings: BrokerSettings,
        listeners: Arc<ListenerIndex>,
        active_loops: Arc<AtomicUsize>,
    ) -> Arc<Self> {
        let (inbound_tx, inbound_rx) = mpsc::channel(settings.inbound_channel_capacity());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let subscribers = Arc::new(DashMap::new());

        let dispatch = DispatchLoop {
            topic_id: id.clone(),
            inbound: inbound_rx,
            subscribers: Arc::clone(&subscribers),
            shutdown: shutdown_rx,
            delivery_timeout: settings.delivery_timeout(),
            _active: ActiveLoop::enter(active_loops),
        };
        tokio::spawn(dispatch.run());

        Arc::new(Self {
            id,
            settings,
            inbound: Mutex::new(Some(inbound_tx)),
            subscribers,
            listeners,
            shutdown: shutdown_tx,
            closed: AtomicBool::new(false),
        })
    }

    /// The lower-cased topic id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// True once the topic has been closed; it never reopens.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of subscribers currently joined.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Whether `connection_id` is still joined to this topic.
    pub fn has_subscriber(&self, connection_id: &str) -> bool {
        self.subscribers.contains_key(connection_id)
    }

    /// Joins a new subscriber.
    ///
    /// `cancel` is driven by the transport: flipping it to `true` (or dropping
    /// its sender) tells the subscriber's consumer loop to exit.
    pub fn join(self: &Arc<Self>, cancel: watch::Receiver<bool>) -> Result<Subscriber> {
        if self.is_closed() {
            return Err(BrokerError::topic_closed(&self.id));
        }

        let connection_id = Uuid::new_v4().to_string();
        let (sender, receiver) = mpsc::channel(self.settings.subscriber_channel_capacity());
        self.subscribers.insert(
            connection_id.clone(),
            SubscriberSlot {
                sender,
                identity: None,
            },
        );

        // a close may have cleared the map between the check and the insert
        if self.is_closed() {
            self.subscribers.remove(&connection_id);
            return Err(BrokerError::topic_closed(&self.id));
        }

        debug!(topic = %self.id, connection_id = %connection_id, "subscriber joined");
        Ok(Subscriber::new(
            Arc::downgrade(self),
            self.id.clone(),
            connection_id,
            receiver,
            cancel,
        ))
    }

    /// Broadcasts `payload` to every subscriber.
    pub async fn publish<T>(&self, payload: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.publish_to(payload, Targets::default()).await
    }

    /// Publishes `payload` to the subscribers admitted by `targets`.
    ///
    /// Returns once the envelope is queued, not once it is delivered.
    pub async fn publish_to<T>(&self, payload: &T, targets: Targets) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let sender = self
            .inbound_sender()
            .ok_or_else(|| BrokerError::topic_closed(&self.id))?;

        let envelope = match Envelope::new(payload, targets) {
            Ok(envelope) => envelope,
            Err(err) if self.settings.strict_serialization => return Err(err.into()),
            Err(err) => {
                warn!(topic = %self.id, error = %err, "payload serialization failed, envelope will be dropped");
                Envelope::empty()
            }
        };

        let envelope_id = envelope.id().to_string();
        sender
            .send(envelope)
            .await
            .map_err(|_| BrokerError::topic_closed(&self.id))?;

        trace!(topic = %self.id, envelope_id = %envelope_id, "envelope queued");
        Ok(())
    }

    /// A targeting publisher bound to this topic.
    pub fn publisher(self: &Arc<Self>) -> Publisher {
        Publisher::new(Arc::clone(self))
    }

    fn inbound_sender(&self) -> Option<mpsc::Sender<Envelope>> {
        if self.is_closed() {
            return None;
        }
        self.inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Attaches `identity` to a joined subscriber, moving any previous
    /// pairing in the listener index. Returns false if the slot is gone.
    pub(crate) fn assign_identity(&self, connection_id: &str, identity: &str) -> bool {
        let Some(mut slot) = self.subscribers.get_mut(connection_id) else {
            return false;
        };

        if let Some(previous) = slot.identity.replace(identity.to_string()) {
            self.listeners.remove(&previous, connection_id);
        }
        self.listeners.add(identity, connection_id);
        true
    }

    /// Removes a subscriber slot and its listener index pairing.
    pub(crate) fn leave(&self, connection_id: &str) {
        if let Some((connection_id, slot)) = self.subscribers.remove(connection_id) {
            if let Some(identity) = slot.identity {
                self.listeners.remove(&identity, &connection_id);
            }
            debug!(topic = %self.id, connection_id = %connection_id, "subscriber left");
        }
    }

    /// Closes the topic. Subsequent calls do nothing.
    pub(crate) fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.shutdown.send_replace(true);

        let mut dropped = 0usize;
        self.subscribers.retain(|connection_id, slot| {
            if let Some(identity) = &slot.identity {
                self.listeners.remove(identity, connection_id);
            }
            dropped += 1;
            false
        });

        info!(topic = %self.id, subscribers = dropped, "topic closed");
    }
}

/// Resolves once `signal` reads `true` or its sender is gone.
pub(crate) async fn signalled(signal: &mut watch::Receiver<bool>) {
    let _ = signal.wait_for(|raised| *raised).await;
}

/// Keeps the registry's live loop count accurate however the loop ends.
#[derive(Debug)]
struct ActiveLoop(Arc<AtomicUsize>);

impl ActiveLoop {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveLoop {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

enum Handoff {
    Delivered,
    Gone,
    TimedOut,
}

struct DispatchLoop {
    topic_id: String,
    inbound: mpsc::Receiver<Envelope>,
    subscribers: Arc<DashMap<ConnectionId, SubscriberSlot>>,
    shutdown: watch::Receiver<bool>,
    delivery_timeout: Option<Duration>,
    _active: ActiveLoop,
}

impl DispatchLoop {
    async fn run(mut self) {
        debug!(topic = %self.topic_id, "dispatch loop started");

        loop {
            let envelope = tokio::select! {
                biased;
                _ = signalled(&mut self.shutdown) => break,
                envelope = self.inbound.recv() => match envelope {
                    Some(envelope) => envelope,
                    None => break,
                },
            };

            if !self.dispatch(envelope).await {
                break;
            }
        }

        debug!(topic = %self.topic_id, "dispatch loop stopped");
    }

    /// Fans one envelope out. Returns false if shutdown interrupted it.
    async fn dispatch(&mut self, envelope: Envelope) -> bool {
        let Some(frame) = envelope.frame() else {
            debug!(topic = %self.topic_id, envelope_id = %envelope.id(), "dropping empty envelope");
            return true;
        };

        let recipients: Vec<(ConnectionId, mpsc::Sender<Frame>)> = self
            .subscribers
            .iter()
            .filter(|slot| envelope.targets().admits(slot.identity.as_deref()))
            .map(|slot| (slot.key().clone(), slot.sender.clone()))
            .collect();

        let limit = self.delivery_timeout;
        let mut delivered = 0usize;

        for (connection_id, sender) in recipients {
            let outcome = tokio::select! {
                biased;
                _ = signalled(&mut self.shutdown) => return false,
                outcome = hand_off(&sender, frame.clone(), limit) => outcome,
            };

            match outcome {
                Handoff::Delivered => delivered += 1,
                Handoff::Gone => {
                    trace!(topic = %self.topic_id, connection_id = %connection_id, "subscriber gone before delivery");
                }
                Handoff::TimedOut => {
                    warn!(
                        topic = %self.topic_id,
                        connection_id = %connection_id,
                        envelope_id = %envelope.id(),
                        "delivery timed out, frame dropped for subscriber"
                    );
                }
            }
        }

        trace!(topic = %self.topic_id, envelope_id = %envelope.id(), delivered, "envelope dispatched");
        true
    }
}

async fn hand_off(sender: &mpsc::Sender<Frame>, frame: Frame, limit: Option<Duration>) -> Handoff {
    match limit {
        None => match sender.send(frame).await {
            Ok(()) => Handoff::Delivered,
            Err(_) => Handoff::Gone,
        },
        Some(limit) => match time::timeout(limit, sender.send(frame)).await {
            Ok(Ok(())) => Handoff::Delivered,
            Ok(Err(_)) => Handoff::Gone,
            Err(_) => Handoff::TimedOut,
        },
    }
}
