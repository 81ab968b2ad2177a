//! Subscriber handles
//!
//! A `Subscriber` is one joined connection. It owns the receiving half of its
//! outbound channel, an optional identity used for targeted publishes and the
//! cancellation signal handed in by the transport.
//!
//! `exit()` is guarded so it runs once; dropping the handle exits as well.
//! The handle only keeps a weak reference to its topic. After the topic
//! closes or is dropped, exiting only closes the local receiver.

use std::sync::Weak;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::broker::envelope::{normalize_identity, Frame};
use crate::broker::topic::{signalled, ConnectionId, Topic};
use crate::utils::Result;

/// How a [`Subscriber::listen`] loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenOutcome {
    /// The cancellation signal fired; the subscriber has exited.
    Cancelled,
    /// The broker closed the channel, usually because the topic was closed.
    Closed,
}

#[derive(Debug)]
pub struct Subscriber {
    topic: Weak<Topic>,
    topic_id: String,
    connection_id: ConnectionId,
    identity: Option<String>,
    receiver: mpsc::Receiver<Frame>,
    cancel: watch::Receiver<bool>,
    exited: bool,
}

impl Subscriber {
    pub(crate) fn new(
        topic: Weak<Topic>,
        topic_id: String,
        connection_id: ConnectionId,
        receiver: mpsc::Receiver<Frame>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            topic,
            topic_id,
            connection_id,
            identity: None,
            receiver,
            cancel,
            exited: false,
        }
    }

    /// The UUID assigned when this subscriber joined.
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Id of the topic this subscriber joined.
    pub fn topic_id(&self) -> &str {
        &self.topic_id
    }

    /// The identity set through [`Subscriber::set_identity`], if any.
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// True once `exit` has run, explicitly or on cancellation.
    pub fn is_exited(&self) -> bool {
        self.exited
    }

    /// True when the transport raised the cancellation signal or dropped it.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow() || self.cancel.has_changed().is_err()
    }

    /// Labels this subscriber for targeted publishes.
    ///
    /// The identity is lower-cased; an empty string is ignored. Setting a new
    /// identity replaces the old one in the listener index. Has no effect
    /// once the subscriber has exited or its topic has closed.
    pub fn set_identity(&mut self, identity: &str) {
        let Some(identity) = normalize_identity(identity) else {
            return;
        };
        if self.exited {
            return;
        }
        let Some(topic) = self.topic.upgrade() else {
            return;
        };

        if topic.assign_identity(&self.connection_id, &identity) {
            debug!(
                topic = %self.topic_id,
                connection_id = %self.connection_id,
                identity = %identity,
                "subscriber identity set"
            );
            self.identity = Some(identity);
        }
    }

    /// Waits for the next frame. `None` once the channel is closed and
    /// drained.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.receiver.recv().await
    }

    /// Waits for the next frame or cancellation, whichever comes first.
    ///
    /// On cancellation the subscriber exits and `None` is returned. `None`
    /// without exiting means the broker closed the channel.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        tokio::select! {
            biased;
            _ = signalled(&mut self.cancel) => {
                info!(topic = %self.topic_id, connection_id = %self.connection_id, "client disconnected");
                self.exit();
                None
            }
            frame = self.receiver.recv() => frame,
        }
    }

    /// Streams frames into `writer`, flushing after each one, until the
    /// subscriber is cancelled or the broker closes the channel.
    ///
    /// A write failure exits the subscriber and is returned.
    pub async fn listen<W>(&mut self, writer: &mut W) -> Result<ListenOutcome>
    where
        W: AsyncWrite + Unpin,
    {
        while let Some(frame) = self.next_frame().await {
            if let Err(err) = write_frame(writer, &frame).await {
                debug!(connection_id = %self.connection_id, error = %err, "listener write failed");
                self.exit();
                return Err(err.into());
            }
        }

        if self.exited {
            Ok(ListenOutcome::Cancelled)
        } else {
            info!(topic = %self.topic_id, connection_id = %self.connection_id, "client channel closed");
            Ok(ListenOutcome::Closed)
        }
    }

    /// Leaves the topic: drops the listener index pairing, removes the slot
    /// and closes the outbound channel. Later calls do nothing.
    pub fn exit(&mut self) {
        if self.exited {
            return;
        }
        self.exited = true;

        if let Some(topic) = self.topic.upgrade() {
            topic.leave(&self.connection_id);
        }
        self.receiver.close();
        self.identity = None;
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.exit();
    }
}

async fn write_frame<W>(writer: &mut W, frame: &Frame) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await
}
