//! Envelopes and SSE frames
//!
//! An `Envelope` is what a publisher hands to a topic: the payload already
//! rendered as an SSE frame plus the allow/deny `Targets` that decide which
//! subscribers receive it. Rendering happens once per envelope so every
//! recipient shares the same frame (and therefore the same `id:` line).
//!
//! Frame layout:
//!
//! ```text
//! id:<uuid>\n\ndata: <json>\n\n
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

/// One encoded message as written to a streaming client.
///
/// Cloning is cheap; all subscribers of an envelope share one allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Arc<str>);

impl Frame {
    fn render(envelope_id: &str, json: &str) -> Self {
        Self(Arc::from(format!("id:{envelope_id}\n\ndata: {json}\n\n")))
    }

    /// The full frame text, ready to write to the client.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The frame as bytes, for writers.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The `id:` value carried by this frame.
    pub fn envelope_id(&self) -> Option<&str> {
        self.0
            .strip_prefix("id:")
            .and_then(|rest| rest.split_once("\n\n"))
            .map(|(id, _)| id)
    }

    /// The JSON body carried after `data: `.
    pub fn data(&self) -> Option<&str> {
        self.0
            .split_once("\n\ndata: ")
            .and_then(|(_, rest)| rest.strip_suffix("\n\n"))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// Lower-cases an identity, returning `None` for the empty string.
pub(crate) fn normalize_identity(identity: &str) -> Option<String> {
    if identity.is_empty() {
        None
    } else {
        Some(identity.to_lowercase())
    }
}

/// Allow/deny identity sets attached to one publish.
///
/// - empty `allow` and `deny`: broadcast to every subscriber
/// - non-empty `allow`: only subscribers whose identity is listed
/// - `deny`: listed identities never receive, even if also allowed
///
/// Identities are lower-cased and empty strings are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Targets {
    allow: HashSet<String>,
    deny: HashSet<String>,
}

impl Targets {
    /// Targets that admit every subscriber.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds identities to the allow set.
    pub fn allow<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.add_allow(ids);
        self
    }

    /// Adds identities to the deny set.
    pub fn deny<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.add_deny(ids);
        self
    }

    pub(crate) fn add_allow<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        extend_normalized(&mut self.allow, ids);
    }

    pub(crate) fn add_deny<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        extend_normalized(&mut self.deny, ids);
    }

    /// Normalized identities in the allow set.
    pub fn allowed(&self) -> &HashSet<String> {
        &self.allow
    }

    /// Normalized identities in the deny set.
    pub fn denied(&self) -> &HashSet<String> {
        &self.deny
    }

    /// True when neither set restricts delivery.
    pub fn is_broadcast(&self) -> bool {
        self.allow.is_empty() && self.deny.is_empty()
    }

    /// Decides whether a subscriber with `identity` receives the envelope.
    pub fn admits(&self, identity: Option<&str>) -> bool {
        if identity.is_some_and(|id| self.deny.contains(id)) {
            return false;
        }

        if self.allow.is_empty() {
            return true;
        }

        identity.is_some_and(|id| self.allow.contains(id))
    }
}

fn extend_normalized<I, S>(set: &mut HashSet<String>, ids: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    set.extend(ids.into_iter().filter_map(|id| normalize_identity(id.as_ref())));
}

/// A published message on its way through a topic's dispatch loop.
#[derive(Debug, Clone)]
pub struct Envelope {
    id: String,
    frame: Option<Frame>,
    targets: Targets,
}

impl Envelope {
    /// Serializes `payload` and renders the frame under a fresh envelope id.
    pub fn new<T>(payload: &T, targets: Targets) -> Result<Self, serde_json::Error>
    where
        T: Serialize + ?Sized,
    {
        let json = serde_json::to_string(payload)?;
        let id = Uuid::new_v4().to_string();
        let frame = Frame::render(&id, &json);

        Ok(Self {
            id,
            frame: Some(frame),
            targets,
        })
    }

    /// An envelope whose payload could not be encoded. It is delivered to
    /// nobody.
    pub fn empty() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            frame: None,
            targets: Targets::default(),
        }
    }

    /// The id written on the frame's `id:` line.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The rendered frame, `None` for an empty envelope.
    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    /// Which subscribers receive this envelope.
    pub fn targets(&self) -> &Targets {
        &self.targets
    }

    /// True when serialization failed and there is nothing to deliver.
    pub fn is_empty(&self) -> bool {
        self.frame.is_none()
    }
}
