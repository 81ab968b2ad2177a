//! Targeting publisher
//!
//! Collects allow/deny identities for a topic and publishes with them. The
//! sets are cleared once a `publish` succeeds, so nothing carries over
//! between messages. A failed publish keeps them for the retry.

use std::sync::Arc;

use serde::Serialize;

use crate::broker::envelope::Targets;
use crate::broker::topic::Topic;
use crate::utils::Result;

#[derive(Debug)]
pub struct Publisher {
    topic: Arc<Topic>,
    targets: Targets,
}

impl Publisher {
    pub(crate) fn new(topic: Arc<Topic>) -> Self {
        Self {
            topic,
            targets: Targets::default(),
        }
    }

    /// Restricts the next publish to these identities.
    pub fn allow<I, S>(&mut self, ids: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.targets.add_allow(ids);
        self
    }

    /// Excludes these identities from the next publish.
    pub fn deny<I, S>(&mut self, ids: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.targets.add_deny(ids);
        self
    }

    /// Targets the next publish will use.
    pub fn targets(&self) -> &Targets {
        &self.targets
    }

    /// The topic this publisher sends to.
    pub fn topic(&self) -> &Arc<Topic> {
        &self.topic
    }

    /// Publishes `payload` with the accumulated targets, then clears them.
    ///
    /// On error the targets are left in place, so retrying never widens the
    /// audience of the message.
    pub async fn publish<T>(&mut self, payload: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.topic.publish_to(payload, self.targets.clone()).await?;
        self.targets = Targets::default();
        Ok(())
    }
}
