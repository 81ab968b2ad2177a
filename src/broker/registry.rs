//! Topic registry
//!
//! Maps topic ids to live topics. Ids are lower-cased, so `News` and `news`
//! name the same topic. The registry is an ordinary value: construct one,
//! share it (for example behind an `Arc`), and call `close_all` on shutdown.
//! Dropping the registry closes whatever topics are still open.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::broker::listener_index::ListenerIndex;
use crate::broker::topic::Topic;
use crate::config::BrokerSettings;

#[derive(Debug)]
pub struct TopicRegistry {
    topics: DashMap<String, Arc<Topic>>,
    listeners: Arc<ListenerIndex>,
    settings: BrokerSettings,
    active_loops: Arc<AtomicUsize>,
}

impl Default for TopicRegistry {
    fn default() -> Self {
        Self::new(BrokerSettings::default())
    }
}

impl TopicRegistry {
    /// Creates an empty registry whose topics use `settings`.
    pub fn new(settings: BrokerSettings) -> Self {
        Self {
            topics: DashMap::new(),
            listeners: Arc::new(ListenerIndex::new()),
            settings,
            active_loops: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Settings applied to every topic this registry creates.
    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    /// Returns the topic for `id`, creating it and starting its dispatch loop
    /// on first use. Concurrent callers always get the same instance.
    ///
    /// # Panics
    ///
    /// Panics when a topic has to be created outside a Tokio runtime.
    pub fn get_or_create(&self, id: &str) -> Arc<Topic> {
        let key = id.to_lowercase();
        let entry = self.topics.entry(key.clone()).or_insert_with(|| {
            info!(topic = %key, "topic created");
            Topic::spawn(
                key.clone(),
                self.settings.clone(),
                Arc::clone(&self.listeners),
                Arc::clone(&self.active_loops),
            )
        });
        Arc::clone(entry.value())
    }

    /// Looks a topic up without creating it.
    pub fn get(&self, id: &str) -> Option<Arc<Topic>> {
        self.topics
            .get(&id.to_lowercase())
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Closes and forgets the topic for `id`. Returns false if there was none.
    pub fn close(&self, id: &str) -> bool {
        match self.topics.remove(&id.to_lowercase()) {
            Some((_, topic)) => {
                topic.close();
                true
            }
            None => false,
        }
    }

    /// Closes every topic currently registered.
    pub fn close_all(&self) {
        let ids = self.topic_ids();
        let closed = ids.iter().filter(|id| self.close(id)).count();
        info!(topics = closed, "all topics closed");
    }

    /// Ids of the topics currently registered, in no particular order.
    pub fn topic_ids(&self) -> Vec<String> {
        self.topics.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of open topics.
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    /// True when no topic is registered.
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// The identity index shared by all topics of this registry.
    pub fn listeners(&self) -> &ListenerIndex {
        &self.listeners
    }

    /// Dispatch loops still running, including loops of closed topics that
    /// have not wound down yet.
    pub fn active_dispatch_loops(&self) -> usize {
        self.active_loops.load(Ordering::SeqCst)
    }
}

impl Drop for TopicRegistry {
    fn drop(&mut self) {
        if !self.topics.is_empty() {
            self.close_all();
        }
    }
}
