//! # ssehub
//!
//! `ssehub` is an in-process publish/subscribe broker for Server-Sent Events.
//! Producers publish to named topics; every topic runs one dispatch loop that
//! renders each message once as an SSE frame and hands it to the subscribers
//! currently joined, optionally narrowed by allow/deny lists of subscriber
//! identities. Nothing is stored: a message reaches whoever is listening when
//! it is dispatched.
//!
//! ## Core Modules
//!
//! - `broker`: topics, subscribers, targeting, the topic registry and the
//!   listener index.
//! - `config`: loads broker settings from files and environment variables.
//! - `utils`: the shared error type and logging initialization.
//!
//! ## Example
//!
//! ```no_run
//! use ssehub::broker::TopicRegistry;
//! use tokio::sync::watch;
//!
//! # async fn demo() -> ssehub::utils::Result<()> {
//! let registry = TopicRegistry::default();
//! let topic = registry.get_or_create("news");
//!
//! let (_disconnect, cancel) = watch::channel(false);
//! let mut subscriber = topic.join(cancel)?;
//! subscriber.set_identity("alice");
//!
//! topic.publisher().allow(["alice"]).publish(&"hello").await?;
//! let frame = subscriber.next_frame().await;
//! assert!(frame.is_some());
//!
//! registry.close_all();
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod config;
pub mod utils;
