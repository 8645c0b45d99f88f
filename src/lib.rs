//! Priority mailbox dispatch over a bounded worker pool.
//!
//! Dispatchers post prioritized [`Message`](message::Message)s to a shared
//! [`PriorityMailbox`](mailbox::PriorityMailbox). Each dispatcher runs one
//! receive loop that takes the most urgent message and hands it to a shared
//! fixed-size [`Pool`](pool::Pool) for processing.
//!
//! # Examples
//! ```rust
//! use std::sync::Arc;
//!
//! use mailpool::{
//!     dispatcher::Dispatcher, error::BoxError, event::DispatcherId, mailbox::PriorityMailbox,
//!     message::Message, pool::Builder,
//! };
//!
//! let mailbox = Arc::new(PriorityMailbox::new());
//! let pool = Arc::new(Builder::new().num_threads(3).build()?);
//!
//! let dispatchers: Vec<_> = (0..3)
//!     .map(|i| {
//!         Dispatcher::new(
//!             format!("thread {i}"),
//!             Arc::clone(&mailbox),
//!             Arc::clone(&pool),
//!             |_: &DispatcherId, _: &Message| -> Result<(), BoxError> { Ok(()) },
//!         )
//!     })
//!     .collect();
//!
//! for i in 0..10 {
//!     dispatchers[i % 3].send(format!("Message {i}"), (i % 3) as i64)?;
//! }
//!
//! dispatchers.iter().for_each(Dispatcher::stop);
//! dispatchers.iter().for_each(Dispatcher::join);
//! pool.shutdown(true);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cancel;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod logging;
pub mod mailbox;
pub mod message;
pub mod pool;
pub mod state;
pub mod task;
pub(crate) mod thread;
