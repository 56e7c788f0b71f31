//! # Queue Producer Core
//!
//! Publishes a set of messages to a queue in as few size-bounded batches as
//! possible.
//!
//! This library provides:
//! - [`publish_all`], the greedy first-fit batch packer
//! - [`MessagePublisher`], the long-lived owner of a queue client and sender
//! - [`ReservationMessageFactory`], the fixed message set sent per trigger
//! - [`PublishError`] and [`PublishReport`], describing how much was delivered
//!
//! ## Module Organization
//!
//! - [`error`] - Publish outcome and error types
//! - [`publisher`] - Batch packing and publisher lifecycle
//! - [`reservation`] - Reservation message construction

pub mod error;
pub mod publisher;
pub mod reservation;

pub use error::{DeliveryState, PublishError, PublishReport};
pub use publisher::{publish_all, MessagePublisher};
pub use reservation::{ReservationCreated, ReservationMessageFactory};
