//! # idpstore eventstore
//!
//! Append-only event log and write-model framework.
//!
//! ## Overview
//!
//! Every state change of an aggregate is stored as an immutable event in a
//! strictly ordered, per-aggregate stream. Commands rebuild the state they
//! need by replaying those streams into write models:
//!
//! 1. Declare which events a write model reads (via `EventSet` and `query`)
//! 2. Load them from an [`EventLog`](log::EventLog) with `filter`
//! 3. Fold them into state (via `apply` and `reduce`)
//! 4. Push new events conditioned on the last processed sequence
//!
//! ## Example
//!
//! ```rust,ignore
//! use idpstore_eventstore::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Debug, Event, Serialize, Deserialize)]
//! #[event_type("user.renamed")]
//! struct UserRenamed {
//!     name: String,
//! }
//!
//! #[derive(EventSet)]
//! enum UserEvents {
//!     Renamed(UserRenamed),
//! }
//!
//! struct UserWriteModel {
//!     base: WriteModel,
//!     name: String,
//! }
//!
//! impl Reducer for UserWriteModel {
//!     type Events = UserEvents;
//!     type LegacyEvents = NoEvents;
//!
//!     fn write_model(&self) -> &WriteModel { &self.base }
//!     fn write_model_mut(&mut self) -> &mut WriteModel { &mut self.base }
//!
//!     fn query(&self) -> SearchQuery {
//!         SearchQuery::with_items([QueryItem::new()
//!             .aggregate_ids([self.base.aggregate_id.clone()])
//!             .event_types(Self::Events::EVENT_TYPES.iter().copied())])
//!     }
//!
//!     fn apply(&mut self, event: UserEvents) {
//!         match event {
//!             UserEvents::Renamed(ev) => self.name = ev.name,
//!         }
//!     }
//! }
//!
//! let mut model = UserWriteModel { base: WriteModel::new("user-1", "org-1", "instance-1"), name: String::new() };
//! load(&log, &mut model).await?;
//!
//! let push = Push::new("editor")
//!     .expect(&aggregate, model.base.processed_sequence)
//!     .event(&aggregate, UserRenamed { name: "bob".to_string() })?;
//! log.push(push).await?;
//! ```

// Lets the derive macros resolve `::idpstore_eventstore` inside this crate's own tests.
extern crate self as idpstore_eventstore;

pub use idpstore_macros::{Event, EventSet};

pub mod cancel;
pub mod error;
pub mod event;
pub mod log;
pub mod memory;
pub mod push;
pub mod query;
pub mod write_model;

pub mod prelude {
    pub use crate::cancel::*;
    pub use crate::error::*;
    pub use crate::event::*;
    pub use crate::log::*;
    pub use crate::memory::*;
    pub use crate::push::*;
    pub use crate::query::*;
    pub use crate::write_model::*;
    pub use idpstore_macros::{Event, EventSet};
}

#[doc(hidden)]
pub mod __private {
    pub use serde_json;
}
