//! # itemdb Core
//!
//! An embeddable record store: a typed collection of items persisted to a
//! single JSON file.
//!
//! This crate provides:
//! - The [`Item`] capability contract item types implement
//! - [`ItemStore`], the engine behind add / update / delete / lookup / listing
//! - A uniqueness index for fields items declare unique
//! - Atomic whole-file persistence
//! - Hot reload of a staging file with diff notifications
//!
//! ## Example
//!
//! ```rust,ignore
//! use itemdb_core::{Config, ItemStore, UuidGenerator};
//!
//! let users: ItemStore<User> = ItemStore::open_with_reload(
//!     "data/users.json",
//!     "data/load/users.json",
//!     "user",
//!     UuidGenerator,
//!     Config::default(),
//! )?;
//!
//! let id = users.add(User::new("alice"))?;
//! users.upd(&id, User::new("alice.b"))?;
//! users.del(&id)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod id;
pub mod index;
mod item;
pub mod persist;
mod store;
mod watch;

pub use config::Config;
pub use error::{StoreError, StoreResult};
pub use id::{IdGenerator, SequenceGenerator, UuidGenerator};
pub use index::UniqueIndex;
pub use item::{key_map, Item, ItemError, KeyMap};
pub use persist::Dataset;
pub use store::{ItemStore, Record, ReloadSummary};
