//! # idpstore idp
//!
//! Event-sourced identity provider configurations.
//!
//! Ten provider kinds are modelled, each with its own events, write model
//! and desired configuration. Commands go through [`Commands`]:
//!
//! ```rust,ignore
//! let commands = Commands::new(log, Arc::new(alg), CommandsConfig::default());
//! let ctx = CommandContext::new("editor-1");
//! let owner = Owner::org("instance-1", "org-1");
//!
//! let (id, _) = commands.add_idp(&ctx, &owner, &IdpConfig::GitHub(config)).await?;
//! let provider = commands.provider(&ctx, "instance-1", &id, "https://login/callback").await?;
//! ```
//!
//! Secrets are encrypted before they enter an event and only decrypted
//! when a provider is materialized.

pub mod all;
pub mod changes;
pub mod commands;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod options;
pub mod provider;
pub mod remove;
pub mod setup;
pub mod type_model;
pub mod variants;

pub use all::{AllIdpWriteModel, IdpConfig};
pub use commands::{CommandContext, Commands, MigrationTarget, ObjectDetails};
pub use config::CommandsConfig;
pub use domain::{IdpState, IdpType, Owner, OwnerScope};
pub use error::{Error, ErrorCode, ValidationError};
pub use provider::Provider;
