//! Relay core: moves content between private chats and per-user topics in
//! the staff group.
//!
//! The engine is platform-neutral. Adapters translate platform updates into
//! [`InboundEvent`]s and implement [`Platform`] for the outbound side.

pub mod ack;
pub mod album;
pub mod engine;
pub mod error;
pub mod event;
pub mod notice;
pub mod platform;
pub mod provision;
pub mod report;
pub mod throttle;

#[cfg(test)]
pub(crate) mod testing;

pub use {
    album::{AlbumSettings, BurstAggregator, Offer},
    engine::{RelayEngine, RelaySettings},
    error::{Error, Result},
    event::{InboundEvent, InboundMessage, Profile, RelayOutcome, StaffCommand},
    notice::{Notice, NoticeCatalog},
    platform::{Platform, PlatformError, PlatformResult},
    provision::{ProvisionError, ThreadProvisioner},
    report::AdminReporter,
    throttle::{DEFAULT_BUCKET, DebounceGate},
};
