//! Media-session controller for a status-bar "now playing" widget.
//!
//! [`session::SessionManager`] discovers MPRIS players on the session bus and
//! keeps the best one connected; [`controller::NowPlayingController`] polls it
//! once per tick and resolves cover art through [`artwork::ArtworkResolver`]
//! whenever the art reference changes.

pub mod artwork;
pub mod artwork_worker;
pub mod bus;
pub mod config;
pub mod controller;
pub mod dbus;
pub mod output;
pub mod session;

pub use artwork::{ArtReference, ArtworkError, ArtworkFetcher, ArtworkOptions, ArtworkResolver};
pub use bus::{BusError, BusValue, MediaBus};
pub use config::Config;
pub use controller::{ArtworkCacheEntry, DisplaySnapshot, NowPlayingController};
pub use session::{PlaybackSnapshot, PlaybackStatus, PlayerHandle, SessionManager, TrackMetadata};
