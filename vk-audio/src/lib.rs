//! Client for VK audio, scraped from the web and mobile sites.
//!
//! VK has no public audio API. This crate drives the same ajax endpoints
//! (`al_audio.php`) and mobile pages the browser uses, extracts audio
//! references from their positional payloads, and resolves those into
//! playable [`Track`]s.
//!
//! # Authentication
//!
//! Requests ride on a logged-in browser session: the `remixsid` cookie and
//! the account's numeric id. They are persisted to
//! `~/.config/vk-audio/session.json`.
//!
//! ```no_run
//! use vk_audio::auth::Session;
//! use vk_audio::VkAudioClient;
//!
//! Session::new(1234567, "YOUR_REMIXSID").save().unwrap();
//!
//! let client = VkAudioClient::new().unwrap();
//! for track in client.search("Metallica", 20, 0) {
//!     let track = track.unwrap();
//!     println!("{} - {}", track.artist, track.title);
//! }
//! ```
//!
//! # Pagination
//!
//! Listings are lazy iterators of `Result<Track>`. Each endpoint has its own
//! continuation scheme (offsets for the mobile library, `nextOffset` /
//! `nextFrom` cursors for catalog sections); see [`pager`](crate::pager).
//! Track resolution is throttled to one `reload_audios` call per
//! [`RELOAD_DELAY`](client::RELOAD_DELAY).

pub mod audio;
pub mod auth;
pub mod client;
pub mod error;
pub mod pager;
mod ratelimit;
pub mod scrape;
pub mod types;
pub mod url_decoder;

pub use client::{ClientOptions, VkAudioClient};
pub use error::{Result, VkAudioError};
pub use pager::{Albums, Tracks};
pub use types::{Album, AudioRef, Track};
