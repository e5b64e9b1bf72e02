//! subtone is a headless player for Navidrome and other Subsonic-compatible
//! music servers.
//!
//! The crate is organized around a single [`player::Player`] that owns the
//! audio [`engine::Engine`] and the play [`queue::Queue`], with the server
//! split across two clients: [`gateway`] for the Navidrome native API
//! (login, persisted play queue) and [`subsonic`] for the Subsonic REST
//! surface (streaming, cover art, scrobbles).

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod gateway;
pub mod http;
pub mod player;
pub mod queue;
pub mod session;
pub mod settings;
pub mod subsonic;
pub mod track;
