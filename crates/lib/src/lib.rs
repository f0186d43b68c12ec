//! Dochi core library — backend client, dispatch controller, provider and
//! session-directory state shared by the CLI front end.

pub mod backend;
pub mod config;
pub mod controller;
pub mod directory;
pub mod personas;
pub mod postprocess;
pub mod provider;
pub mod surface;
pub mod transcript;
pub mod uploads;
