//! slidepane: knits, renders and serves reveal.js slide decks for a host pane.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
