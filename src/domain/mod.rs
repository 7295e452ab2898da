//! Core presentation types independent of HTTP and process plumbing.

pub mod slides;
