//! Application services: knitting, rendering, help documents and the RPC collaborators.

pub mod accounts;
pub mod build;
pub mod context;
pub mod error;
pub mod help;
pub mod knit;
pub mod presentation;
pub mod render;
