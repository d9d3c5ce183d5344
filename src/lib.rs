//! Optimistic list cache for a bookmarks, notes and prompts client.
//!
//! Mutations rewrite every cached list they can affect before the server
//! answers, roll back from a snapshot when the write fails, and mark the
//! affected lists stale once it succeeds.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
