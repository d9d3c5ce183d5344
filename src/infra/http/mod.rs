//! HTTP adapters for the remote API.

mod client;

pub use client::ApiClient;
