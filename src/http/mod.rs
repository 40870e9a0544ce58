//! HTTP client module for jsprobe

pub mod client;
pub use client::HttpClient;
