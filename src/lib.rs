//! jsprobe - JavaScript API call-site extractor
//!
//! Fetches JavaScript from pages, script URLs or local files, finds the
//! places where the code talks to a backend (fetch, axios, jQuery, XHR,
//! WebSocket, GraphQL clients), normalizes their parameter blocks to JSON and
//! writes text, JSON and HTML reports.

pub mod acquire;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod models;
pub mod report;
pub mod scan;
