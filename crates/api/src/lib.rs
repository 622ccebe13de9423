//! HTTP API: router, request/response mapping and service wiring.

pub mod app;
