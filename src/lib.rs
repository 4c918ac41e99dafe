//! nextvuln: sequential multi-agent crews.
//!
//! Agents backed by an OpenAI-compatible model work through tasks one after
//! another, each receiving the outputs of the tasks before it. Tools come
//! from providers (MCP servers over stdio, or a local code interpreter) that
//! live exactly as long as one run.

pub mod agent;
pub mod config;
pub mod crew;
pub mod error;
pub mod logging;
pub mod provider;
pub mod tooling;
pub mod tools;
