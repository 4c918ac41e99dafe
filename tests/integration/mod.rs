//! Integration tests for nextvuln crews

mod cli_contracts;
mod crew_files;
mod pipeline;
mod support;
