//! Smoke tests for the chimed binary.

mod common;
mod daemon_tests;
