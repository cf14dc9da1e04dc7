//! Cross-crate integration tests for Stomp

#[cfg(test)]
mod engine_integration;

#[cfg(test)]
mod config_integration;
