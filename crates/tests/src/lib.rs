//! Cross-crate integration tests for Resonant

#[cfg(test)]
mod streaming_integration;
