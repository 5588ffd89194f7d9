//! Property-based tests

pub mod matcher_proptest;
