//! Invariant tests module
//!
//! Guarantees that hold across arbitrary operation sequences:
//! - Entry point and paymaster accounting
//! - Token conservation
//! - All-or-nothing operations
