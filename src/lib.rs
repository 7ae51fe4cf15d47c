//! Stubresolv - A minimal stub DNS resolver for A and SRV records.
//!
//! This crate provides the resolver core (name codec, query builder,
//! response parser, lookup table) and the UDP transport driving it,
//! exposed as a library for the demo binary and for tests.

pub mod config;
pub mod dns;
pub mod error;
pub mod helpers;
pub mod logging;
