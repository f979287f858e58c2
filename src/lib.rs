//! A DNS conformance and DNSSEC key policy test oracle.
//!
//! This crate provides the building blocks for checking that a name server
//! under test behaves the way DNSSEC key management rules say it must. It
//! does two things:
//!
//! * it predicts, from a declarative description of a zone's signing keys,
//!   whether the zone must resolve or must fail validation, and verifies a
//!   live server agrees with that prediction, and
//! * it feeds the server deliberately truncated wire messages and verifies
//!   the server stays responsive afterwards.
//!
//! The crate does not implement a name server, a full DNS message parser,
//! or any cryptography. It only predicts and checks the *outcomes* of
//! validation performed by the server under test.
//!
//! # Modules
//!
//! * [keyset] contains the immutable key model: roles, temporal states,
//!   algorithm numbers, and per-zone key sets.
//! * [policy] maps a key set to the expected validation verdict.
//! * [wire] holds the minimal wire plumbing the crate needs: a query
//!   encoder and a response header decoder.
//! * [client] is a datagram query client with explicit timeout and retry
//!   budgets.
//! * [probe] sends undersized messages at the server's framing boundary
//!   and checks the server is still alive afterwards.
//! * [archive] extracts pre-generated key material from an archive while
//!   refusing entries that would escape the destination directory.
//! * [scenario] reads declarative zone and key tables.
//! * [harness] wires predictions and live queries together and aggregates
//!   the per-zone results.

pub mod archive;
pub mod client;
pub mod harness;
pub mod keyset;
pub mod logging;
pub mod policy;
pub mod probe;
pub mod scenario;
pub mod wire;
