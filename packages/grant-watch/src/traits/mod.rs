//! Collaborator seams.
//!
//! The core only talks to the network, storage and the optional summary
//! service through these traits, so each can be swapped for a mock.

pub mod fetcher;
pub mod store;
pub mod summarizer;
