//! Source parsing and contract extraction for flowcheck.

pub mod broker;
pub mod cache;
pub mod classify;
pub mod consumer;
pub mod extractor;
pub mod naming;
pub mod producer;
pub mod treesitter;
pub mod walker;
