//! Core types, error taxonomy, and configuration for flowcheck.
//!
//! This crate provides the data structures shared by every flowcheck crate:
//! - [`types`] — Producer, broker, and consumer contracts
//! - [`report`] — Findings, severities, and the per-module report
//! - [`error`] — Discovery, extraction, and comparison errors
//! - [`config`] — Configuration loading from `.flowcheck/flowcheck.json`
//! - [`hash`] — Content hashing and stable finding ids (base62 of xxhash64)

pub mod config;
pub mod error;
pub mod hash;
pub mod report;
pub mod types;
