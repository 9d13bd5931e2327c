//! # Telecom Harness Core
//!
//! Runtime-free logic for Telecom Harness: data models, log parsing and
//! segmentation, the log validator, packet-capture analysis, and the
//! collaborator traits (record store, vector store, service client) with
//! their in-memory and offline implementations.
//!
//! This crate contains no tokio, sqlx, network, or filesystem I/O.

pub mod capture;
pub mod embedding;
pub mod logparse;
pub mod models;
pub mod segment;
pub mod service;
pub mod store;
pub mod validate;
pub mod vector;
