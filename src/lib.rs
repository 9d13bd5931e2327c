//! # Telecom Harness
//!
//! Ingestion and analysis pipeline for telecom device logs and packet
//! captures.
//!
//! Artifacts are validated, analyzed by a reasoning service, and (for logs)
//! segmented, embedded and indexed for semantic search. Every stage after
//! analysis degrades instead of failing: an artifact whose embeddings or
//! index writes fail still ends in `completed_without_vectors` with its
//! analysis stored.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────────────────┐   ┌──────────┐
//! │ tlh ingest │──▶│ AnalysisPipeline          │──▶│  SQLite  │
//! │ tlh analyze│   │ validate → analyze →      │   │ records  │
//! └────────────┘   │ embed → index             │   │ + vectors│
//!       │          └──────────────────────────┘   └──────────┘
//!       ▼                     │
//!  decode (pcap)        ServiceClient
//!                   (offline | live HTTP)
//! ```
//!
//! Parsing, segmentation, validation and capture analysis live in
//! [`telecom_harness_core`]; this crate adds persistence, the HTTP service
//! client, frame decoding, the pipeline and the CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite record and vector stores |
//! | [`live_client`] | OpenAI-compatible HTTP service client |
//! | [`services`] | Collaborator selection from configuration |
//! | [`decode`] | Raw frame decoding and pcap reading |
//! | [`pipeline`] | The analysis state machine |
//! | [`runner`] | Bounded background runs |
//! | [`ingest`] | File and directory ingestion |
//! | [`search`] | Semantic search |
//! | [`show`] | Artifact, resolution and activity commands |
//! | [`parse_cmd`] | Line-by-line parse preview |

pub mod config;
pub mod db;
pub mod decode;
pub mod ingest;
pub mod live_client;
pub mod migrate;
pub mod parse_cmd;
pub mod pipeline;
pub mod runner;
pub mod search;
pub mod services;
pub mod show;
pub mod sqlite_store;
