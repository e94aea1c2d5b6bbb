//! mai-streaming: idempotent ingestion of flow-record files into Elasticsearch
//!
//! Files produced by the traffic classifier are discovered in a directory,
//! read in batches, normalized, and bulk-loaded. Each file is marked done
//! with a sibling marker file once all of its rows were submitted, so
//! repeated or continuous runs never ingest a file twice.

pub mod capture;
pub mod commands;
pub mod config;
pub mod error;
pub mod locate;
pub mod pipeline;
pub mod progress;
pub mod reader;
pub mod record;
pub mod store;
pub mod tracker;
pub mod transform;
