// Copyright 2026 Dashboard Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Dashboard harvest — export every table widget on a set of web dashboards
//! and file each anonymous download under the widget that produced it.
//!
//! Downloads are matched to widgets by their header row alone: the page is
//! snapshotted before any export is clicked, and each arriving file is
//! re-fingerprinted and routed against that snapshot.

pub mod cli;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod renderer;
pub mod report;
pub mod retry;
pub mod router;
pub mod session;
pub mod signature;
pub mod snapshot;
pub mod staging;
pub mod trigger;
pub mod watcher;

pub use config::{HarvestConfig, PageFailurePolicy, WidgetSelectors};
pub use error::{HarvestError, HarvestResult};
pub use orchestrator::{run, Harvester};
pub use report::{PageReport, PageStatus, RunReport};
pub use signature::{Signature, SignatureNormalizer};
pub use snapshot::SchemaMap;
