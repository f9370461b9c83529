// SPDX-License-Identifier: PMPL-1.0-or-later
//! catfed core
//!
//! The data model shared by every part of catalog federation, and the narrow
//! interfaces through which federation talks to its collaborators:
//!
//! - [`Source`]: a queryable metadata endpoint (WFS, CSW, OpenSearch, a peer
//!   catalog, ...). Adapters live outside this crate.
//! - [`PreFederatedQueryPlugin`] / [`PostFederatedQueryPlugin`]: request and
//!   response transformation steps run around a federation.
//!
//! Nothing in here performs I/O; the federation engine lives in
//! `catfed-federation`.

pub mod error;
pub mod metacard;
pub mod plugin;
pub mod query;
pub mod response;
pub mod source;

pub use error::{PluginError, SourceError};
pub use metacard::{Metacard, ResultRecord};
pub use plugin::{PostFederatedQueryPlugin, PreFederatedQueryPlugin};
pub use query::{Query, QueryRequest, SortBy, SortDirection};
pub use response::{
    FailureKind, HitCount, PluginFailure, ProcessingDetail, QueryResponse, SourceProperties,
    SourceResponse,
};
pub use source::{MaskedSource, Source};
