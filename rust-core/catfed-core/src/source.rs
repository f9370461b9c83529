// SPDX-License-Identifier: PMPL-1.0-or-later
//! The source adapter interface.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::SourceError;
use crate::query::QueryRequest;
use crate::response::SourceResponse;

/// An independently queryable metadata endpoint.
///
/// Implementations must be safe to share across tokio tasks. A query may
/// take arbitrarily long; callers bound it, not the adapter.
#[async_trait]
pub trait Source: Send + Sync {
    /// Identifier reported in responses.
    fn id(&self) -> &str;

    /// Unavailable sources are skipped and reported as failed.
    fn is_available(&self) -> bool {
        true
    }

    /// Run `request` against this source.
    async fn query(&self, request: &QueryRequest) -> Result<SourceResponse, SourceError>;
}

#[async_trait]
impl<S: Source + ?Sized> Source for Arc<S> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    async fn query(&self, request: &QueryRequest) -> Result<SourceResponse, SourceError> {
        (**self).query(request).await
    }
}

/// Presents a source under a different identifier.
///
/// Records returned through the mask are re-attributed to the mask id so the
/// real id does not leak into merged results.
pub struct MaskedSource<S> {
    inner: S,
    mask: String,
}

impl<S: Source> MaskedSource<S> {
    pub fn new(inner: S, mask: impl Into<String>) -> Self {
        Self {
            inner,
            mask: mask.into(),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: Source> Source for MaskedSource<S> {
    fn id(&self) -> &str {
        &self.mask
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    async fn query(&self, request: &QueryRequest) -> Result<SourceResponse, SourceError> {
        let mut response = self.inner.query(request).await?;
        for record in &mut response.results {
            record.metacard.source_id = self.mask.clone();
        }
        Ok(response)
    }
}
