//! Optimistic writes with guaranteed rollback.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use campus_domain::{CacheKey, ResourceType, ValidationErrors};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use super::Patch;
use crate::cache::{CacheSnapshot, QueryCache};
use crate::error::{ApplicationError, ApplicationResult};
use crate::rate_limiter::RateLimiter;

/// What to do with affected keys once the server confirms a write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Settle {
    /// Mark affected keys stale so the next read refetches.
    #[default]
    Invalidate,
    /// Store the server response under this key; other affected keys are
    /// invalidated.
    Put(CacheKey),
}

/// Description of one write: the keys it affects and its expected effect.
#[derive(Debug, Clone, Default)]
pub struct Mutation {
    keys: Vec<CacheKey>,
    patch: Patch,
    label: Option<String>,
    settle: Settle,
    resources: Vec<ResourceType>,
}

impl Mutation {
    /// A mutation affecting `keys` with no optimistic effect.
    #[must_use]
    pub fn new(keys: impl IntoIterator<Item = CacheKey>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Sets the optimistic patch.
    #[must_use]
    pub fn with_patch(mut self, patch: Patch) -> Self {
        self.patch = patch;
        self
    }

    /// Labels the mutation for double-submit protection.
    #[must_use]
    pub fn labelled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Sets the success behaviour.
    #[must_use]
    pub fn settle_with(mut self, settle: Settle) -> Self {
        self.settle = settle;
        self
    }

    /// Additionally invalidates every key of `resource` on success. Creates
    /// shift every page, so they usually want this.
    #[must_use]
    pub fn invalidating(mut self, resource: ResourceType) -> Self {
        self.resources.push(resource);
        self
    }

    /// Affected keys.
    #[must_use]
    pub fn keys(&self) -> &[CacheKey] {
        &self.keys
    }

    /// Label, if any.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

/// Runs every cache-affecting write.
///
/// The snapshot and the optimistic patch are applied synchronously before
/// the remote call starts; a failure restores every affected key to exactly
/// its snapshot before the error is returned.
#[derive(Clone)]
pub struct MutationCoordinator {
    cache: QueryCache,
    submitting: Arc<Mutex<HashSet<String>>>,
}

impl MutationCoordinator {
    /// Creates a coordinator writing through `cache`.
    #[must_use]
    pub fn new(cache: QueryCache) -> Self {
        Self {
            cache,
            submitting: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Returns true while a mutation labelled `label` is in flight.
    #[must_use]
    pub fn is_submitting(&self, label: &str) -> bool {
        self.submitting.lock().contains(label)
    }

    /// Executes `operation` with `mutation`'s optimistic effect applied.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateSubmit` without touching the cache when the same
    /// label is already in flight, otherwise the error of `operation` after
    /// rolling back.
    pub async fn execute<F>(&self, mutation: Mutation, operation: F) -> ApplicationResult<Value>
    where
        F: Future<Output = ApplicationResult<Value>>,
    {
        let _submit = self.begin(&mutation)?;
        self.run(mutation, operation).await
    }

    /// Like [`Self::execute`], with client validation and throttling in
    /// front.
    ///
    /// Validation failures return first and are not counted. A remote 429
    /// feeds its retry-after back into `limiter`.
    ///
    /// # Errors
    ///
    /// Returns `ClientValidation`, `DuplicateSubmit` or `RateLimited` before
    /// anything is sent, otherwise as [`Self::execute`].
    pub async fn execute_gated<F>(
        &self,
        limiter: &RateLimiter,
        validation: ValidationErrors,
        mutation: Mutation,
        operation: F,
    ) -> ApplicationResult<Value>
    where
        F: Future<Output = ApplicationResult<Value>>,
    {
        validation
            .into_result()
            .map_err(ApplicationError::ClientValidation)?;
        let _submit = self.begin(&mutation)?;
        limiter.attempt().await?;

        let result = self.run(mutation, operation).await;
        if let Err(ApplicationError::RateLimited {
            retry_after_secs: Some(secs),
        }) = &result
        {
            limiter.apply_retry_after(*secs).await;
        }
        result
    }

    fn begin(&self, mutation: &Mutation) -> ApplicationResult<Option<SubmitGuard>> {
        let Some(label) = mutation.label() else {
            return Ok(None);
        };
        if !self.submitting.lock().insert(label.to_string()) {
            debug!(label, "duplicate submit ignored");
            return Err(ApplicationError::DuplicateSubmit(label.to_string()));
        }
        Ok(Some(SubmitGuard {
            submitting: Arc::clone(&self.submitting),
            label: label.to_string(),
        }))
    }

    async fn run<F>(&self, mutation: Mutation, operation: F) -> ApplicationResult<Value>
    where
        F: Future<Output = ApplicationResult<Value>>,
    {
        let snapshot = self.cache.apply_optimistic(&mutation.keys, &mutation.patch);
        let mut rollback = Rollback {
            cache: &self.cache,
            snapshot: Some(snapshot),
        };

        match operation.await {
            Ok(value) => {
                let cleared = rollback
                    .disarm()
                    .is_some_and(|snapshot| !self.cache.holds(&snapshot));
                if cleared {
                    debug!(keys = mutation.keys.len(), "cache cleared during mutation, not settling");
                } else {
                    self.confirm(&mutation, &value);
                }
                Ok(value)
            }
            Err(e) => {
                warn!(
                    label = mutation.label().unwrap_or("-"),
                    keys = mutation.keys.len(),
                    error = %e,
                    "mutation failed, rolling back"
                );
                rollback.restore();
                Err(e)
            }
        }
    }

    fn confirm(&self, mutation: &Mutation, value: &Value) {
        match &mutation.settle {
            Settle::Invalidate => self.cache.invalidate_many(&mutation.keys),
            Settle::Put(target) => {
                self.cache.put(target, value.clone());
                let others: Vec<CacheKey> = mutation
                    .keys
                    .iter()
                    .filter(|key| *key != target)
                    .cloned()
                    .collect();
                self.cache.invalidate_many(&others);
            }
        }
        for resource in &mutation.resources {
            self.cache.invalidate_resource(resource);
        }
    }
}

struct SubmitGuard {
    submitting: Arc<Mutex<HashSet<String>>>,
    label: String,
}

impl Drop for SubmitGuard {
    fn drop(&mut self) {
        self.submitting.lock().remove(&self.label);
    }
}

/// Restores the snapshot unless disarmed. Dropped while armed (the caller
/// abandoned the write) it also invalidates, since the server may have
/// applied it.
struct Rollback<'a> {
    cache: &'a QueryCache,
    snapshot: Option<CacheSnapshot>,
}

impl Rollback<'_> {
    fn disarm(&mut self) -> Option<CacheSnapshot> {
        self.snapshot.take()
    }

    fn restore(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.cache.restore_snapshot(snapshot);
        }
    }
}

impl Drop for Rollback<'_> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            let keys: Vec<CacheKey> = snapshot.keys().cloned().collect();
            warn!(keys = keys.len(), "mutation abandoned, restoring snapshot");
            if self.cache.restore_snapshot(snapshot) {
                self.cache.invalidate_many(&keys);
            }
        }
    }
}
