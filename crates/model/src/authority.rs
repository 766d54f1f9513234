//! Exclusive access to the document engine.
//!
//! The engine is not safe for concurrent use. A [`ModelAuthority`] hands out
//! at most one [`AuthorityLease`] at a time, and a [`ModelContext`] can only
//! be opened through a lease, so at most one context exists per authority.

use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::artifact;
use crate::document::Document;
use crate::error::ModelError;
use crate::template::TemplateSpec;

#[derive(Debug)]
pub struct ModelAuthority {
    held: AtomicBool,
    template: TemplateSpec,
}

impl ModelAuthority {
    pub fn new(template: TemplateSpec) -> Self {
        Self {
            held: AtomicBool::new(false),
            template,
        }
    }

    pub fn template(&self) -> &TemplateSpec {
        &self.template
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Take the lease. Fails if someone else already holds it.
    pub fn acquire(&self) -> Result<AuthorityLease<'_>, ModelError> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ModelError::AuthorityUnavailable)?;
        tracing::trace!("Model authority acquired");
        Ok(AuthorityLease { authority: self })
    }
}

/// Proof of exclusive access. Released on drop.
#[derive(Debug)]
pub struct AuthorityLease<'a> {
    authority: &'a ModelAuthority,
}

impl AuthorityLease<'_> {
    /// Open a fresh document seeded from the template.
    pub fn new_context(&mut self) -> ModelContext<'_> {
        ModelContext {
            document: self.authority.template.instantiate(),
            _lease: PhantomData,
        }
    }

    /// Reopen a previously persisted model.
    pub fn open_artifact(&mut self, bytes: &[u8]) -> Result<ModelContext<'_>, ModelError> {
        Ok(ModelContext {
            document: artifact::decode(bytes)?,
            _lease: PhantomData,
        })
    }
}

impl Drop for AuthorityLease<'_> {
    fn drop(&mut self) {
        self.authority.held.store(false, Ordering::Release);
        tracing::trace!("Model authority released");
    }
}

/// The document under construction, borrowed from a lease.
///
/// Dropping the context discards the document.
#[derive(Debug)]
pub struct ModelContext<'l> {
    document: Document,
    _lease: PhantomData<&'l mut ()>,
}

impl Deref for ModelContext<'_> {
    type Target = Document;

    fn deref(&self) -> &Document {
        &self.document
    }
}

impl DerefMut for ModelContext<'_> {
    fn deref_mut(&mut self) -> &mut Document {
        &mut self.document
    }
}
