//! Registrations issued before a concrete server exists.
//!
//! An explicit shared queue object, not a process global: hosts that run
//! several independent servers give each its own queue. Entries keep
//! their issue order and are flushed exactly once when a server starts —
//! `drain` empties the queue, so a second start finds nothing.

use std::sync::{Arc, Mutex};

use crate::prompts::PromptTemplate;
use crate::resources::ResourceEntry;
use crate::tool::ToolHandler;

pub enum PendingRegistration {
    Tool(Arc<dyn ToolHandler>),
    Resource(ResourceEntry),
    Prompt(PromptTemplate),
}

#[derive(Clone, Default)]
pub struct RegistrationQueue {
    inner: Arc<Mutex<Vec<PendingRegistration>>>,
}

impl RegistrationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_tool(&self, handler: Arc<dyn ToolHandler>) {
        self.lock().push(PendingRegistration::Tool(handler));
    }

    pub fn queue_resource(&self, entry: ResourceEntry) {
        self.lock().push(PendingRegistration::Resource(entry));
    }

    pub fn queue_prompt(&self, template: PromptTemplate) {
        self.lock().push(PendingRegistration::Prompt(template));
    }

    /// Take everything, in issue order. The queue is empty afterwards.
    pub fn drain(&self) -> Vec<PendingRegistration> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<PendingRegistration>> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}
