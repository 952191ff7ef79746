//! Server-wide context handed to every session.

use std::sync::Arc;

use crate::connection::{ConnectionManager, ConnectionObserver};
use crate::protocol::ProtocolHandler;

const DEFAULT_MAX_COMMAND_LENGTH: usize = 4096;

pub struct ServerContext {
    handler: Arc<dyn ProtocolHandler>,
    observer: Option<Arc<dyn ConnectionObserver>>,
    connections: Arc<ConnectionManager>,
    max_command_length: usize,
}

impl ServerContext {
    pub fn new(handler: Arc<dyn ProtocolHandler>, connections: Arc<ConnectionManager>) -> Self {
        Self {
            handler,
            observer: None,
            connections,
            max_command_length: DEFAULT_MAX_COMMAND_LENGTH,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ConnectionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_max_command_length(mut self, max_command_length: usize) -> Self {
        self.max_command_length = max_command_length;
        self
    }

    pub fn handler(&self) -> &Arc<dyn ProtocolHandler> {
        &self.handler
    }

    pub fn observer(&self) -> Option<&Arc<dyn ConnectionObserver>> {
        self.observer.as_ref()
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    pub fn max_command_length(&self) -> usize {
        self.max_command_length
    }
}
