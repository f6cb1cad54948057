//! One protocol handler per `Mcp-Session-Id`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::auth::Principal;
use crate::protocol::ProtocolHandler;

/// Builds a fresh handler for each new session.
pub type HandlerFactory = Arc<dyn Fn() -> ProtocolHandler + Send + Sync>;

pub struct SessionRegistry {
    factory: HandlerFactory,
    sessions: HashMap<String, Arc<ProtocolHandler>>,
}

impl SessionRegistry {
    pub fn new(factory: HandlerFactory) -> Self {
        Self {
            factory,
            sessions: HashMap::new(),
        }
    }

    /// Start a session under a new random id.
    pub fn create(&mut self, principal: Option<Principal>) -> (String, Arc<ProtocolHandler>) {
        let id = uuid::Uuid::new_v4().to_string();
        let mut handler = (self.factory)();
        if let Some(principal) = principal {
            tracing::info!("Opening session {id} for {}", principal.id);
            handler = handler.with_principal(principal);
        } else {
            tracing::info!("Opening session {id}");
        }
        let handler = Arc::new(handler);
        self.sessions.insert(id.clone(), handler.clone());
        (id, handler)
    }

    pub fn get(&self, id: &str) -> Option<Arc<ProtocolHandler>> {
        self.sessions.get(id).cloned()
    }

    pub async fn remove(&mut self, id: &str) -> bool {
        match self.sessions.remove(id) {
            Some(handler) => {
                handler.close().await;
                tracing::info!("Closed session {id}");
                true
            }
            None => false,
        }
    }

    /// Number of active sessions.
    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}
