use ideabridge_auth::{Authenticator, User};
use ideabridge_chats::ConversationStore;

use crate::registry::ConnectionRegistry;
use crate::rooms::RoomMembership;
use crate::ApiError;

/// Shared state handed to every route and socket handler.
#[derive(Clone)]
pub struct AppState {
    authenticator: Authenticator,
    store: ConversationStore,
    registry: ConnectionRegistry,
    rooms: RoomMembership,
}

impl AppState {
    pub fn new(authenticator: Authenticator, store: ConversationStore) -> Self {
        Self {
            authenticator,
            store,
            registry: ConnectionRegistry::new(),
            rooms: RoomMembership::new(),
        }
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn rooms(&self) -> &RoomMembership {
        &self.rooms
    }

    /// Resolve a bearer token to the identity behind it.
    pub async fn authenticate(&self, token: &str) -> Result<User, ApiError> {
        let (user, _session) = self.authenticator.authenticate_token(token).await?;
        Ok(user)
    }
}
