//! Per-connection session state for the canvas server
//!
//! This module owns every piece of state tied to a single connection:
//! - Display identity announced by the client
//! - Last known cursor position
//! - The resource pinned to an in-progress drag gesture
//!
//! Sessions are created when a connection is accepted and destroyed when it
//! closes. Nothing outside the registry holds session state.

use log::{debug, info, warn};
use shared::{Identity, PeerIdentity, ResourceId, SessionId};
use std::collections::HashMap;
use std::time::Instant;

/// Server-side state for one connected client
///
/// All fields start empty: identity arrives with the first announcement,
/// cursor with the first movement, and the pinned resource only exists
/// while a drag gesture is active.
#[derive(Debug, Clone)]
pub struct Session {
    /// Handle assigned when the connection was accepted
    pub id: SessionId,
    /// Name and color, absent until the client announces them
    pub identity: Option<Identity>,
    /// Last reported pointer position
    pub cursor: Option<(f32, f32)>,
    /// Resource reused by every continuation of the active drag gesture
    pub pinned_resource: Option<ResourceId>,
    /// When the session was registered
    pub connected_at: Instant,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            identity: None,
            cursor: None,
            pinned_resource: None,
            connected_at: Instant::now(),
        }
    }

    /// True while a drag gesture holds a pinned resource
    pub fn has_active_gesture(&self) -> bool {
        self.pinned_resource.is_some()
    }
}

/// Owns all session records, keyed by session id
///
/// Operations addressed to an unknown session are protocol violations: they
/// are logged and ignored so that one misbehaving connection never affects
/// the others.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// Creates an empty session, replacing any existing record for the id
    pub fn register(&mut self, id: SessionId) {
        if self.sessions.insert(id, Session::new(id)).is_some() {
            warn!("Session {} registered twice, previous state discarded", id);
        }
        info!("Session {} registered", id);
    }

    /// Removes every record held for the session
    ///
    /// Returns the removed session, or None if it was already gone. Safe to
    /// call any number of times.
    pub fn unregister(&mut self, id: SessionId) -> Option<Session> {
        let session = self.sessions.remove(&id)?;
        info!(
            "Session {} unregistered after {:.1?}",
            id,
            session.connected_at.elapsed()
        );
        if session.has_active_gesture() {
            debug!("Session {} left in the middle of a drag gesture", id);
        }
        Some(session)
    }

    pub fn set_identity(&mut self, id: SessionId, identity: Identity) -> bool {
        match self.sessions.get_mut(&id) {
            Some(session) => {
                info!(
                    "Session {} is now known as {} ({})",
                    id, identity.name, identity.color
                );
                session.identity = Some(identity);
                true
            }
            None => {
                warn!("Identity announced for unknown session {}", id);
                false
            }
        }
    }

    pub fn update_cursor(&mut self, id: SessionId, x: f32, y: f32) -> bool {
        match self.sessions.get_mut(&id) {
            Some(session) => {
                session.cursor = Some((x, y));
                true
            }
            None => {
                warn!("Cursor update for unknown session {}", id);
                false
            }
        }
    }

    /// Pins a resource to the session's active drag gesture
    pub fn pin_resource(&mut self, id: SessionId, resource: ResourceId) -> bool {
        match self.sessions.get_mut(&id) {
            Some(session) => {
                session.pinned_resource = Some(resource);
                true
            }
            None => {
                warn!("Tried to pin resource {} to unknown session {}", resource, id);
                false
            }
        }
    }

    pub fn pinned_resource(&self, id: SessionId) -> Option<ResourceId> {
        self.sessions.get(&id).and_then(|s| s.pinned_resource)
    }

    /// Ends the session's drag gesture, returning the resource it held
    pub fn release_pin(&mut self, id: SessionId) -> Option<ResourceId> {
        self.sessions
            .get_mut(&id)
            .and_then(|s| s.pinned_resource.take())
    }

    /// Identities of every session that has announced one, ordered by id
    pub fn snapshot(&self) -> Vec<PeerIdentity> {
        let mut peers: Vec<PeerIdentity> = self
            .sessions
            .values()
            .filter_map(|session| {
                session.identity.clone().map(|identity| PeerIdentity {
                    session_id: session.id,
                    identity,
                })
            })
            .collect();

        peers.sort_by_key(|peer| peer.session_id);
        peers
    }

    /// Last known cursor of every session that has moved, ordered by id
    pub fn cursors(&self) -> Vec<(SessionId, f32, f32)> {
        let mut cursors: Vec<(SessionId, f32, f32)> = self
            .sessions
            .values()
            .filter_map(|session| session.cursor.map(|(x, y)| (session.id, x, y)))
            .collect();

        cursors.sort_by_key(|(id, _, _)| *id);
        cursors
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Returns the number of registered sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
