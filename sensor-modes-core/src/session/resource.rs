use std::fmt;

use uuid::Uuid;

use crate::traits::session::Session;

/// Identifies one opened hardware session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owner of at most one hardware session.
///
/// Releasing an empty handle is a no-op. Dropping the handle releases
/// whatever it still holds.
pub struct ResourceHandle<S: Session> {
    label: &'static str,
    slot: Option<(SessionId, S)>,
}

impl<S: Session> ResourceHandle<S> {
    pub fn new(label: &'static str) -> Self {
        Self { label, slot: None }
    }

    /// Take ownership of `session`. A session still held is closed first.
    pub fn acquire(&mut self, session: S) -> SessionId {
        self.acquire_as(SessionId::new(), session)
    }

    /// Like [`ResourceHandle::acquire`], with an id allocated before the
    /// session was opened.
    pub fn acquire_as(&mut self, id: SessionId, session: S) -> SessionId {
        if self.release() {
            log::warn!("{}: replaced a session that was still open", self.label);
        }
        log::debug!("{}: acquired session {}", self.label, id);
        self.slot = Some((id, session));
        id
    }

    /// Close the held session, if any. Returns whether one was released.
    pub fn release(&mut self) -> bool {
        let Some((id, mut session)) = self.slot.take() else {
            return false;
        };
        if let Err(e) = session.close() {
            log::warn!("{}: error closing session {}: {}", self.label, id, e);
        }
        log::debug!("{}: released session {}", self.label, id);
        true
    }

    /// Hand the held session back to the caller without closing it.
    pub fn detach(&mut self) -> Option<(SessionId, S)> {
        self.slot.take()
    }

    pub fn is_held(&self) -> bool {
        self.slot.is_some()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.slot.as_ref().map(|(id, _)| *id)
    }

    pub fn get_mut(&mut self) -> Option<&mut S> {
        self.slot.as_mut().map(|(_, session)| session)
    }
}

impl<S: Session> Drop for ResourceHandle<S> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<S: Session> fmt::Debug for ResourceHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("label", &self.label)
            .field("session", &self.session_id())
            .finish()
    }
}
