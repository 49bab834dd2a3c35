use super::{
    super::{error::Error, iterable::LazyIterable, result::Result},
    Cursor, Mode,
};
use std::fmt;

/// An index-style handle to a session stored in a [`SessionArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(usize);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Owns the sessions opened by a consumer.
///
/// Opening always creates a fresh session; resuming the most recent one is a
/// separate, explicit operation. Slots are never reused, so a stale
/// [`SessionId`] can not alias a newer session.
pub struct SessionArena<T> {
    slots: Vec<Option<Cursor<T>>>,
    last: Option<SessionId>,
}

impl<T> Default for SessionArena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            last: None,
        }
    }
}

impl<T: 'static> SessionArena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new session over the iterable and makes it the most recent one.
    pub fn open(&mut self, iterable: &LazyIterable<T>, mode: Mode) -> SessionId {
        let id = SessionId(self.slots.len());
        self.slots.push(Some(iterable.open(mode)));
        self.last = Some(id);

        tracing::debug!("opened session {} in {:?} mode", id, mode);

        id
    }

    pub fn get_mut(&mut self, id: SessionId) -> Result<&mut Cursor<T>> {
        self.slots
            .get_mut(id.0)
            .and_then(|slot| slot.as_mut())
            .ok_or(Error::UnknownSession(id))
    }

    pub fn last_id(&self) -> Option<SessionId> {
        self.last
    }

    /// Resumes the most recently opened session, if it is still open.
    pub fn last_mut(&mut self) -> Option<&mut Cursor<T>> {
        let id = self.last?;

        self.get_mut(id).ok()
    }

    pub fn cancel(&mut self, id: SessionId) -> Result<()> {
        self.get_mut(id)?.cancel();

        Ok(())
    }

    pub fn fail(&mut self, id: SessionId, error: Error) -> Result<()> {
        self.get_mut(id)?.fail(error);

        Ok(())
    }

    /// Removes a session from the arena, handing ownership back.
    pub fn close(&mut self, id: SessionId) -> Result<Cursor<T>> {
        let cursor = self
            .slots
            .get_mut(id.0)
            .and_then(|slot| slot.take())
            .ok_or(Error::UnknownSession(id))?;

        if self.last == Some(id) {
            self.last = None;
        }

        Ok(cursor)
    }

    /// Cancels and removes every open session.
    pub fn cancel_all(&mut self) {
        for mut cursor in self.slots.drain(..).flatten() {
            cursor.cancel();
        }

        self.last = None;
    }

    /// The number of sessions still held by the arena.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
