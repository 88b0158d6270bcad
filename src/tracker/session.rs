//! Per-connection login state. Unlike the tracker's shared directories,
//! a session belongs to exactly one connection handler thread, so it is
//! plain owned data rather than something behind the tracker's mutex —
//! at most one logged-in user per connection falls out of that for free.

use crate::endpoint::Endpoint;

#[derive(Debug, Default)]
pub struct Session {
    identity: Option<(String, Endpoint)>,
}

impl Session {
    pub fn is_logged_in(&self) -> bool {
        self.identity.is_some()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.identity.as_ref().map(|(u, _)| u.as_str())
    }

    pub fn endpoint(&self) -> Option<Endpoint> {
        self.identity.as_ref().map(|(_, e)| *e)
    }

    pub fn bind(&mut self, user_id: String, endpoint: Endpoint) {
        self.identity = Some((user_id, endpoint));
    }

    pub fn clear(&mut self) -> Option<(String, Endpoint)> {
        self.identity.take()
    }
}
