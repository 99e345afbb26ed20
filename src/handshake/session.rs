//! Session resumption.
//!
//! After a full handshake the server caches `(suite, resumption secret)`
//! under the session id it issued, and the client keeps the same values in a
//! [`ResumptionTicket`]. Presenting the ticket's id later lets the server
//! skip key exchange and signatures.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::crypto::SecretBytes;
use crate::types::{CipherSuite, SessionId};

const DEFAULT_CAPACITY: usize = 4096;

/// What a client needs to resume a session.
#[derive(Clone)]
pub struct ResumptionTicket {
    session_id: SessionId,
    suite: CipherSuite,
    secret: SecretBytes,
    expires: Instant,
}

impl ResumptionTicket {
    pub(crate) fn new(
        session_id: SessionId,
        suite: CipherSuite,
        secret: SecretBytes,
        expires: Instant,
    ) -> Self {
        ResumptionTicket {
            session_id,
            suite,
            secret,
            expires,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn cipher_suite(&self) -> CipherSuite {
        self.suite
    }

    pub(crate) fn secret(&self) -> &[u8] {
        &self.secret
    }

    pub fn expires(&self) -> Instant {
        self.expires
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires
    }
}

impl fmt::Debug for ResumptionTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResumptionTicket")
            .field("session_id", &self.session_id)
            .field("suite", &self.suite)
            .field("expires", &self.expires)
            .finish_non_exhaustive()
    }
}

struct CachedSession {
    suite: CipherSuite,
    secret: SecretBytes,
    expires: Instant,
}

/// Server side store of resumable sessions.
///
/// Shared by every connection of a listener.
pub struct SessionCache {
    entries: Mutex<HashMap<SessionId, CachedSession>>,
    capacity: usize,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        SessionCache {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn insert(
        &self,
        id: SessionId,
        suite: CipherSuite,
        secret: SecretBytes,
        lifetime: Duration,
    ) {
        self.insert_at(id, suite, secret, lifetime, Instant::now())
    }

    fn insert_at(
        &self,
        id: SessionId,
        suite: CipherSuite,
        secret: SecretBytes,
        lifetime: Duration,
        now: Instant,
    ) {
        let mut entries = self.entries.lock();
        entries.retain(|_, e| e.expires > now);

        if entries.len() >= self.capacity && !entries.contains_key(&id) {
            // Evict whatever expires first.
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.expires)
                .map(|(k, _)| k.clone());
            if let Some(k) = oldest {
                entries.remove(&k);
            }
        }

        entries.insert(
            id,
            CachedSession {
                suite,
                secret,
                expires: now + lifetime,
            },
        );
    }

    /// An unexpired session by id.
    pub(crate) fn lookup(&self, id: &SessionId) -> Option<(CipherSuite, SecretBytes)> {
        self.lookup_at(id, Instant::now())
    }

    pub(crate) fn lookup_at(
        &self,
        id: &SessionId,
        now: Instant,
    ) -> Option<(CipherSuite, SecretBytes)> {
        let mut entries = self.entries.lock();
        match entries.get(id) {
            Some(e) if e.expires > now => Some((e.suite, e.secret.clone())),
            Some(_) => {
                entries.remove(id);
                None
            }
            None => None,
        }
    }

    /// Forget a session, e.g. after its connection failed.
    pub fn remove(&self, id: &SessionId) {
        self.entries.lock().remove(id);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
