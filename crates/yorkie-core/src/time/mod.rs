//! Logical time: actor identities and tickets.
//!
//! A ticket `(lamport, delimiter, actor)` totally orders every operation and
//! element across replicas: lamport first, then actor bytes, then delimiter.
//! Tickets are only ever minted by a change context or decoded off the wire.

use std::cmp::Ordering;
use std::fmt;

use rand::RngCore;

/// Number of bytes in an [`ActorID`].
pub const ACTOR_ID_SIZE: usize = 12;

/// Encoded size of a [`Ticket`]: 8-byte lamport, 4-byte delimiter, actor.
pub const TICKET_SIZE: usize = 8 + 4 + ACTOR_ID_SIZE;

/// Replica identity: 12 opaque bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorID([u8; ACTOR_ID_SIZE]);

impl ActorID {
    /// The all-zero actor, owned by no replica. Used by sentinel tickets.
    pub const INITIAL: ActorID = ActorID([0x00; ACTOR_ID_SIZE]);

    /// The all-ones actor, greater than any real actor.
    pub const MAX: ActorID = ActorID([0xff; ACTOR_ID_SIZE]);

    /// Generates a fresh random actor identity.
    pub fn random() -> Self {
        let mut bytes = [0u8; ACTOR_ID_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        ActorID(bytes)
    }

    pub const fn from_bytes(bytes: [u8; ACTOR_ID_SIZE]) -> Self {
        ActorID(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ACTOR_ID_SIZE] {
        &self.0
    }
}

impl fmt::Display for ActorID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// A logical timestamp: the total-order key of every operation and element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket {
    lamport: u64,
    delimiter: u32,
    actor: ActorID,
}

/// Sentinel below every ticket a replica can issue.
pub const INITIAL_TICKET: Ticket = Ticket {
    lamport: 0,
    delimiter: 0,
    actor: ActorID::INITIAL,
};

/// Sentinel above every ticket a replica can issue.
pub const MAX_TICKET: Ticket = Ticket {
    lamport: u64::MAX,
    delimiter: u32::MAX,
    actor: ActorID::MAX,
};

impl Ticket {
    pub const fn new(lamport: u64, delimiter: u32, actor: ActorID) -> Self {
        Ticket {
            lamport,
            delimiter,
            actor,
        }
    }

    pub fn lamport(&self) -> u64 {
        self.lamport
    }

    pub fn delimiter(&self) -> u32 {
        self.delimiter
    }

    pub fn actor(&self) -> ActorID {
        self.actor
    }

    /// Returns `true` if this ticket is strictly greater than `other`.
    pub fn after(&self, other: Ticket) -> bool {
        *self > other
    }

    /// Fixed 24-byte big-endian encoding: lamport, delimiter, actor.
    pub fn to_bytes(&self) -> [u8; TICKET_SIZE] {
        let mut out = [0u8; TICKET_SIZE];
        out[..8].copy_from_slice(&self.lamport.to_be_bytes());
        out[8..12].copy_from_slice(&self.delimiter.to_be_bytes());
        out[12..].copy_from_slice(self.actor.as_bytes());
        out
    }

    pub fn from_bytes(bytes: [u8; TICKET_SIZE]) -> Self {
        let mut lamport = [0u8; 8];
        lamport.copy_from_slice(&bytes[..8]);
        let mut delimiter = [0u8; 4];
        delimiter.copy_from_slice(&bytes[8..12]);
        let mut actor = [0u8; ACTOR_ID_SIZE];
        actor.copy_from_slice(&bytes[12..]);
        Ticket {
            lamport: u64::from_be_bytes(lamport),
            delimiter: u32::from_be_bytes(delimiter),
            actor: ActorID::from_bytes(actor),
        }
    }
}

impl Ord for Ticket {
    fn cmp(&self, other: &Self) -> Ordering {
        self.lamport
            .cmp(&other.lamport)
            .then_with(|| self.actor.cmp(&other.actor))
            .then_with(|| self.delimiter.cmp(&other.delimiter))
    }
}

impl PartialOrd for Ticket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.lamport, self.actor, self.delimiter)
    }
}
