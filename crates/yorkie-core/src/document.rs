//! The document: local mutation surface and change-pack plumbing.

use thiserror::Error;

use crate::change::{Change, ChangeContext, ChangeID, ChangePack, Checkpoint};
use crate::crdt::{CrdtError, Root};
use crate::json::JsonObject;
use crate::time::{ActorID, Ticket, INITIAL_TICKET};

/// Failures surfaced by [`Document::update`] and
/// [`Document::apply_change_pack`]. Either way the document is left in its
/// pre-call state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
    /// The update callback bailed out; the in-flight context was discarded.
    #[error("update callback failed: {0}")]
    UserCallbackFailed(String),
    #[error(transparent)]
    Crdt(#[from] CrdtError),
    #[error(transparent)]
    Wire(#[from] crate::codec::WireError),
}

/// A replicated JSON document.
///
/// All mutation goes through [`Document::update`]; replication happens by
/// exchanging change packs. A document is single-writer: it is not safe to
/// share across threads without external serialization, matching the
/// one-change-context-at-a-time model.
#[derive(Debug, Clone)]
pub struct Document {
    key: String,
    root: Root,
    change_id: ChangeID,
    checkpoint: Checkpoint,
    local_changes: Vec<Change>,
}

impl Document {
    /// Opens a document under `key` with a fresh random actor identity.
    pub fn new(key: impl Into<String>) -> Self {
        Document::with_actor(key, ActorID::random())
    }

    /// Opens a document with an explicit actor identity. Tests and
    /// transports that assign identities use this constructor.
    pub fn with_actor(key: impl Into<String>, actor: ActorID) -> Self {
        Document {
            key: key.into(),
            root: Root::new(),
            change_id: ChangeID::initial(actor),
            checkpoint: Checkpoint::INITIAL,
            local_changes: Vec::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn actor(&self) -> ActorID {
        self.change_id.actor()
    }

    /// Read access to the element tree.
    pub fn root(&self) -> &Root {
        &self.root
    }

    /// Canonical JSON rendering of the current document state.
    pub fn marshal(&self) -> String {
        self.root.marshal()
    }

    pub fn garbage_len(&self) -> usize {
        self.root.garbage_len()
    }

    /// Reclaims tombstones removed at or before `max`; see
    /// [`Root::garbage_collect`]. The bound is the minimum ticket every
    /// replica has observed; providing it is the transport's job.
    pub fn garbage_collect(&mut self, max: Ticket) -> usize {
        self.root.garbage_collect(max)
    }

    /// Runs `updater` against the document root inside a fresh change
    /// context and seals the buffered operations into a local change.
    ///
    /// The mutation is atomic: if the callback returns an error, the
    /// context is discarded and the document is left bytewise unchanged.
    /// An update that issues no operations records no change.
    pub fn update<F>(&mut self, updater: F, message: &str) -> Result<(), DocumentError>
    where
        F: FnOnce(&mut JsonObject<'_>) -> Result<(), DocumentError>,
    {
        let next_id = self.change_id.next();
        let mut ctx = ChangeContext::new(next_id, message);
        let mut root = self.root.clone();
        {
            let mut facade = JsonObject::new(&mut root, &mut ctx, INITIAL_TICKET);
            updater(&mut facade)?;
        }
        if ctx.has_operations() {
            self.local_changes.push(ctx.seal());
            self.change_id = next_id;
            self.root = root;
        }
        Ok(())
    }

    /// Pending local changes not yet acknowledged by the transport.
    pub fn has_local_changes(&self) -> bool {
        !self.local_changes.is_empty()
    }

    /// Bundles the pending local changes for the transport, advancing the
    /// checkpoint's client sequence past them.
    pub fn create_change_pack(&self) -> ChangePack {
        let checkpoint = self
            .checkpoint
            .increase_client_seq(self.local_changes.len() as u32);
        ChangePack::new(
            self.key.clone(),
            checkpoint,
            self.local_changes.clone(),
            None,
        )
    }

    /// Applies a received change pack: executes every change, syncs the
    /// lamport clock, forwards the checkpoint, prunes acknowledged local
    /// changes, and runs a GC pass when the pack carries a min-synced
    /// ticket.
    ///
    /// On error the document keeps its pre-apply state.
    pub fn apply_change_pack(&mut self, pack: &ChangePack) -> Result<(), DocumentError> {
        let mut root = self.root.clone();
        let mut change_id = self.change_id;
        for change in pack.changes() {
            change.execute(&mut root)?;
            change_id = change_id.sync_lamport(change.id().lamport());
        }
        self.root = root;
        self.change_id = change_id;
        self.checkpoint = self.checkpoint.forward(pack.checkpoint());
        let acked = pack.checkpoint().client_seq();
        self.local_changes.retain(|c| c.id().client_seq() > acked);
        if let Some(min_synced) = pack.min_synced_ticket() {
            self.root.garbage_collect(min_synced);
        }
        Ok(())
    }
}
