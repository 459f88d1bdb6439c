//! Changes: the atomic batches of operations replicas exchange.
//!
//! A change context is a short-lived transaction scope: it mints strictly
//! increasing tickets for one local update and buffers the operations the
//! facades produce. Sealing it yields a [`Change`]; the transport moves
//! changes between replicas inside [`ChangePack`]s.

use crate::crdt::{CrdtError, Root};
use crate::operation::Operation;
use crate::time::{ActorID, Ticket};

/// Identity of a change: `(clientSeq, lamport, actor)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeID {
    client_seq: u32,
    lamport: u64,
    actor: ActorID,
}

impl ChangeID {
    pub fn new(client_seq: u32, lamport: u64, actor: ActorID) -> Self {
        ChangeID {
            client_seq,
            lamport,
            actor,
        }
    }

    /// The identity a replica starts from before its first change.
    pub fn initial(actor: ActorID) -> Self {
        ChangeID {
            client_seq: 0,
            lamport: 0,
            actor,
        }
    }

    /// Identity of the next local change.
    pub fn next(&self) -> Self {
        ChangeID {
            client_seq: self.client_seq + 1,
            lamport: self.lamport + 1,
            actor: self.actor,
        }
    }

    /// Advances the lamport clock past an observed remote change, so the
    /// next local issuance is greater than everything seen so far.
    pub fn sync_lamport(&self, other_lamport: u64) -> Self {
        ChangeID {
            client_seq: self.client_seq,
            lamport: self.lamport.max(other_lamport),
            actor: self.actor,
        }
    }

    pub fn client_seq(&self) -> u32 {
        self.client_seq
    }

    pub fn lamport(&self) -> u64 {
        self.lamport
    }

    pub fn actor(&self) -> ActorID {
        self.actor
    }
}

/// A sealed batch of operations from one local update.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    id: ChangeID,
    message: String,
    operations: Vec<Operation>,
}

impl Change {
    pub fn new(id: ChangeID, message: String, operations: Vec<Operation>) -> Self {
        Change {
            id,
            message,
            operations,
        }
    }

    pub fn id(&self) -> ChangeID {
        self.id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// The `(min, max)` execution tickets this change covers, if any.
    pub fn ticket_range(&self) -> Option<(Ticket, Ticket)> {
        let min = self.operations.iter().map(|op| op.executed_at()).min()?;
        let max = self.operations.iter().map(|op| op.executed_at()).max()?;
        Some((min, max))
    }

    /// Applies every operation, in insertion order, against `root`.
    pub fn execute(&self, root: &mut Root) -> Result<(), CrdtError> {
        for op in &self.operations {
            op.execute(root)?;
        }
        Ok(())
    }
}

/// The per-update transaction scope: ticket issuer plus operation buffer.
#[derive(Debug)]
pub struct ChangeContext {
    id: ChangeID,
    message: String,
    operations: Vec<Operation>,
    delimiter: u32,
}

impl ChangeContext {
    pub fn new(id: ChangeID, message: impl Into<String>) -> Self {
        ChangeContext {
            id,
            message: message.into(),
            operations: Vec::new(),
            delimiter: 0,
        }
    }

    /// Mints a ticket strictly greater than every ticket this context has
    /// issued before.
    pub fn issue_ticket(&mut self) -> Ticket {
        self.delimiter += 1;
        Ticket::new(self.id.lamport, self.delimiter, self.id.actor)
    }

    pub fn push(&mut self, op: Operation) {
        self.operations.push(op);
    }

    pub fn has_operations(&self) -> bool {
        !self.operations.is_empty()
    }

    pub fn id(&self) -> ChangeID {
        self.id
    }

    pub fn seal(self) -> Change {
        Change::new(self.id, self.message, self.operations)
    }
}

/// Server/client sync watermark: `(serverSeq, clientSeq)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Checkpoint {
    server_seq: u64,
    client_seq: u32,
}

impl Checkpoint {
    pub const INITIAL: Checkpoint = Checkpoint {
        server_seq: 0,
        client_seq: 0,
    };

    pub fn new(server_seq: u64, client_seq: u32) -> Self {
        Checkpoint {
            server_seq,
            client_seq,
        }
    }

    pub fn server_seq(&self) -> u64 {
        self.server_seq
    }

    pub fn client_seq(&self) -> u32 {
        self.client_seq
    }

    pub fn increase_client_seq(&self, inc: u32) -> Self {
        Checkpoint {
            server_seq: self.server_seq,
            client_seq: self.client_seq + inc,
        }
    }

    /// Component-wise maximum; checkpoints only advance.
    pub fn forward(&self, other: Checkpoint) -> Self {
        Checkpoint {
            server_seq: self.server_seq.max(other.server_seq),
            client_seq: self.client_seq.max(other.client_seq),
        }
    }
}

/// The unit a transport ships: changes plus sync bookkeeping. When the
/// sender knows the minimum ticket every replica has observed, it rides
/// along so the receiver can run a GC pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangePack {
    document_key: String,
    checkpoint: Checkpoint,
    changes: Vec<Change>,
    min_synced_ticket: Option<Ticket>,
}

impl ChangePack {
    pub fn new(
        document_key: String,
        checkpoint: Checkpoint,
        changes: Vec<Change>,
        min_synced_ticket: Option<Ticket>,
    ) -> Self {
        ChangePack {
            document_key,
            checkpoint,
            changes,
            min_synced_ticket,
        }
    }

    pub fn document_key(&self) -> &str {
        &self.document_key
    }

    pub fn checkpoint(&self) -> Checkpoint {
        self.checkpoint
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn min_synced_ticket(&self) -> Option<Ticket> {
        self.min_synced_ticket
    }
}

/// One entry of a change history listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSummary {
    pub message: String,
    pub snapshot: String,
}

/// Replays `changes` over an empty root and captures the document snapshot
/// after each one. Summaries come back newest first.
pub fn change_summaries(changes: &[Change]) -> Result<Vec<ChangeSummary>, CrdtError> {
    let mut root = Root::new();
    let mut summaries = Vec::with_capacity(changes.len());
    for change in changes {
        change.execute(&mut root)?;
        summaries.push(ChangeSummary {
            message: change.message().to_string(),
            snapshot: root.marshal(),
        });
    }
    summaries.reverse();
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(b: u8) -> ActorID {
        ActorID::from_bytes([b; 12])
    }

    #[test]
    fn issued_tickets_increase_strictly() {
        let mut ctx = ChangeContext::new(ChangeID::initial(actor(1)).next(), "test");
        let a = ctx.issue_ticket();
        let b = ctx.issue_ticket();
        let c = ctx.issue_ticket();
        assert!(b.after(a));
        assert!(c.after(b));
        assert_eq!(a.lamport(), b.lamport());
    }

    #[test]
    fn sync_lamport_takes_the_maximum() {
        let id = ChangeID::initial(actor(1));
        assert_eq!(id.sync_lamport(5).lamport(), 5);
        assert_eq!(id.sync_lamport(5).sync_lamport(3).lamport(), 5);
        // The next local change still advances past everything observed.
        assert_eq!(id.sync_lamport(5).next().lamport(), 6);
    }

    #[test]
    fn checkpoint_forward_is_monotonic() {
        let a = Checkpoint::new(3, 7);
        let b = Checkpoint::new(5, 2);
        assert_eq!(a.forward(b), Checkpoint::new(5, 7));
        assert_eq!(b.forward(a), Checkpoint::new(5, 7));
        assert_eq!(a.increase_client_seq(2), Checkpoint::new(3, 9));
    }
}
