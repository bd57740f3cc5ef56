//! The one-shot reconciliation planner (§4.7) and the sync-mode that
//! parameterizes it (§3).

use crate::error::{Result, SyncError};
use crate::inventory::PathInventory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    ClientPriority = 0,
    ServerPriority = 1,
    ClientOverwriting = 2,
    ServerOverwriting = 3,
}

impl SyncMode {
    pub fn from_i64(value: i64) -> Result<Self> {
        match value {
            0 => Ok(SyncMode::ClientPriority),
            1 => Ok(SyncMode::ServerPriority),
            2 => Ok(SyncMode::ClientOverwriting),
            3 => Ok(SyncMode::ServerOverwriting),
            other => Err(SyncError::InvalidSyncMode(other)),
        }
    }

    pub fn as_i64(self) -> i64 {
        self as i64
    }

    /// Client-priority modes resolve a simultaneous `s`+`c` tick into `cs`
    /// (client pushes first); server-priority modes resolve it into `sc`.
    pub fn is_client_priority_family(self) -> bool {
        matches!(self, SyncMode::ClientPriority | SyncMode::ClientOverwriting)
    }
}

/// Which side of the connection is running the plan; the action matrix is
/// not symmetric because each side only ever acts from its own inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Perspective {
    Client,
    Server,
}

/// A single reconciliation action to run against one relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOp {
    SendModified(String),
    ReceiveModified(String),
    SendCreated(String),
    ReceiveCreated(String),
    CreatedFolder(String),
    Remove(String),
}

/// Builds the ordered list of actions §3's table demands for `mode` as seen
/// from `perspective`, given `inv`'s already-computed matched/local-only/
/// remote-only/remote-empty-folder sets.
pub fn plan(mode: SyncMode, perspective: Perspective, inv: &PathInventory) -> Vec<ReconcileOp> {
    let mut ops = Vec::new();

    let mut sorted = |set: &std::collections::HashSet<String>| {
        let mut v: Vec<String> = set.iter().cloned().collect();
        v.sort();
        v
    };

    match (mode, perspective) {
        (SyncMode::ServerOverwriting, Perspective::Server)
        | (SyncMode::ClientOverwriting, Perspective::Client) => {
            // The overwriting side pushes matched content and its own
            // local-only files; it never receives or deletes.
            for p in sorted(&inv.matched) {
                ops.push(ReconcileOp::SendModified(p));
            }
            for p in sorted(&inv.local_only) {
                ops.push(ReconcileOp::SendCreated(p));
            }
        }
        (SyncMode::ServerOverwriting, Perspective::Client)
        | (SyncMode::ClientOverwriting, Perspective::Server) => {
            // The overwritten side receives matched content, deletes its
            // local-only files, and receives anything it's missing.
            for p in sorted(&inv.matched) {
                ops.push(ReconcileOp::ReceiveModified(p));
            }
            for p in sorted(&inv.local_only) {
                ops.push(ReconcileOp::Remove(p));
            }
            for p in sorted(&inv.remote_empty_folders) {
                ops.push(ReconcileOp::CreatedFolder(p));
            }
            for p in sorted(&inv.remote_only) {
                ops.push(ReconcileOp::ReceiveCreated(p));
            }
        }
        (SyncMode::ServerPriority, Perspective::Server)
        | (SyncMode::ClientPriority, Perspective::Client) => {
            // The priority side pushes matched content, then fills in
            // both directions additively.
            for p in sorted(&inv.matched) {
                ops.push(ReconcileOp::SendModified(p));
            }
            for p in sorted(&inv.local_only) {
                ops.push(ReconcileOp::SendCreated(p));
            }
            for p in sorted(&inv.remote_empty_folders) {
                ops.push(ReconcileOp::CreatedFolder(p));
            }
            for p in sorted(&inv.remote_only) {
                ops.push(ReconcileOp::ReceiveCreated(p));
            }
        }
        (SyncMode::ServerPriority, Perspective::Client)
        | (SyncMode::ClientPriority, Perspective::Server) => {
            // The non-priority side receives matched content, then fills
            // in both directions additively.
            for p in sorted(&inv.matched) {
                ops.push(ReconcileOp::ReceiveModified(p));
            }
            for p in sorted(&inv.remote_only) {
                ops.push(ReconcileOp::ReceiveCreated(p));
            }
            for p in sorted(&inv.remote_empty_folders) {
                ops.push(ReconcileOp::CreatedFolder(p));
            }
            for p in sorted(&inv.local_only) {
                ops.push(ReconcileOp::SendCreated(p));
            }
        }
    }

    ops
}
