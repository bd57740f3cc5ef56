//! A connected peer's session: the handshake (§4.8.1), the one-shot
//! reconciliation it feeds into (§4.7), and the steady-state tick loop
//! (§4.8.2) that keeps running until the peer disconnects.
//!
//! `Session` is generic over the byte stream so the handshake and tick
//! logic can be exercised against an in-process socket pair in tests
//! without a real `TcpStream`.

pub mod transactions;

use crate::error::{Result, SyncError};
use crate::event::Event;
use crate::inventory::PathInventory;
use crate::reconciler::{self, Perspective, ReconcileOp, SyncMode};
use crate::transport::{self, FAILURE, SUCCESS};
use crate::wire;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Single-letter intent tokens exchanged every tick (§4.8.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Empty,
    Server,
    Client,
    ServerThenClient,
    ClientThenServer,
    Exit,
}

impl Intent {
    fn as_str(self) -> &'static str {
        match self {
            Intent::Empty => "e",
            Intent::Server => "s",
            Intent::Client => "c",
            Intent::ServerThenClient => "sc",
            Intent::ClientThenServer => "cs",
            Intent::Exit => "x",
        }
    }

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "e" => Ok(Intent::Empty),
            "s" => Ok(Intent::Server),
            "c" => Ok(Intent::Client),
            "sc" => Ok(Intent::ServerThenClient),
            "cs" => Ok(Intent::ClientThenServer),
            "x" => Ok(Intent::Exit),
            other => Err(SyncError::Protocol(format!("unknown intent token {other:?}"))),
        }
    }
}

/// A connected peer, past the handshake, mid tick-loop.
pub struct Session<S: Read + Write> {
    pub stream: S,
    pub shared_folder: PathBuf,
    pub mode: SyncMode,
    pub perspective: Perspective,
}

/// Result of the handshake (§4.8.1): the negotiated mode and the inventory
/// with both sides' listings already populated and matched.
pub struct Handshake {
    pub mode: SyncMode,
    pub inventory: PathInventory,
}

/// Runs the listing exchange. The server side must already know `mode`
/// (from its own configuration); the client learns it from the wire.
pub fn handshake<S: Read + Write>(
    stream: &mut S,
    shared_folder: &Path,
    perspective: Perspective,
    server_mode: Option<SyncMode>,
) -> Result<Handshake> {
    let mut inventory = PathInventory::new(shared_folder)?;

    let mode = match perspective {
        Perspective::Server => {
            let mode = server_mode.expect("server perspective requires a configured sync mode");
            transport::send_control(stream, &mode.as_i64().to_string())?;
            exchange_listing_server_first(stream, &mut inventory)?;
            mode
        }
        Perspective::Client => {
            let mode_token = transport::recv_control(stream)?;
            let mode = SyncMode::from_i64(
                mode_token
                    .trim()
                    .parse()
                    .map_err(|_| SyncError::Protocol(format!("invalid sync mode on wire: {mode_token:?}")))?,
            )?;
            exchange_listing_client_second(stream, &mut inventory)?;
            mode
        }
    };

    inventory.calc_matched_files();
    Ok(Handshake { mode, inventory })
}

fn exchange_listing_server_first<S: Read + Write>(
    stream: &mut S,
    inventory: &mut PathInventory,
) -> Result<()> {
    send_path_set(stream, &inventory.local_rel_paths)?;
    inventory.remote_rel_paths = recv_path_set(stream)?;
    send_path_set(stream, &inventory.local_empty_folders)?;
    inventory.remote_empty_folders = recv_path_set(stream)?;
    Ok(())
}

fn exchange_listing_client_second<S: Read + Write>(
    stream: &mut S,
    inventory: &mut PathInventory,
) -> Result<()> {
    inventory.remote_rel_paths = recv_path_set(stream)?;
    send_path_set(stream, &inventory.local_rel_paths)?;
    inventory.remote_empty_folders = recv_path_set(stream)?;
    send_path_set(stream, &inventory.local_empty_folders)?;
    Ok(())
}

fn send_path_set<S: Read + Write>(stream: &mut S, paths: &std::collections::HashSet<String>) -> Result<()> {
    let list: Vec<String> = paths.iter().cloned().collect();
    transport::send_blob(stream, &wire::encode_path_list(&list))
}

fn recv_path_set<S: Read + Write>(stream: &mut S) -> Result<std::collections::HashSet<String>> {
    let blob = transport::recv_blob(stream)?;
    Ok(wire::decode_path_list(&blob)?.into_iter().collect())
}

impl<S: Read + Write> Session<S> {
    pub fn new(stream: S, shared_folder: PathBuf, mode: SyncMode, perspective: Perspective) -> Self {
        Self {
            stream,
            shared_folder,
            mode,
            perspective,
        }
    }

    /// Runs the one-shot reconciliation (§4.7) immediately after the
    /// handshake, dispatching each planned action through the same
    /// transaction primitives the steady state uses.
    pub fn run_reconciliation(&mut self, inventory: &mut PathInventory) -> Result<()> {
        let ops = reconciler::plan(self.mode, self.perspective, inventory);
        for op in ops {
            self.dispatch_reconcile_op(op, inventory)?;
        }
        inventory.clear_just_received();
        Ok(())
    }

    fn dispatch_reconcile_op(&mut self, op: ReconcileOp, inventory: &mut PathInventory) -> Result<()> {
        match op {
            ReconcileOp::SendModified(path) => {
                self.transaction_send_modified(&Event::new(path, None, false, crate::event::EventKind::Modified))
            }
            ReconcileOp::ReceiveModified(path) => self.transaction_receive_modified(
                &Event::new(path, None, false, crate::event::EventKind::Modified),
                inventory,
            ),
            ReconcileOp::SendCreated(path) => {
                self.transaction_send_created(&Event::created(path, false))
            }
            ReconcileOp::ReceiveCreated(path) => {
                self.transaction_receive_created(&Event::created(path, false), inventory)
            }
            ReconcileOp::CreatedFolder(path) => {
                self.transaction_created_folders(&Event::created(path, true), inventory)
            }
            ReconcileOp::Remove(path) => {
                self.transaction_remove(&Event::deleted(path, false), inventory)
            }
        }
    }

    /// One steady-state tick (§4.8.2): exchanges intent, symmetrically, then
    /// performs whichever sync round the combined intent demands.
    ///
    /// `local_events` is the coalescer's output for this tick, already
    /// computed by the caller (empty if the debounce indicator hasn't fired
    /// or nothing changed). Returns `false` once the peer signals exit.
    pub fn tick(&mut self, local_events: &[Event], inventory: &mut PathInventory) -> Result<bool> {
        let have_local_work = !local_events.is_empty();
        let my_intent = match self.perspective {
            Perspective::Server => {
                if have_local_work {
                    Intent::Server
                } else {
                    Intent::Empty
                }
            }
            Perspective::Client => {
                if have_local_work {
                    Intent::Client
                } else {
                    Intent::Empty
                }
            }
        };

        transport::send_control(&mut self.stream, my_intent.as_str())?;
        let peer_token = transport::recv_control(&mut self.stream)?;
        if peer_token.is_empty() {
            return Err(SyncError::ConnectionClosed);
        }
        let peer_intent = Intent::from_str(&peer_token)?;

        let combined = combine_intents(my_intent, peer_intent, self.mode);

        match combined {
            Intent::Empty => {}
            Intent::Exit => return Ok(false),
            Intent::Server => match self.perspective {
                Perspective::Server => self.send_all_data(local_events, inventory)?,
                Perspective::Client => self.receive_all_data(inventory)?,
            },
            Intent::Client => match self.perspective {
                Perspective::Client => self.send_all_data(local_events, inventory)?,
                Perspective::Server => self.receive_all_data(inventory)?,
            },
            Intent::ServerThenClient => match self.perspective {
                Perspective::Server => {
                    self.send_all_data(local_events, inventory)?;
                    self.receive_all_data(inventory)?;
                }
                Perspective::Client => {
                    self.receive_all_data(inventory)?;
                    self.send_all_data(local_events, inventory)?;
                }
            },
            Intent::ClientThenServer => match self.perspective {
                Perspective::Client => {
                    self.send_all_data(local_events, inventory)?;
                    self.receive_all_data(inventory)?;
                }
                Perspective::Server => {
                    self.receive_all_data(inventory)?;
                    self.send_all_data(local_events, inventory)?;
                }
            },
        }

        inventory.clear_just_received();
        Ok(true)
    }

    /// §4.8.3, sender side.
    pub fn send_all_data(&mut self, events: &[Event], inventory: &mut PathInventory) -> Result<()> {
        if events.is_empty() {
            transport::send_control(&mut self.stream, FAILURE)?;
            return Ok(());
        }
        transport::send_control(&mut self.stream, SUCCESS)?;
        transport::recv_control(&mut self.stream)?;
        transport::send_blob(&mut self.stream, &wire::encode_event_list(events))?;

        for event in events {
            match event.kind {
                crate::event::EventKind::Created => {
                    if !event.is_dir {
                        self.transaction_send_created(event)?;
                    }
                }
                crate::event::EventKind::Moved => self.transaction_send_move(event)?,
                crate::event::EventKind::Modified => self.transaction_send_modified(event)?,
                crate::event::EventKind::Deleted => {}
            }
        }
        inventory.clear_just_received();
        Ok(())
    }

    /// §4.8.3, receiver side.
    pub fn receive_all_data(&mut self, inventory: &mut PathInventory) -> Result<()> {
        inventory.clear_just_received();
        let status = transport::recv_control(&mut self.stream)?;
        if status != SUCCESS {
            return Ok(());
        }
        transport::send_control(&mut self.stream, SUCCESS)?;
        let blob = transport::recv_blob(&mut self.stream)?;
        let events = wire::decode_event_list(&blob)?;

        for event in &events {
            match event.kind {
                crate::event::EventKind::Created => {
                    if event.is_dir {
                        self.transaction_created_folders(event, inventory)?;
                    } else {
                        self.transaction_receive_created(event, inventory)?;
                    }
                }
                crate::event::EventKind::Moved => self.transaction_receive_move(event, inventory)?,
                crate::event::EventKind::Modified => {
                    self.transaction_receive_modified(event, inventory)?
                }
                crate::event::EventKind::Deleted => self.transaction_remove(event, inventory)?,
            }
        }
        Ok(())
    }
}

/// Derives the combined round intent from each side's locally-computed
/// token (§11 OQ-3): a lone `s`/`c` stands on its own, but a simultaneous
/// `s`+`c` collapses into `sc` or `cs` depending on which family `mode`
/// belongs to.
fn combine_intents(mine: Intent, peer: Intent, mode: SyncMode) -> Intent {
    let (server_side, client_side) = match (mine, peer) {
        (a, b) if a == Intent::Exit || b == Intent::Exit => return Intent::Exit,
        _ => (mine, peer),
    };
    let has_server = matches!(server_side, Intent::Server) || matches!(client_side, Intent::Server);
    let has_client = matches!(server_side, Intent::Client) || matches!(client_side, Intent::Client);

    match (has_server, has_client) {
        (true, true) => {
            if mode.is_client_priority_family() {
                Intent::ClientThenServer
            } else {
                Intent::ServerThenClient
            }
        }
        (true, false) => Intent::Server,
        (false, true) => Intent::Client,
        (false, false) => Intent::Empty,
    }
}
