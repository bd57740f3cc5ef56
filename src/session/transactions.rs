//! The eight per-event primitives (§4.8.4) that `send_all_data` /
//! `receive_all_data` and the one-shot reconciler both dispatch into.
//!
//! Every primitive follows the source's own inventory-before-disk ordering
//! (§9 "Inventory-vs-disk race"): the just-received / inventory bookkeeping
//! happens before the filesystem operation that will make the watcher see
//! an echo of this same change, and is rolled back on I/O failure.

use super::Session;
use crate::delta::engine::{self, DeltaOutcome};
use crate::error::Result;
use crate::event::{Event, EventKind};
use crate::inventory::PathInventory;
use crate::transport::{self, FAILURE, SUCCESS};
use std::fs;
use std::io::{Read, Write};

impl<S: Read + Write> Session<S> {
    /// Receiver-only: creates an empty directory named by `event.src` and
    /// records it.
    pub fn transaction_created_folders(&mut self, event: &Event, inventory: &mut PathInventory) -> Result<()> {
        let abs = self.shared_folder.join(&event.src);
        if abs.is_dir() {
            return Ok(());
        }
        inventory.local_empty_folders.insert(event.src.clone());
        inventory.add_just_received(event.clone());
        if let Err(e) = fs::create_dir_all(&abs) {
            inventory.local_empty_folders.remove(&event.src);
            inventory.take_just_received(event);
            return Err(e.into());
        }
        Ok(())
    }

    /// Sender side of a full-file create (§4.5.5).
    pub fn transaction_send_created(&mut self, event: &Event) -> Result<()> {
        let abs = self.shared_folder.join(&event.src);
        transport::send_file(&mut self.stream, &abs)
    }

    /// Receiver side of a full-file create; rolls back on failure.
    pub fn transaction_receive_created(&mut self, event: &Event, inventory: &mut PathInventory) -> Result<()> {
        let abs = self.shared_folder.join(&event.src);
        inventory.local_rel_paths.insert(event.src.clone());
        inventory.add_just_received(event.clone());
        match transport::receive_file(&mut self.stream, &abs) {
            Ok(true) => Ok(()),
            Ok(false) => {
                inventory.local_rel_paths.remove(&event.src);
                inventory.take_just_received(event);
                Ok(())
            }
            Err(e) => {
                inventory.local_rel_paths.remove(&event.src);
                inventory.take_just_received(event);
                Err(e)
            }
        }
    }

    /// Sender side: this peer holds the newer content (the delta engine's
    /// "A"). On a failed delta round, escalates to a full resend.
    pub fn transaction_send_modified(&mut self, event: &Event) -> Result<()> {
        let abs = self.shared_folder.join(&event.src);
        let outcome = engine::run_as_a(&mut self.stream, &abs)?;
        if outcome == DeltaOutcome::Failed {
            self.transaction_send_created(event)?;
        }
        Ok(())
    }

    /// Receiver side: this peer updates its own copy (the delta engine's
    /// "U"). On a failed delta round, escalates to a full receive.
    pub fn transaction_receive_modified(&mut self, event: &Event, inventory: &mut PathInventory) -> Result<()> {
        let abs = self.shared_folder.join(&event.src);
        inventory.add_just_received(event.clone());
        let outcome = engine::run_as_u(&mut self.stream, &abs)?;
        if outcome == DeltaOutcome::Failed {
            inventory.take_just_received(event);
            self.transaction_receive_created(&Event::created(event.src.clone(), false), inventory)?;
        }
        Ok(())
    }

    /// Sender side: the move already happened on this peer's disk before
    /// the event was coalesced, so there's nothing to push proactively;
    /// just await the receiver's ack, escalating to a full send of `dest`
    /// if the receiver couldn't apply the move.
    pub fn transaction_send_move(&mut self, event: &Event) -> Result<()> {
        let ack = transport::recv_control(&mut self.stream)?;
        if ack == FAILURE {
            let dest = event.dest.clone().unwrap_or_else(|| event.src.clone());
            self.transaction_send_created(&Event::created(dest, false))?;
        }
        Ok(())
    }

    /// Receiver side: applies the move on disk and updates the inventory
    /// (removing `src`, adding `dest`, and for directories, remapping every
    /// tracked path under `src` onto the matching path under `dest`).
    pub fn transaction_receive_move(&mut self, event: &Event, inventory: &mut PathInventory) -> Result<()> {
        let dest = match &event.dest {
            Some(d) => d.clone(),
            None => return self.fail_move(event, inventory),
        };
        let src_abs = self.shared_folder.join(&event.src);
        let dest_abs = self.shared_folder.join(&dest);
        if !src_abs.exists() {
            return self.fail_move(event, inventory);
        }
        if let Some(parent) = dest_abs.parent() {
            fs::create_dir_all(parent)?;
        }

        let moved_children: Vec<String> = if event.is_dir {
            let prefix = format!("{}/", event.src);
            inventory
                .local_rel_paths
                .iter()
                .filter(|p| p.starts_with(&prefix))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        inventory.add_just_received(event.clone());
        match fs::rename(&src_abs, &dest_abs) {
            Ok(()) => {
                if event.is_dir {
                    let prefix_len = event.src.len() + 1;
                    for child in moved_children {
                        inventory.local_rel_paths.remove(&child);
                        inventory
                            .local_rel_paths
                            .insert(format!("{dest}/{}", &child[prefix_len..]));
                    }
                } else {
                    inventory.local_rel_paths.remove(&event.src);
                    inventory.local_rel_paths.insert(dest);
                }
                transport::send_control(&mut self.stream, SUCCESS)?;
                Ok(())
            }
            Err(e) => {
                inventory.take_just_received(event);
                self.fail_move(event, inventory)?;
                Err(e.into())
            }
        }
    }

    fn fail_move(&mut self, event: &Event, inventory: &mut PathInventory) -> Result<()> {
        transport::send_control(&mut self.stream, FAILURE)?;
        let fallback_dest = event.dest.clone().unwrap_or_else(|| event.src.clone());
        self.transaction_receive_created(&Event::created(fallback_dest, false), inventory)
    }

    /// Receiver-only: deletes the file or directory tree named by `event.src`.
    pub fn transaction_remove(&mut self, event: &Event, inventory: &mut PathInventory) -> Result<()> {
        let abs = self.shared_folder.join(&event.src);
        inventory.add_just_received(event.clone());
        let result = if abs.is_dir() {
            fs::remove_dir_all(&abs)
        } else if abs.exists() {
            fs::remove_file(&abs)
        } else {
            Ok(())
        };
        match result {
            Ok(()) => {
                inventory.local_rel_paths.remove(&event.src);
                inventory.local_empty_folders.remove(&event.src);
                Ok(())
            }
            Err(e) => {
                inventory.take_just_received(event);
                Err(e.into())
            }
        }
    }
}
