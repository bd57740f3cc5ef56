//! Event coalescer (§4.6): turns a batch of raw watcher events into a
//! deduplicated, classified, inventory-updating event list.

use crate::event::{Event, EventKind};
use crate::inventory::PathInventory;
use std::collections::HashSet;

/// Classifies and deduplicates a batch of raw events already drained from
/// the watcher queue (§4.9 owns the draining itself), then applies the
/// inventory-mutating side effects and returns the event list ready for
/// §4.8's sync round.
pub fn coalesce(raw_events: Vec<Event>, inv: &mut PathInventory) -> Vec<Event> {
    let classified = classify(raw_events, &inv.local_rel_paths);
    apply_and_emit(classified, inv)
}

/// First pass: builds the classification map, in encounter order, with
/// last-write-wins semantics per key (a key re-occurring keeps its original
/// position, matching the source's use of an insertion-ordered dict).
fn classify(raw_events: Vec<Event>, local_rel_paths: &HashSet<String>) -> Vec<Event> {
    let mut seen: HashSet<Event> = HashSet::new();
    let mut order: Vec<Event> = Vec::new();
    let mut insert = |key: Event, seen: &mut HashSet<Event>, order: &mut Vec<Event>| {
        if seen.insert(key.clone()) {
            order.push(key);
        }
    };

    for raw in raw_events {
        match raw.kind {
            EventKind::Created | EventKind::Deleted => {
                let key = Event::new(raw.src.clone(), None, raw.is_dir, raw.kind);
                insert(key, &mut seen, &mut order);
            }
            EventKind::Modified => {
                let key = Event::new(raw.src.clone(), raw.dest.clone(), raw.is_dir, EventKind::Modified);
                insert(key, &mut seen, &mut order);
            }
            EventKind::Moved => {
                let src_is_local = local_rel_paths.contains(&raw.src);
                let dest_is_local = raw
                    .dest
                    .as_ref()
                    .map(|d| local_rel_paths.contains(d))
                    .unwrap_or(false);

                if !src_is_local && dest_is_local {
                    // An atomic temp-file rename into place: hide the move,
                    // report it as a modification of the final name.
                    let dest = raw.dest.clone().unwrap();
                    let key = Event::new(dest, None, raw.is_dir, EventKind::Modified);
                    insert(key, &mut seen, &mut order);
                } else {
                    let key = Event::new(raw.src.clone(), raw.dest.clone(), raw.is_dir, EventKind::Moved);
                    insert(key, &mut seen, &mut order);

                    if let Some(dest) = &raw.dest {
                        let prior_modified =
                            Event::new(raw.src.clone(), None, raw.is_dir, EventKind::Modified);
                        if seen.contains(&prior_modified) {
                            let carried = Event::new(dest.clone(), None, raw.is_dir, EventKind::Modified);
                            insert(carried, &mut seen, &mut order);
                        }
                    }
                }
            }
        }
    }

    order
}

/// Second pass: drops events already in the just-received suppression set,
/// otherwise updates the inventory and emits the event.
fn apply_and_emit(classified: Vec<Event>, inv: &mut PathInventory) -> Vec<Event> {
    let mut out = Vec::with_capacity(classified.len());
    for ev in classified {
        if inv.take_just_received(&ev) {
            continue;
        }
        match ev.kind {
            EventKind::Created => {
                inv.local_rel_paths.insert(ev.src.clone());
            }
            EventKind::Deleted => {
                inv.local_rel_paths.remove(&ev.src);
            }
            EventKind::Moved => {
                inv.local_rel_paths.remove(&ev.src);
                if let Some(dest) = &ev.dest {
                    inv.local_rel_paths.insert(dest.clone());
                }
            }
            EventKind::Modified => {
                if ev.dest.is_some() {
                    inv.local_rel_paths.remove(&ev.src);
                }
            }
        }
        out.push(ev);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn empty_inventory() -> PathInventory {
        let dir = TempDir::new().unwrap();
        PathInventory::new(dir.path()).unwrap()
    }

    #[test]
    fn duplicate_created_events_collapse_to_one() {
        let mut inv = empty_inventory();
        let raw = vec![
            Event::created("a.txt", false),
            Event::created("a.txt", false),
        ];
        let out = coalesce(raw, &mut inv);
        assert_eq!(out.len(), 1);
        assert!(inv.local_rel_paths.contains("a.txt"));
    }

    #[test]
    fn moved_reclassifies_as_modified_when_src_is_unknown_and_dest_is_local() {
        let mut inv = empty_inventory();
        inv.local_rel_paths.insert("final.txt".to_string());
        let raw = vec![Event::new(
            "final.txt.tmp",
            Some("final.txt".to_string()),
            false,
            EventKind::Moved,
        )];
        let out = coalesce(raw, &mut inv);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, EventKind::Modified);
        assert_eq!(out[0].src, "final.txt");
        assert_eq!(out[0].dest, None);
    }

    #[test]
    fn genuine_move_updates_inventory_and_emits_moved() {
        let mut inv = empty_inventory();
        inv.local_rel_paths.insert("a.txt".to_string());
        let raw = vec![Event::new(
            "a.txt",
            Some("sub/a.txt".to_string()),
            false,
            EventKind::Moved,
        )];
        let out = coalesce(raw, &mut inv);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, EventKind::Moved);
        assert!(!inv.local_rel_paths.contains("a.txt"));
        assert!(inv.local_rel_paths.contains("sub/a.txt"));
    }

    #[test]
    fn modified_then_moved_carries_modified_forward_onto_dest() {
        let mut inv = empty_inventory();
        inv.local_rel_paths.insert("a.txt".to_string());
        let raw = vec![
            Event::new("a.txt", None, false, EventKind::Modified),
            Event::new("a.txt", Some("b.txt".to_string()), false, EventKind::Moved),
        ];
        let out = coalesce(raw, &mut inv);
        assert!(out.iter().any(|e| e.kind == EventKind::Moved && e.src == "a.txt"));
        assert!(out
            .iter()
            .any(|e| e.kind == EventKind::Modified && e.src == "b.txt" && e.dest.is_none()));
    }

    #[test]
    fn just_received_suppresses_the_echo_exactly_once() {
        let mut inv = empty_inventory();
        let ev = Event::created("a.txt", false);
        inv.add_just_received(ev.clone());
        let out = coalesce(vec![ev.clone()], &mut inv);
        assert!(out.is_empty());

        // A second, identical event on the next tick is no longer suppressed.
        let out2 = coalesce(vec![ev], &mut inv);
        assert_eq!(out2.len(), 1);
    }

    #[test]
    fn deleted_event_removes_path_from_inventory() {
        let mut inv = empty_inventory();
        inv.local_rel_paths.insert("gone.txt".to_string());
        let out = coalesce(vec![Event::deleted("gone.txt", false)], &mut inv);
        assert_eq!(out.len(), 1);
        assert!(!inv.local_rel_paths.contains("gone.txt"));
    }
}
