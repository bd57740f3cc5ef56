//! End-to-end scenarios over real sockets (§8 S1-S6): a server-side and a
//! client-side `Session` talking across an ephemeral-port `TcpListener`,
//! each on its own thread, exactly as two real peers would.

use foldersync::event::Event;
use foldersync::inventory::PathInventory;
use foldersync::reconciler::{Perspective, SyncMode};
use foldersync::session::{self, Session};
use std::fs;
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::thread;
use tempfile::TempDir;

/// Runs a handshake + one-shot reconciliation for both sides concurrently,
/// returning each side's final `PathInventory`.
fn reconcile(server_dir: &Path, client_dir: &Path, mode: SyncMode) -> (PathInventory, PathInventory) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client_dir = client_dir.to_path_buf();

    let client_thread = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        let handshake = session::handshake(&mut stream, &client_dir, Perspective::Client, None).unwrap();
        let mut inventory = handshake.inventory;
        let mut sess = Session::new(stream, client_dir.clone(), handshake.mode, Perspective::Client);
        sess.run_reconciliation(&mut inventory).unwrap();
        inventory
    });

    let (mut server_stream, _) = listener.accept().unwrap();
    let handshake =
        session::handshake(&mut server_stream, server_dir, Perspective::Server, Some(mode)).unwrap();
    let mut server_inventory = handshake.inventory;
    let mut server_sess = Session::new(
        server_stream,
        server_dir.to_path_buf(),
        handshake.mode,
        Perspective::Server,
    );
    server_sess.run_reconciliation(&mut server_inventory).unwrap();

    let client_inventory = client_thread.join().unwrap();
    (server_inventory, client_inventory)
}

#[test]
fn s1_server_priority_pulls_a_client_only_file() {
    let server_dir = TempDir::new().unwrap();
    let client_dir = TempDir::new().unwrap();
    fs::write(client_dir.path().join("a.txt"), b"hello").unwrap();

    reconcile(server_dir.path(), client_dir.path(), SyncMode::ServerPriority);

    assert_eq!(fs::read(server_dir.path().join("a.txt")).unwrap(), b"hello");
    assert_eq!(fs::read(client_dir.path().join("a.txt")).unwrap(), b"hello");
}

#[test]
fn s2_client_priority_resolves_a_conflicting_file_via_delta() {
    let server_dir = TempDir::new().unwrap();
    let client_dir = TempDir::new().unwrap();
    fs::write(server_dir.path().join("a.txt"), b"HELLO, WORLD!").unwrap();
    fs::write(client_dir.path().join("a.txt"), b"HELLO WORLD").unwrap();

    reconcile(server_dir.path(), client_dir.path(), SyncMode::ClientPriority);

    assert_eq!(fs::read(server_dir.path().join("a.txt")).unwrap(), b"HELLO WORLD");
    assert_eq!(fs::read(client_dir.path().join("a.txt")).unwrap(), b"HELLO WORLD");
}

#[test]
fn s3_identical_files_require_no_literal_bytes() {
    let server_dir = TempDir::new().unwrap();
    let client_dir = TempDir::new().unwrap();
    fs::write(server_dir.path().join("a.txt"), b"same").unwrap();
    fs::write(client_dir.path().join("a.txt"), b"same").unwrap();

    let (server_inv, client_inv) = reconcile(server_dir.path(), client_dir.path(), SyncMode::ClientPriority);

    assert!(server_inv.matched.contains("a.txt"));
    assert!(client_inv.local_rel_paths.contains("a.txt"));
    assert_eq!(fs::read(server_dir.path().join("a.txt")).unwrap(), b"same");
}

#[test]
fn s4_server_overwriting_deletes_a_client_only_file() {
    let server_dir = TempDir::new().unwrap();
    let client_dir = TempDir::new().unwrap();
    fs::write(client_dir.path().join("extra.log"), b"junk").unwrap();

    reconcile(server_dir.path(), client_dir.path(), SyncMode::ServerOverwriting);

    assert!(!client_dir.path().join("extra.log").exists());
    assert!(!server_dir.path().join("extra.log").exists());
}

#[test]
fn idempotent_round_on_identical_folders_changes_nothing() {
    let server_dir = TempDir::new().unwrap();
    let client_dir = TempDir::new().unwrap();
    fs::write(server_dir.path().join("a.txt"), b"same").unwrap();
    fs::write(client_dir.path().join("a.txt"), b"same").unwrap();

    reconcile(server_dir.path(), client_dir.path(), SyncMode::ClientPriority);

    assert_eq!(fs::read(server_dir.path().join("a.txt")).unwrap(), b"same");
    assert_eq!(fs::read(client_dir.path().join("a.txt")).unwrap(), b"same");
}

#[test]
fn s5_steady_state_tick_pushes_a_newly_created_client_file_to_the_server() {
    let server_dir = TempDir::new().unwrap();
    let client_dir = TempDir::new().unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client_path = client_dir.path().to_path_buf();

    let client_thread = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        let handshake = session::handshake(&mut stream, &client_path, Perspective::Client, None).unwrap();
        let mut inventory = handshake.inventory;
        let mut sess = Session::new(stream, client_path.clone(), handshake.mode, Perspective::Client);
        sess.run_reconciliation(&mut inventory).unwrap();

        fs::write(client_path.join("b.txt"), b"xyz").unwrap();
        let events = vec![Event::created("b.txt", false)];
        inventory.local_rel_paths.insert("b.txt".to_string());
        sess.tick(&events, &mut inventory).unwrap();
    });

    let (mut server_stream, _) = listener.accept().unwrap();
    let handshake = session::handshake(
        &mut server_stream,
        server_dir.path(),
        Perspective::Server,
        Some(SyncMode::ClientPriority),
    )
    .unwrap();
    let mut server_inventory = handshake.inventory;
    let mut server_sess = Session::new(
        server_stream,
        server_dir.path().to_path_buf(),
        handshake.mode,
        Perspective::Server,
    );
    server_sess.run_reconciliation(&mut server_inventory).unwrap();
    server_sess.tick(&[], &mut server_inventory).unwrap();

    client_thread.join().unwrap();

    assert_eq!(fs::read(server_dir.path().join("b.txt")).unwrap(), b"xyz");
    assert!(server_inventory.local_rel_paths.contains("b.txt"));
}

#[test]
fn s6_steady_state_tick_propagates_a_file_move_into_a_new_subdirectory() {
    let server_dir = TempDir::new().unwrap();
    let client_dir = TempDir::new().unwrap();
    fs::write(server_dir.path().join("a.txt"), b"hi").unwrap();
    fs::write(client_dir.path().join("a.txt"), b"hi").unwrap();

    let server_inventory = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client_path = client_dir.path().to_path_buf();

        let client_thread = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            let handshake = session::handshake(&mut stream, &client_path, Perspective::Client, None).unwrap();
            let mut inventory = handshake.inventory;
            let mut sess = Session::new(stream, client_path.clone(), handshake.mode, Perspective::Client);
            sess.run_reconciliation(&mut inventory).unwrap();

            fs::create_dir_all(client_path.join("sub")).unwrap();
            fs::rename(client_path.join("a.txt"), client_path.join("sub/a.txt")).unwrap();
            inventory.local_rel_paths.remove("a.txt");
            inventory.local_rel_paths.insert("sub/a.txt".to_string());
            let events = vec![Event::new("a.txt", Some("sub/a.txt".to_string()), false, foldersync::event::EventKind::Moved)];
            sess.tick(&events, &mut inventory).unwrap();
        });

        let (mut server_stream, _) = listener.accept().unwrap();
        let handshake = session::handshake(
            &mut server_stream,
            server_dir.path(),
            Perspective::Server,
            Some(SyncMode::ClientPriority),
        )
        .unwrap();
        let mut server_inventory = handshake.inventory;
        let mut server_sess = Session::new(
            server_stream,
            server_dir.path().to_path_buf(),
            handshake.mode,
            Perspective::Server,
        );
        server_sess.run_reconciliation(&mut server_inventory).unwrap();
        server_sess.tick(&[], &mut server_inventory).unwrap();

        client_thread.join().unwrap();
        server_inventory
    };

    assert!(server_dir.path().join("sub/a.txt").exists());
    assert!(!server_dir.path().join("a.txt").exists());
    assert!(!server_inventory.local_rel_paths.contains("a.txt"));
    assert!(server_inventory.local_rel_paths.contains("sub/a.txt"));
}
