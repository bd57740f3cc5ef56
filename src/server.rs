//! Server entry point (§5, §6): one accept thread on the listening socket,
//! one session thread per accepted connection, mirroring the source's
//! `ServerConn`/listener split.

use crate::config::ServerArgs;
use crate::coalescer;
use crate::error::SyncError;
use crate::reconciler::Perspective;
use crate::session::{self, Session};
use crate::watcher::Watcher;
use anyhow::Context;
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::{error, info, info_span};

pub fn run(args: ServerArgs) -> anyhow::Result<()> {
    let mode = args.sync_mode();
    let listener = TcpListener::bind(("0.0.0.0", args.port))
        .with_context(|| format!("failed to bind port {}", args.port))?;
    info!(port = args.port, mode = ?mode, shared_folder = %args.shared_folder.display(), "server listening");

    for incoming in listener.incoming() {
        let stream = match incoming {
            Ok(stream) => stream,
            Err(e) => {
                error!(error = %e, "failed to accept connection");
                continue;
            }
        };
        let shared_folder = args.shared_folder.clone();
        thread::spawn(move || {
            let peer = stream.peer_addr().ok();
            let span = info_span!("session", ?peer);
            let _enter = span.enter();
            if let Err(e) = run_session(stream, shared_folder, mode) {
                error!(error = %e, "session ended with an error");
            }
        });
    }
    Ok(())
}

fn run_session(mut stream: TcpStream, shared_folder: PathBuf, mode: crate::reconciler::SyncMode) -> anyhow::Result<()> {
    info!("connection accepted");
    let handshake = session::handshake(&mut stream, &shared_folder, Perspective::Server, Some(mode))
        .context("handshake failed")?;
    let mut inventory = handshake.inventory;
    let mut sess = Session::new(stream, shared_folder.clone(), handshake.mode, Perspective::Server);

    sess.run_reconciliation(&mut inventory)
        .context("one-shot reconciliation failed")?;
    info!("reconciliation complete, entering steady state");

    let watcher = Watcher::spawn(&shared_folder).context("failed to start filesystem watcher")?;
    loop {
        thread::sleep(Duration::from_secs(1));
        let local_events = if watcher.is_ready() {
            coalescer::coalesce(watcher.drain_snapshot(), &mut inventory)
        } else {
            Vec::new()
        };
        match sess.tick(&local_events, &mut inventory) {
            Ok(true) => {}
            Ok(false) => break,
            Err(SyncError::ConnectionClosed) => break,
            Err(e) => {
                watcher.shutdown();
                return Err(e.into());
            }
        }
    }
    watcher.shutdown();
    info!("session closed");
    Ok(())
}
