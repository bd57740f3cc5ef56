//! Client entry point (§5, §6): connects to a running server, then runs the
//! same handshake/reconciliation/steady-state sequence as the server side,
//! from the client's `Perspective`.

use crate::coalescer;
use crate::config::ClientArgs;
use crate::error::SyncError;
use crate::reconciler::Perspective;
use crate::session::{self, Session};
use crate::watcher::Watcher;
use anyhow::Context;
use std::net::TcpStream;
use std::thread;
use std::time::Duration;
use tracing::info;

pub fn run(args: ClientArgs) -> anyhow::Result<()> {
    let mut stream = TcpStream::connect((args.ip.as_str(), args.port))
        .with_context(|| format!("failed to connect to {}:{}", args.ip, args.port))?;
    info!(server = %args.ip, port = args.port, shared_folder = %args.shared_folder.display(), "connected");

    let handshake = session::handshake(&mut stream, &args.shared_folder, Perspective::Client, None)
        .context("handshake failed")?;
    let mut inventory = handshake.inventory;
    let mut sess = Session::new(stream, args.shared_folder.clone(), handshake.mode, Perspective::Client);

    sess.run_reconciliation(&mut inventory)
        .context("one-shot reconciliation failed")?;
    info!(mode = ?handshake.mode, "reconciliation complete, entering steady state");

    let watcher = Watcher::spawn(&args.shared_folder).context("failed to start filesystem watcher")?;
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
