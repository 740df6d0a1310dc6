//! Channel-based service front end.
//!
//! The server thread owns the [`ThemeServer`] exclusively (moved in via
//! `thread::spawn`) — no locks anywhere on the request path. Clients
//! submit requests over one bounded crossbeam channel and block on a
//! per-request reply channel.
//!
//! A session that violates the protocol is dropped together with its
//! pending reply sender; the blocked client observes a closed channel
//! and maps it to [`ProtocolError::Disconnected`]. Other sessions are
//! untouched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use sable_arena::SharedRegion;
use sable_core::{ClientId, ProtocolError, Request, Response};

use crate::client::ClientLink;
use crate::server::ThemeServer;

/// Everything a connecting client needs: its session id and the shared
/// mapping.
pub(crate) struct ConnectInfo {
    pub client: ClientId,
    pub shared: SharedRegion,
}

pub(crate) enum ServiceMessage {
    Connect {
        reply: Sender<ConnectInfo>,
    },
    Request {
        client: ClientId,
        request: Request,
        reply: Sender<Response>,
    },
    Disconnect {
        client: ClientId,
    },
}

/// Handle to a running server thread.
///
/// Dropping the handle shuts the thread down;
/// [`ThemeService::shutdown`] does the same but hands the
/// [`ThemeServer`] back for inspection.
pub struct ThemeService {
    tx: Sender<ServiceMessage>,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<ThemeServer>>,
}

impl ThemeService {
    /// Move `server` onto its own thread and start serving.
    pub fn spawn(server: ThemeServer) -> Self {
        let capacity = server.config().request_capacity;
        let (tx, rx) = bounded(capacity);
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let join = thread::Builder::new()
            .name("sable-theme-server".to_string())
            .spawn(move || run(server, rx, flag))
            .expect("spawn theme server thread");
        Self {
            tx,
            shutdown,
            join: Some(join),
        }
    }

    /// Open a session and build the client's link: session id, request
    /// channel, and a read-only attachment to the shared region.
    pub fn connect(&self) -> Result<ClientLink, ProtocolError> {
        let (reply, confirm) = bounded(1);
        self.tx
            .send(ServiceMessage::Connect { reply })
            .map_err(|_| ProtocolError::Disconnected)?;
        let info = confirm.recv().map_err(|_| ProtocolError::Disconnected)?;
        Ok(ClientLink::new(info.client, self.tx.clone(), info.shared))
    }

    /// Stop the server thread and recover the server.
    pub fn shutdown(mut self) -> ThemeServer {
        self.shutdown.store(true, Ordering::Release);
        self.join
            .take()
            .expect("shutdown is the only consumer of the join handle")
            .join()
            .expect("theme server thread panicked")
    }
}

impl Drop for ThemeService {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Main service loop. Consumes the server and returns it at shutdown
/// so the spawner can recover it through the join handle.
fn run(
    mut server: ThemeServer,
    rx: Receiver<ServiceMessage>,
    shutdown: Arc<AtomicBool>,
) -> ThemeServer {
    loop {
        if shutdown.load(Ordering::Acquire) {
            break;
        }
        match rx.recv_timeout(Duration::from_millis(10)) {
            Ok(message) => handle_message(&mut server, message),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    // Drain what was already submitted so disconnects sent just before
    // shutdown still release their sessions' references.
    while let Ok(message) = rx.try_recv() {
        handle_message(&mut server, message);
    }
    server
}

fn handle_message(server: &mut ThemeServer, message: ServiceMessage) {
    match message {
        ServiceMessage::Connect { reply } => {
            let client = server.connect();
            let shared = server.share_region();
            // Best-effort reply — the caller may have given up.
            let _ = reply.send(ConnectInfo { client, shared });
        }
        ServiceMessage::Request {
            client,
            request,
            reply,
        } => match server.handle(client, request) {
            Ok(response) => {
                let _ = reply.send(response);
            }
            Err(_violation) => {
                // Fatal to the offending session only: drop it and its
                // reply channel. The blocked client sees the closed
                // channel; everyone else is unaffected.
                server.disconnect(client);
            }
        },
        ServiceMessage::Disconnect { client } => server.disconnect(client),
    }
}
