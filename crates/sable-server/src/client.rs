//! Client-side session link.
//!
//! A [`ClientLink`] is one process's session with the theme server:
//! the request channel, the session id, and the process's own
//! [`RegionMap`] built around a read-only attachment to the server's
//! shared chunk. Requests are synchronous — send, then block on the
//! reply.
//!
//! Dropping the link disconnects: the server releases every reference
//! the session owns, whether or not the client ever sent an unload.

use crossbeam_channel::{bounded, Sender};
use smallvec::SmallVec;

use sable_arena::{ArenaError, ChunkConfig, RegionMap, SharedRegion};
use sable_core::{
    ClientId, ProtocolError, Request, Response, SharedPayload, TableRef, MAX_INDEX_TABLES,
};
use sable_index::TableSource;

use crate::service::ServiceMessage;

/// Default size of a client's process-private chunk: 1 MiB.
pub const DEFAULT_CLIENT_LOCAL_SIZE: u32 = 1024 * 1024;

/// One client process's session with the theme server.
pub struct ClientLink {
    client: ClientId,
    tx: Sender<ServiceMessage>,
    ctx: RegionMap,
}

impl ClientLink {
    pub(crate) fn new(client: ClientId, tx: Sender<ServiceMessage>, shared: SharedRegion) -> Self {
        let ctx = RegionMap::client(shared, &ChunkConfig::with_size(DEFAULT_CLIENT_LOCAL_SIZE));
        Self { client, tx, ctx }
    }

    /// This session's id.
    pub fn client_id(&self) -> ClientId {
        self.client
    }

    /// The process's region map: the shared attachment plus local
    /// storage for detached copies and process-local loads.
    pub fn ctx(&self) -> &RegionMap {
        &self.ctx
    }

    /// Issue one synchronous request.
    ///
    /// [`ProtocolError::Disconnected`] means the server is gone or this
    /// session was terminated after a violation.
    pub fn request(&self, request: Request) -> Result<Response, ProtocolError> {
        let (reply, response) = bounded(1);
        self.tx
            .send(ServiceMessage::Request {
                client: self.client,
                request,
                reply,
            })
            .map_err(|_| ProtocolError::Disconnected)?;
        response.recv().map_err(|_| ProtocolError::Disconnected)
    }

    /// Copy a raw payload's bytes out of the shared region.
    ///
    /// For `StyleRules` payloads use
    /// [`read_style_rules`](crate::style::read_style_rules) — their
    /// reference designates a span vector, not a flat blob.
    pub fn payload_bytes(&self, payload: &SharedPayload) -> Result<Vec<u8>, ArenaError> {
        let region = payload.data.region();
        let offset = payload
            .data
            .offset()
            .ok_or(ArenaError::NullRef { region })?;
        self.ctx.read_bytes(region, offset, payload.len)
    }

    /// Disconnect explicitly. Equivalent to dropping the link.
    pub fn disconnect(self) {}
}

impl TableSource for ClientLink {
    fn fetch_tables(&mut self) -> SmallVec<[TableRef; MAX_INDEX_TABLES]> {
        match self.request(Request::ThemeIndexLookup) {
            Ok(Response::IndexTables(tables)) => tables,
            _ => SmallVec::new(),
        }
    }
}

impl Drop for ClientLink {
    fn drop(&mut self) {
        // Best-effort: the server may already be gone.
        let _ = self.tx.send(ServiceMessage::Disconnect {
            client: self.client,
        });
    }
}
