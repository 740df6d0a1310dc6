//! The theme server state machine.
//!
//! One instance owns the writable region map, both resource caches,
//! the active index table chain and the session table. Requests are
//! handled to completion, one at a time, so no lock guards any of this
//! state — the service front end (`service.rs`) enforces the
//! single-thread discipline by owning the server on its thread.

use indexmap::IndexMap;
use smallvec::SmallVec;

use sable_arena::{ArenaError, RegionMap, SharedRegion};
use sable_cache::{CacheError, ResourceCache};
use sable_core::{
    ClientId, IconKey, IconOptions, IconSize, MultiPartGeometry, OffsetRef, PayloadFormat,
    ProtocolError, Region, Request, Response, SharedPayload, StyleKey, TableRef,
    MAX_INDEX_TABLES,
};
use sable_index::{IndexBuilder, IndexItem, ThemeIndex};

use crate::config::ServerConfig;
use crate::loader::{DecodedIcon, FlatDecoder, IconDecoder, ResourceStore};
use crate::metrics::ServerMetrics;
use crate::session::Session;
use crate::style::{build_style_payload, free_style_payload};

/// The out-of-process theme resource server.
pub struct ThemeServer {
    config: ServerConfig,
    ctx: RegionMap,
    store: ResourceStore,
    decoder: Box<dyn IconDecoder>,
    icon_cache: ResourceCache<IconKey>,
    style_cache: ResourceCache<StyleKey>,
    theme: String,
    tables: SmallVec<[TableRef; MAX_INDEX_TABLES]>,
    sessions: IndexMap<ClientId, Session>,
    next_client: u64,
    metrics: ServerMetrics,
}

impl ThemeServer {
    /// A server with the built-in [`FlatDecoder`].
    pub fn new(config: ServerConfig, store: ResourceStore) -> Result<Self, ArenaError> {
        Self::with_decoder(config, store, Box::new(FlatDecoder))
    }

    /// A server with a custom icon decoder.
    pub fn with_decoder(
        config: ServerConfig,
        store: ResourceStore,
        decoder: Box<dyn IconDecoder>,
    ) -> Result<Self, ArenaError> {
        let ctx = RegionMap::server(&config.shared, &config.local);
        let theme = config.default_theme.clone();
        let tables = build_index_tables(&ctx, &store, &theme)?;
        Ok(Self {
            icon_cache: ResourceCache::new(config.icon_cache.clone()),
            style_cache: ResourceCache::new(config.style_cache.clone()),
            config,
            ctx,
            store,
            decoder,
            theme,
            tables,
            sessions: IndexMap::new(),
            next_client: 0,
            metrics: ServerMetrics::default(),
        })
    }

    /// Open a session for a connecting client.
    pub fn connect(&mut self) -> ClientId {
        self.next_client += 1;
        let id = ClientId(self.next_client);
        self.sessions.insert(id, Session::new());
        self.metrics.sessions_opened += 1;
        id
    }

    /// Close a session, releasing every reference it owns exactly
    /// once. Idempotent: closing an unknown session does nothing.
    pub fn disconnect(&mut self, client: ClientId) {
        let Some(mut session) = self.sessions.shift_remove(&client) else {
            return;
        };
        let (icons, styles) = session.take_owned();
        for key in icons {
            let dead = self.icon_cache.release(&key);
            self.free_all(dead);
        }
        for key in styles {
            let dead = self.style_cache.release(&key);
            self.free_all(dead);
        }
        self.metrics.sessions_closed += 1;
    }

    /// Handle one request for one session.
    ///
    /// An `Err` is a protocol violation: fatal to this session only.
    /// The service front end drops the session and its reply channel;
    /// other sessions are unaffected.
    pub fn handle(&mut self, client: ClientId, request: Request) -> Result<Response, ProtocolError> {
        self.metrics.requests += 1;
        let result = self.dispatch(client, request);
        if result.is_err() {
            self.metrics.protocol_errors += 1;
        }
        result
    }

    /// The read-only shared mapping a connecting client attaches with.
    pub fn share_region(&self) -> SharedRegion {
        self.ctx
            .share()
            .expect("the server always maps the shared region")
    }

    /// The server's region map.
    pub fn ctx(&self) -> &RegionMap {
        &self.ctx
    }

    /// Name of the active theme.
    pub fn active_theme(&self) -> &str {
        &self.theme
    }

    /// The active index table chain.
    pub fn tables(&self) -> &[TableRef] {
        &self.tables
    }

    /// The icon cache, for inspection.
    pub fn icon_cache(&self) -> &ResourceCache<IconKey> {
        &self.icon_cache
    }

    /// The style cache, for inspection.
    pub fn style_cache(&self) -> &ResourceCache<StyleKey> {
        &self.style_cache
    }

    /// Cumulative request counters.
    pub fn metrics(&self) -> &ServerMetrics {
        &self.metrics
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Number of open sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn dispatch(&mut self, client: ClientId, request: Request) -> Result<Response, ProtocolError> {
        if !self.sessions.contains_key(&client) {
            return Err(ProtocolError::UnknownSession { client });
        }
        match request {
            Request::StylesheetLookup { path, priority: _ } => {
                self.style_lookup(client, StyleKey::stylesheet(&path), PayloadFormat::StyleRules)
            }
            Request::LayoutLookup {
                path,
                layout,
                section,
            } => self.style_lookup(
                client,
                StyleKey::layout(&path, &layout, &section),
                PayloadFormat::LayoutDef,
            ),
            Request::EffectLookup { file } => {
                self.style_lookup(client, StyleKey::effect(&file), PayloadFormat::EffectData)
            }
            Request::IconLookup { key, options } => self.icon_lookup(client, key, options),
            Request::MultiPartIconLookup {
                parts,
                geometry,
                key,
                options,
            } => self.multi_icon_lookup(client, parts, geometry, key, options),
            Request::ThemeIndexLookup => Ok(Response::IndexTables(self.tables.clone())),
            Request::ThemeSelect { name } => self.theme_select(name),
            Request::UnloadIcon { key } => {
                if !self.session_mut(client).release_icon(&key) {
                    return Err(ProtocolError::MalformedRequest {
                        reason: format!("unload of unowned icon {key}"),
                    });
                }
                let dead = self.icon_cache.release(&key);
                self.free_all(dead);
                Ok(Response::Ack)
            }
            Request::UnloadStylesheet { key } => {
                if !self.session_mut(client).release_style(&key) {
                    return Err(ProtocolError::MalformedRequest {
                        reason: format!("unload of unowned style entry {key}"),
                    });
                }
                let dead = self.style_cache.release(&key);
                self.free_all(dead);
                Ok(Response::Ack)
            }
        }
    }

    fn style_lookup(
        &mut self,
        client: ClientId,
        key: StyleKey,
        format: PayloadFormat,
    ) -> Result<Response, ProtocolError> {
        if let Some(payload) = self.style_cache.lookup(&key) {
            self.metrics.style_hits += 1;
            self.session_mut(client).own_style(key);
            return Ok(Response::Payload(payload));
        }
        self.metrics.style_misses += 1;

        let Some(bytes) = self.store.source(&key) else {
            self.metrics.not_found += 1;
            return Ok(Response::NotFound);
        };
        let bytes = bytes.to_vec();
        // Stylesheets are parsed into a rule-span vector; layout and
        // effect definitions stay raw blobs.
        let built = if format == PayloadFormat::StyleRules {
            build_style_payload(&self.ctx, Region::Shared, &bytes)
        } else {
            self.alloc_payload(&bytes, format)
        };
        let payload = match built {
            Ok(payload) => payload,
            Err(e) => return Ok(self.alloc_failure(e)),
        };
        let payload = match self.style_cache.insert(key.clone(), payload, true) {
            Ok(()) => payload,
            Err(CacheError::Duplicate) => {
                // Lost a miss-then-insert race: ours is redundant, the
                // existing entry stays canonical.
                self.free_payload(&payload);
                self.style_cache
                    .lookup(&key)
                    .expect("duplicate insert implies a live entry")
            }
        };
        self.session_mut(client).own_style(key);
        Ok(Response::Payload(payload))
    }

    fn icon_lookup(
        &mut self,
        client: ClientId,
        mut key: IconKey,
        options: IconOptions,
    ) -> Result<Response, ProtocolError> {
        if key.name.is_empty() {
            return Err(ProtocolError::MalformedRequest {
                reason: "empty icon name".to_string(),
            });
        }
        let Some(item) = self.index_find(&key.name) else {
            self.metrics.not_found += 1;
            return Ok(Response::NotFound);
        };
        normalize_size(&mut key, &item);
        if !key.size.is_valid() {
            self.metrics.not_found += 1;
            return Ok(Response::NotFound);
        }

        if let Some(payload) = self.icon_cache.lookup(&key) {
            self.metrics.icon_hits += 1;
            self.session_mut(client).own_icon(key);
            return Ok(Response::Payload(payload));
        }
        self.metrics.icon_misses += 1;

        let Some(decoded) = self.decoder.decode(&key) else {
            self.metrics.not_found += 1;
            return Ok(Response::NotFound);
        };
        let payload = match self.alloc_payload(&decoded.rgba, PayloadFormat::Rgba32) {
            Ok(payload) => payload,
            Err(e) => return Ok(self.alloc_failure(e)),
        };
        let payload = self.insert_canonical_icon(key.clone(), payload, !options.no_keep_alive);
        self.session_mut(client).own_icon(key);
        Ok(Response::Payload(payload))
    }

    fn multi_icon_lookup(
        &mut self,
        client: ClientId,
        parts: Vec<String>,
        geometry: MultiPartGeometry,
        mut key: IconKey,
        options: IconOptions,
    ) -> Result<Response, ProtocolError> {
        if parts.is_empty() {
            return Err(ProtocolError::MalformedRequest {
                reason: "empty part list".to_string(),
            });
        }
        if geometry.positions.len() != parts.len() || geometry.part_sizes.len() != parts.len() {
            return Err(ProtocolError::MalformedRequest {
                reason: "geometry does not match the part list".to_string(),
            });
        }
        if !geometry.target_size.is_valid() {
            return Err(ProtocolError::MalformedRequest {
                reason: "invalid stitch target size".to_string(),
            });
        }
        // The stitched frame is keyed at the target size regardless of
        // what the caller put in the key.
        key.size = geometry.target_size;

        if let Some(payload) = self.icon_cache.lookup(&key) {
            self.metrics.icon_hits += 1;
            self.session_mut(client).own_icon(key);
            return Ok(Response::Payload(payload));
        }
        self.metrics.icon_misses += 1;

        // All parts must resolve before anything is allocated: a
        // missing piece fails the whole frame.
        let mut frames: Vec<DecodedIcon> = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            if self.index_find(part).is_none() {
                self.metrics.not_found += 1;
                return Ok(Response::NotFound);
            }
            let part_key = IconKey {
                name: part.clone(),
                size: geometry.part_sizes[i],
                aspect: key.aspect,
                mode: key.mode,
                mirrored: key.mirrored,
                color: key.color,
            };
            let Some(frame) = self.decoder.decode(&part_key) else {
                self.metrics.not_found += 1;
                return Ok(Response::NotFound);
            };
            frames.push(frame);
        }

        let stitched = stitch(geometry.target_size, &geometry.positions, &frames);
        let payload = match self.alloc_payload(&stitched, PayloadFormat::Rgba32) {
            Ok(payload) => payload,
            Err(e) => return Ok(self.alloc_failure(e)),
        };
        let payload = self.insert_canonical_icon(key.clone(), payload, !options.no_keep_alive);
        self.metrics.stitched_icons += 1;
        self.session_mut(client).own_icon(key);
        Ok(Response::Payload(payload))
    }

    fn theme_select(&mut self, name: String) -> Result<Response, ProtocolError> {
        if self.store.theme(&name).is_none() {
            self.metrics.not_found += 1;
            return Ok(Response::NotFound);
        }
        let tables = match build_index_tables(&self.ctx, &self.store, &name) {
            Ok(tables) => tables,
            Err(e) => return Ok(self.alloc_failure(e)),
        };
        // The previous chain's tables stay resident: they are immutable
        // and clients keep reading a fetched chain until they re-fetch.
        self.theme = name;
        self.tables = tables;

        let mut dead = self.icon_cache.clear();
        dead.extend(self.style_cache.clear());
        self.free_all(dead);
        self.metrics.theme_switches += 1;
        Ok(Response::Ack)
    }

    /// First hit for `name` across the active table chain.
    fn index_find(&self, name: &str) -> Option<IndexItem> {
        for table in &self.tables {
            let hit = self
                .ctx
                .with_bytes(table.region, table.offset, table.len, |bytes| {
                    ThemeIndex::new(bytes).binary_find(name)
                })
                .ok()
                .flatten();
            if hit.is_some() {
                return hit;
            }
        }
        None
    }

    fn alloc_payload(
        &self,
        bytes: &[u8],
        format: PayloadFormat,
    ) -> Result<SharedPayload, ArenaError> {
        let len = bytes.len() as u32;
        let offset = self.ctx.alloc(Region::Shared, len.max(1))?;
        self.ctx.write_bytes(Region::Shared, offset, bytes)?;
        Ok(SharedPayload {
            data: OffsetRef::new(offset, Region::Shared),
            len,
            format,
        })
    }

    /// Record an allocation failure. The request degrades to an
    /// explicit `OutOfMemory` status; the client may fall back to a
    /// process-local load path.
    fn alloc_failure(&mut self, _e: ArenaError) -> Response {
        self.metrics.oom_failures += 1;
        Response::OutOfMemory
    }

    fn insert_canonical_icon(
        &mut self,
        key: IconKey,
        payload: SharedPayload,
        keepable: bool,
    ) -> SharedPayload {
        match self.icon_cache.insert(key.clone(), payload, keepable) {
            Ok(()) => payload,
            Err(CacheError::Duplicate) => {
                self.free_payload(&payload);
                self.icon_cache
                    .lookup(&key)
                    .expect("duplicate insert implies a live entry")
            }
        }
    }

    fn free_all(&mut self, dead: Vec<SharedPayload>) {
        for payload in dead {
            self.free_payload(&payload);
        }
    }

    fn free_payload(&mut self, payload: &SharedPayload) {
        match payload.format {
            PayloadFormat::StyleRules => {
                free_style_payload(&self.ctx, payload)
                    .expect("the server maps its regions writable");
            }
            _ => {
                let offset = payload
                    .data
                    .offset()
                    .expect("cached payloads are never null");
                self.ctx
                    .free(payload.data.region(), offset)
                    .expect("the server maps its regions writable");
            }
        }
        self.metrics.payloads_freed += 1;
    }

    fn session_mut(&mut self, client: ClientId) -> &mut Session {
        self.sessions
            .get_mut(&client)
            .expect("session validated at dispatch")
    }
}

/// Use the theme's declared default size when the request left the
/// size unspecified.
fn normalize_size(key: &mut IconKey, item: &IndexItem) {
    if key.size.is_valid() {
        return;
    }
    let (w, h) = if key.mirrored && item.mirrored_default_size.0 > 0 {
        item.mirrored_default_size
    } else {
        item.default_size
    };
    key.size = IconSize::new(w, h);
}

/// Build one index table per theme in the ancestry, most-derived
/// first, into the shared chunk. On failure every table allocated so
/// far is rolled back — a half-built chain is never installed.
fn build_index_tables(
    ctx: &RegionMap,
    store: &ResourceStore,
    theme: &str,
) -> Result<SmallVec<[TableRef; MAX_INDEX_TABLES]>, ArenaError> {
    let mut tables: SmallVec<[TableRef; MAX_INDEX_TABLES]> = SmallVec::new();
    for name in store.ancestry(theme) {
        let def = store.theme(name).expect("ancestry yields known themes");
        let mut builder = IndexBuilder::new();
        for icon in &def.icons {
            builder.add(icon.clone());
        }
        let bytes = builder.build();
        debug_assert!(ThemeIndex::validated(&bytes).is_ok());

        let offset = match ctx.alloc(Region::Shared, bytes.len() as u32) {
            Ok(offset) => offset,
            Err(e) => {
                for table in tables {
                    let _ = ctx.free(Region::Shared, table.offset);
                }
                return Err(e);
            }
        };
        ctx.write_bytes(Region::Shared, offset, &bytes)?;
        tables.push(TableRef {
            offset,
            len: bytes.len() as u32,
            region: Region::Shared,
            drive: def.drive,
        });
    }
    Ok(tables)
}

/// Compose part frames into one RGBA target frame. Pieces falling
/// outside the target are clipped, not an error.
fn stitch(target: IconSize, positions: &[(i32, i32)], frames: &[DecodedIcon]) -> Vec<u8> {
    let tw = target.width;
    let th = target.height;
    let mut out = vec![0u8; (tw * th * 4) as usize];
    for (frame, &(px, py)) in frames.iter().zip(positions) {
        let fw = frame.size.width;
        let fh = frame.size.height;
        for y in 0..fh {
            let ty = py + y;
            if ty < 0 || ty >= th {
                continue;
            }
            for x in 0..fw {
                let tx = px + x;
                if tx < 0 || tx >= tw {
                    continue;
                }
                let src = ((y * fw + x) * 4) as usize;
                let dst = ((ty * tw + tx) * 4) as usize;
                out[dst..dst + 4].copy_from_slice(&frame.rgba[src..src + 4]);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_arena::ChunkConfig;
    use sable_cache::CacheConfig;
    use sable_index::IndexEntry;
    use crate::loader::ThemeDef;

    fn entry(name: &str) -> IndexEntry {
        IndexEntry {
            name: name.to_string(),
            folder: "icons".to_string(),
            ext: "svg".to_string(),
            mirrored_ext: None,
            default_size: (24, 24),
            mirrored_default_size: (-1, -1),
        }
    }

    fn demo_store() -> ResourceStore {
        let mut store = ResourceStore::new();
        store
            .add_theme(
                "base",
                ThemeDef::new(vec![entry("qtg_mono_back"), entry("qtg_mono_menu")]),
            )
            .add_theme("sable", ThemeDef::derived("base", vec![entry("qtg_mono_back")]))
            .add_stylesheet("widgets/pushbutton.css", b"button { border: 1px; }".to_vec())
            .add_layout(
                "widgets/pushbutton.widgetml",
                "portrait",
                "main",
                b"<layout/>".to_vec(),
            )
            .add_effect("fade.fxml", b"<effect/>".to_vec());
        store
    }

    fn server() -> ThemeServer {
        let config = ServerConfig {
            shared: ChunkConfig::with_size(1 << 20),
            local: ChunkConfig::with_size(1 << 16),
            ..ServerConfig::default()
        };
        ThemeServer::new(config, demo_store()).unwrap()
    }

    fn icon_request(name: &str, w: i32, h: i32) -> Request {
        Request::IconLookup {
            key: IconKey::new(name, IconSize::new(w, h)),
            options: IconOptions::default(),
        }
    }

    // ── sessions ─────────────────────────────────────────────

    #[test]
    fn unknown_session_is_a_protocol_error() {
        let mut s = server();
        let err = s.handle(ClientId(99), Request::ThemeIndexLookup);
        assert_eq!(
            err,
            Err(ProtocolError::UnknownSession {
                client: ClientId(99)
            })
        );
        assert_eq!(s.metrics().protocol_errors, 1);
    }

    #[test]
    fn disconnect_releases_owned_references() {
        let mut s = server();
        let client = s.connect();
        let response = s.handle(client, icon_request("qtg_mono_back", 32, 32)).unwrap();
        assert!(matches!(response, Response::Payload(_)));
        let key = IconKey::new("qtg_mono_back", IconSize::new(32, 32));
        assert_eq!(s.icon_cache().refcount(&key), Some(1));

        s.disconnect(client);
        // Refcount reached zero: the entry is kept alive, unreferenced.
        assert_eq!(s.icon_cache().refcount(&key), Some(0));
        assert_eq!(s.session_count(), 0);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let mut s = server();
        let client = s.connect();
        s.disconnect(client);
        s.disconnect(client);
        assert_eq!(s.metrics().sessions_closed, 1);
    }

    // ── icon lookup ──────────────────────────────────────────

    #[test]
    fn icon_miss_then_hit_shares_one_offset() {
        let mut s = server();
        let a = s.connect();
        let b = s.connect();
        let Response::Payload(first) = s.handle(a, icon_request("qtg_mono_back", 32, 32)).unwrap()
        else {
            panic!("expected payload");
        };
        let Response::Payload(second) = s.handle(b, icon_request("qtg_mono_back", 32, 32)).unwrap()
        else {
            panic!("expected payload");
        };
        assert_eq!(first, second);
        let key = IconKey::new("qtg_mono_back", IconSize::new(32, 32));
        assert_eq!(s.icon_cache().refcount(&key), Some(2));
        assert_eq!(s.metrics().icon_misses, 1);
        assert_eq!(s.metrics().icon_hits, 1);
    }

    #[test]
    fn unknown_icon_is_not_found() {
        let mut s = server();
        let client = s.connect();
        let response = s.handle(client, icon_request("no_such_icon", 32, 32)).unwrap();
        assert_eq!(response, Response::NotFound);
        assert_eq!(s.metrics().not_found, 1);
    }

    #[test]
    fn unspecified_size_uses_theme_default() {
        let mut s = server();
        let client = s.connect();
        let response = s.handle(client, icon_request("qtg_mono_back", -1, -1)).unwrap();
        let Response::Payload(payload) = response else {
            panic!("expected payload");
        };
        // Default size is 24×24 → 2304 RGBA bytes.
        assert_eq!(payload.len, 24 * 24 * 4);
        // The normalized key is the cache identity.
        let key = IconKey::new("qtg_mono_back", IconSize::new(24, 24));
        assert_eq!(s.icon_cache().refcount(&key), Some(1));
    }

    #[test]
    fn ancestor_icon_resolves_through_the_chain() {
        let mut s = server();
        let client = s.connect();
        // qtg_mono_menu is only in the base theme.
        let response = s.handle(client, icon_request("qtg_mono_menu", 16, 16)).unwrap();
        assert!(matches!(response, Response::Payload(_)));
    }

    #[test]
    fn empty_icon_name_kills_the_session() {
        let mut s = server();
        let client = s.connect();
        let err = s.handle(client, icon_request("", 16, 16));
        assert!(matches!(err, Err(ProtocolError::MalformedRequest { .. })));
    }

    // ── style lookup ─────────────────────────────────────────

    #[test]
    fn stylesheet_lookup_parses_rules() {
        let mut s = server();
        let client = s.connect();
        let request = Request::StylesheetLookup {
            path: "widgets/pushbutton.css".to_string(),
            priority: sable_core::LayerPriority::Theme,
        };
        let Response::Payload(payload) = s.handle(client, request).unwrap() else {
            panic!("expected payload");
        };
        assert_eq!(payload.format, PayloadFormat::StyleRules);
        let rules = crate::style::read_style_rules(s.ctx(), &payload).unwrap();
        assert_eq!(rules, vec!["button { border: 1px; }".to_string()]);
    }

    #[test]
    fn layout_and_effect_lookups_resolve() {
        let mut s = server();
        let client = s.connect();
        let layout = Request::LayoutLookup {
            path: "widgets/pushbutton.widgetml".to_string(),
            layout: "portrait".to_string(),
            section: "main".to_string(),
        };
        let effect = Request::EffectLookup {
            file: "fade.fxml".to_string(),
        };
        assert!(matches!(
            s.handle(client, layout).unwrap(),
            Response::Payload(SharedPayload {
                format: PayloadFormat::LayoutDef,
                ..
            })
        ));
        assert!(matches!(
            s.handle(client, effect).unwrap(),
            Response::Payload(SharedPayload {
                format: PayloadFormat::EffectData,
                ..
            })
        ));
    }

    #[test]
    fn absent_stylesheet_is_not_found() {
        let mut s = server();
        let client = s.connect();
        let request = Request::StylesheetLookup {
            path: "absent.css".to_string(),
            priority: sable_core::LayerPriority::Theme,
        };
        assert_eq!(s.handle(client, request).unwrap(), Response::NotFound);
    }

    // ── unload ───────────────────────────────────────────────

    #[test]
    fn unload_releases_one_reference() {
        let mut s = server();
        let client = s.connect();
        let key = IconKey::new("qtg_mono_back", IconSize::new(32, 32));
        let _ = s.handle(client, icon_request("qtg_mono_back", 32, 32)).unwrap();
        let _ = s.handle(client, icon_request("qtg_mono_back", 32, 32)).unwrap();
        assert_eq!(s.icon_cache().refcount(&key), Some(2));

        let response = s
            .handle(client, Request::UnloadIcon { key: key.clone() })
            .unwrap();
        assert_eq!(response, Response::Ack);
        assert_eq!(s.icon_cache().refcount(&key), Some(1));
    }

    #[test]
    fn unload_of_unowned_icon_is_a_violation() {
        let mut s = server();
        let client = s.connect();
        let key = IconKey::new("qtg_mono_back", IconSize::new(32, 32));
        let err = s.handle(client, Request::UnloadIcon { key });
        assert!(matches!(err, Err(ProtocolError::MalformedRequest { .. })));
    }

    // ── multi-part icons ─────────────────────────────────────

    fn three_part_request() -> Request {
        Request::MultiPartIconLookup {
            parts: vec![
                "qtg_mono_back".to_string(),
                "qtg_mono_menu".to_string(),
                "qtg_mono_back".to_string(),
            ],
            geometry: MultiPartGeometry {
                positions: vec![(0, 0), (8, 0), (16, 0)],
                part_sizes: vec![IconSize::new(8, 8); 3],
                target_size: IconSize::new(24, 8),
            },
            key: IconKey::new("frame:back_menu_back", IconSize::unspecified()),
            options: IconOptions::default(),
        }
    }

    #[test]
    fn multi_part_stitches_and_caches_one_frame() {
        let mut s = server();
        let client = s.connect();
        let Response::Payload(payload) = s.handle(client, three_part_request()).unwrap() else {
            panic!("expected payload");
        };
        assert_eq!(payload.len, 24 * 8 * 4);
        assert_eq!(s.metrics().stitched_icons, 1);

        // Same composite key → cache hit, no second stitch.
        let Response::Payload(again) = s.handle(client, three_part_request()).unwrap() else {
            panic!("expected payload");
        };
        assert_eq!(payload, again);
        assert_eq!(s.metrics().stitched_icons, 1);
        assert_eq!(s.metrics().icon_hits, 1);
    }

    #[test]
    fn multi_part_with_missing_piece_is_not_found() {
        let mut s = server();
        let client = s.connect();
        let request = Request::MultiPartIconLookup {
            parts: vec!["qtg_mono_back".to_string(), "missing".to_string()],
            geometry: MultiPartGeometry {
                positions: vec![(0, 0), (8, 0)],
                part_sizes: vec![IconSize::new(8, 8); 2],
                target_size: IconSize::new(16, 8),
            },
            key: IconKey::new("frame:x", IconSize::unspecified()),
            options: IconOptions::default(),
        };
        assert_eq!(s.handle(client, request).unwrap(), Response::NotFound);
    }

    #[test]
    fn multi_part_geometry_mismatch_is_a_violation() {
        let mut s = server();
        let client = s.connect();
        let request = Request::MultiPartIconLookup {
            parts: vec!["qtg_mono_back".to_string()],
            geometry: MultiPartGeometry {
                positions: vec![(0, 0), (8, 0)],
                part_sizes: vec![IconSize::new(8, 8)],
                target_size: IconSize::new(16, 8),
            },
            key: IconKey::new("frame:x", IconSize::unspecified()),
            options: IconOptions::default(),
        };
        assert!(matches!(
            s.handle(client, request),
            Err(ProtocolError::MalformedRequest { .. })
        ));
    }

    // ── theme switching ──────────────────────────────────────

    #[test]
    fn theme_select_swaps_tables_and_clears_caches() {
        let mut s = server();
        let client = s.connect();
        let _ = s.handle(client, icon_request("qtg_mono_back", 32, 32)).unwrap();
        let old_tables: Vec<TableRef> = s.tables().to_vec();
        assert_eq!(old_tables.len(), 2); // sable + base

        let response = s
            .handle(
                client,
                Request::ThemeSelect {
                    name: "base".to_string(),
                },
            )
            .unwrap();
        assert_eq!(response, Response::Ack);
        assert_eq!(s.active_theme(), "base");
        assert_eq!(s.tables().len(), 1);
        assert_ne!(s.tables()[0], old_tables[0]);

        // The held icon survived the clear, marked for eviction at its
        // last release.
        let key = IconKey::new("qtg_mono_back", IconSize::new(32, 32));
        assert_eq!(s.icon_cache().refcount(&key), Some(1));
        s.disconnect(client);
        assert!(!s.icon_cache().contains(&key));
    }

    #[test]
    fn unknown_theme_is_not_found() {
        let mut s = server();
        let client = s.connect();
        let response = s
            .handle(
                client,
                Request::ThemeSelect {
                    name: "missing".to_string(),
                },
            )
            .unwrap();
        assert_eq!(response, Response::NotFound);
        assert_eq!(s.active_theme(), "sable");
    }

    // ── stitch ───────────────────────────────────────────────

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Arbitrary placements, including fully off-target ones,
            /// only ever write whole source pixels inside the frame.
            #[test]
            fn stitch_never_writes_outside_target(
                positions in prop::collection::vec((-20i32..40, -20i32..40), 1..6),
                fw in 1i32..16,
                fh in 1i32..16,
            ) {
                let frames: Vec<DecodedIcon> = positions
                    .iter()
                    .map(|_| DecodedIcon {
                        size: IconSize::new(fw, fh),
                        rgba: vec![0xAB; (fw * fh * 4) as usize],
                    })
                    .collect();
                let out = stitch(IconSize::new(24, 24), &positions, &frames);
                prop_assert_eq!(out.len(), 24 * 24 * 4);
                for px in out.chunks(4) {
                    prop_assert!(
                        px == [0u8, 0, 0, 0].as_slice() || px == [0xABu8; 4].as_slice()
                    );
                }
            }
        }
    }

    #[test]
    fn stitch_places_and_clips() {
        let frame = DecodedIcon {
            size: IconSize::new(2, 1),
            rgba: vec![1, 2, 3, 4, 5, 6, 7, 8],
        };
        // Second placement hangs off the right edge: clipped.
        let out = stitch(IconSize::new(3, 1), &[(0, 0), (2, 0)], &[frame.clone(), frame]);
        assert_eq!(out, vec![1, 2, 3, 4, 5, 6, 7, 8, 1, 2, 3, 4]);
    }

    // ── arena accounting ─────────────────────────────────────

    #[test]
    fn evicted_payloads_return_their_bytes() {
        let config = ServerConfig {
            shared: ChunkConfig::with_size(1 << 20),
            local: ChunkConfig::with_size(1 << 16),
            icon_cache: CacheConfig {
                keep_alive_budget: 0,
                max_item_bytes: 1 << 20,
            },
            ..ServerConfig::default()
        };
        let mut s = ThemeServer::new(config, demo_store()).unwrap();
        let client = s.connect();
        let free_before = s.ctx().free_bytes(Region::Shared).unwrap();
        let _ = s.handle(client, icon_request("qtg_mono_back", 64, 64)).unwrap();
        s.disconnect(client);
        // Zero keep-alive budget: the payload was freed on release.
        assert_eq!(s.ctx().free_bytes(Region::Shared).unwrap(), free_before);
        assert_eq!(s.metrics().payloads_freed, 1);
    }
}
