//! Theme resource server, session protocol and client link.
//!
//! The server owns all mutable state — the shared chunk, both resource
//! caches, the theme index chain and the session table — and handles
//! one request to completion at a time on its own thread. Clients talk
//! to it over a bounded channel, block on a per-request reply, and read
//! the resulting payloads straight out of the shared region through
//! their own [`RegionMap`](sable_arena::RegionMap).
//!
//! The one genuinely concurrent boundary lives client-side: the
//! [`LocalIconLoader`] decodes uncacheable icons on a worker thread
//! with cancellation that races safely against completion.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod client;
pub mod config;
pub mod loader;
pub mod local;
pub mod metrics;
mod server;
mod service;
mod session;
pub mod style;

// Public re-exports for the primary API surface.
pub use client::ClientLink;
pub use config::ServerConfig;
pub use loader::{DecodedIcon, FlatDecoder, IconDecoder, ResourceStore, ThemeDef};
pub use local::{LocalIconLoader, Ticket};
pub use metrics::ServerMetrics;
pub use server::ThemeServer;
pub use service::ThemeService;
pub use style::{read_style_rules, RuleSpan};
