//! Ideaforge event intake.
//!
//! Implements [`community::EventSource`] with [`RelayEventSource`]: an HTTP
//! endpoint that accepts JSON-encoded [`community::ChatEvent`]s forwarded by a
//! gateway relay and hands them to the dispatch loop through a bounded
//! channel.
//!
//! ## Protocol
//!
//! | Route | Method | Response |
//! |-------|--------|----------|
//! | `/events` | `POST` | `202` queued, `400` malformed, `401` bad secret, `503` shutting down |
//! | `/health` | `GET` | `200` |
//!
//! Every `POST` must carry the shared secret in the [`SECRET_HEADER`] header.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Transport, authentication and deserialization live
//! here. The workflow sees only [`community::EventSource`].

mod relay;

pub use relay::{relay_router, ListenerError, RelayEventSource, EVENTS_PATH, SECRET_HEADER};
