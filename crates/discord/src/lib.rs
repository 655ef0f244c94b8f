//! Discord adapter for Ideaforge.
//!
//! Implements the [`community::ChatPlatform`] trait over the Discord REST API
//! (v10). One [`DiscordChat`] manages exactly one guild.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, snowflake parsing, permission bits,
//! rate-limit back-off and error-code classification live here. The workflow
//! sees only [`community::ChatPlatform`] and [`community::ChatError`].
//!
//! Gateway events are not received by this crate; they arrive through the
//! `listener` relay.

mod client;
mod platform;
mod wire;

pub use client::DEFAULT_API_BASE;
pub use platform::DiscordChat;
