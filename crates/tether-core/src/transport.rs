//! Peer context abstraction and send-time peer selection.
//!
//! The host decides how contexts are spawned and what a "peer" physically is.
//! The core only needs to post a string to one of up to three peers:
//!
//! 1. the embedding parent, when the child is hosted in a frame
//! 2. the opener that spawned this context
//! 3. the top-level ancestor, when it is not this context itself
//!
//! The first one available wins. Delivery is fire-and-forget.

use std::fmt;

use crate::{config::ChildConfig, error::TransportError};

/// Destination origin restriction for an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetOrigin {
    /// Deliver regardless of the receiver's origin (`*`)
    Any,
    /// Deliver only if the receiver has exactly this origin
    Exact(String),
}

impl TargetOrigin {
    /// Build from an optional configured origin.
    pub fn from_origin(origin: Option<&str>) -> Self {
        origin.map_or(Self::Any, |origin| Self::Exact(origin.to_owned()))
    }

    /// Wire form: the origin itself, or `*`.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Any => "*",
            Self::Exact(origin) => origin,
        }
    }

    /// Whether a receiver with `origin` is allowed to see the message.
    pub fn admits(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => expected == origin,
        }
    }
}

impl fmt::Display for TargetOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A context the child can post messages to.
pub trait PeerContext {
    /// Post a raw message. Never blocks and never reports delivery.
    fn post_message(&self, message: &str, target_origin: &TargetOrigin);
}

/// The contexts surrounding the child.
pub trait ContextTree {
    /// Context embedding this one as a frame, if any.
    fn embedding_parent(&self) -> Option<&dyn PeerContext>;

    /// Context that spawned this one, if any.
    fn opener(&self) -> Option<&dyn PeerContext>;

    /// Top-level ancestor, `None` when this context is the top.
    fn top(&self) -> Option<&dyn PeerContext>;
}

/// Which peer a message was delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerKind {
    /// The embedding parent frame
    EmbeddingParent,
    /// The spawning opener
    Opener,
    /// The top-level ancestor
    Top,
}

/// Chooses the peer to deliver to at send time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSelector {
    is_embedded: bool,
    target_origin: TargetOrigin,
}

impl TransportSelector {
    /// Create a selector.
    pub fn new(is_embedded: bool, target_origin: TargetOrigin) -> Self {
        Self { is_embedded, target_origin }
    }

    /// Create a selector matching an endpoint configuration.
    pub fn from_config(config: &ChildConfig) -> Self {
        Self::new(config.is_embedded(), TargetOrigin::from_origin(config.origin()))
    }

    /// Origin restriction applied to every send.
    pub fn target_origin(&self) -> &TargetOrigin {
        &self.target_origin
    }

    /// Pick the first available peer.
    ///
    /// The embedding parent is only considered when the child is configured
    /// as embedded.
    pub fn select<'a>(&self, tree: &'a dyn ContextTree) -> Option<(PeerKind, &'a dyn PeerContext)> {
        let embedding = if self.is_embedded { tree.embedding_parent() } else { None };

        embedding
            .map(|peer| (PeerKind::EmbeddingParent, peer))
            .or_else(|| tree.opener().map(|peer| (PeerKind::Opener, peer)))
            .or_else(|| tree.top().map(|peer| (PeerKind::Top, peer)))
    }

    /// Deliver `raw` to the selected peer.
    pub fn send(&self, tree: &dyn ContextTree, raw: &str) -> Result<PeerKind, TransportError> {
        let (kind, peer) = self.select(tree).ok_or(TransportError::NoTransport)?;
        peer.post_message(raw, &self.target_origin);
        Ok(kind)
    }
}
