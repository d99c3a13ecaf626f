//! Message type tags.
//!
//! A tag is the literal prefix that identifies what a message means. The set
//! is closed: anything that does not start with one of these literals is not a
//! protocol message.

use std::fmt;

/// Which side of the protocol sends a given tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Sent by the child endpoint, consumed by the parent
    ChildToParent,
    /// Sent by the parent, consumed by the child endpoint
    ParentToChild,
}

/// Type tag of a protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageTag {
    /// Child is loaded and ready for the handshake
    Loaded,
    /// Parent grants the child its identity
    HandshakeWithParent,
    /// Child acknowledges the granted identity
    Handshake,
    /// Application message from the parent
    ParentCommunicated,
    /// Parent is tearing down
    ParentDisconnected,
    /// Child is tearing down
    OnBeforeUnload,
    /// Unclassified outbound message from the child
    Custom,
}

impl MessageTag {
    /// Every recognized tag.
    pub const ALL: [Self; 7] = [
        Self::Loaded,
        Self::HandshakeWithParent,
        Self::Handshake,
        Self::ParentCommunicated,
        Self::ParentDisconnected,
        Self::OnBeforeUnload,
        Self::Custom,
    ];

    /// Literal prefix written on the wire.
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Loaded => "__TAB__LOADED_EVENT__",
            Self::HandshakeWithParent => "__HANDSHAKE_WITH_PARENT__",
            Self::Handshake => "__TAB__HANDSHAKE_EVENT__",
            Self::ParentCommunicated => "__PARENT_COMMUNICATED__",
            Self::ParentDisconnected => "__PARENT_DISCONNECTED__",
            Self::OnBeforeUnload => "__TAB__ON_BEFORE_UNLOAD__",
            Self::Custom => "__TAB__CUSTOM_EVENT__",
        }
    }

    /// Which side sends this tag.
    pub const fn direction(self) -> Direction {
        match self {
            Self::HandshakeWithParent | Self::ParentCommunicated | Self::ParentDisconnected => {
                Direction::ParentToChild
            },
            Self::Loaded | Self::Handshake | Self::OnBeforeUnload | Self::Custom => {
                Direction::ChildToParent
            },
        }
    }

    /// Split `raw` into its leading tag and the remainder.
    ///
    /// Only the start of `raw` is inspected. If more than one literal could
    /// match, the longest one wins, so the result never depends on the order
    /// of [`Self::ALL`].
    pub fn strip_prefix(raw: &str) -> Option<(Self, &str)> {
        Self::ALL
            .iter()
            .filter_map(|tag| raw.strip_prefix(tag.prefix()).map(|rest| (*tag, rest)))
            .max_by_key(|(tag, _)| tag.prefix().len())
    }
}

impl fmt::Display for MessageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Loaded => "LOADED",
            Self::HandshakeWithParent => "HANDSHAKE_WITH_PARENT",
            Self::Handshake => "HANDSHAKE",
            Self::ParentCommunicated => "PARENT_COMMUNICATED",
            Self::ParentDisconnected => "PARENT_DISCONNECTED",
            Self::OnBeforeUnload => "ON_BEFORE_UNLOAD",
            Self::Custom => "CUSTOM",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_are_distinct_and_prefix_free() {
        for a in MessageTag::ALL {
            for b in MessageTag::ALL {
                if a != b {
                    assert!(
                        !a.prefix().starts_with(b.prefix()),
                        "{a} literal must not start with {b} literal"
                    );
                }
            }
        }
    }

    #[test]
    fn strip_prefix_splits_tag_and_rest() {
        let raw = format!("{}{{\"id\":\"1\"}}", MessageTag::Handshake.prefix());
        let (tag, rest) = MessageTag::strip_prefix(&raw).unwrap();
        assert_eq!(tag, MessageTag::Handshake);
        assert_eq!(rest, "{\"id\":\"1\"}");
    }

    #[test]
    fn strip_prefix_ignores_tags_past_the_start() {
        let raw = format!("hello {}", MessageTag::ParentDisconnected.prefix());
        assert!(MessageTag::strip_prefix(&raw).is_none());
    }

    #[test]
    fn strip_prefix_on_bare_tag_leaves_empty_rest() {
        let (tag, rest) =
            MessageTag::strip_prefix(MessageTag::ParentDisconnected.prefix()).unwrap();
        assert_eq!(tag, MessageTag::ParentDisconnected);
        assert!(rest.is_empty());
    }

    #[test]
    fn directions() {
        assert_eq!(MessageTag::HandshakeWithParent.direction(), Direction::ParentToChild);
        assert_eq!(MessageTag::Custom.direction(), Direction::ChildToParent);
    }
}
