//! Type-safe entity identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use uuid::Uuid;

/// Trait for type-safe entity IDs.
///
/// Ensures IDs of different entity kinds cannot be accidentally mixed up
/// at a call site, even though they all wrap the same underlying `Uuid`.
pub trait EntityIdType:
    Copy
    + Clone
    + Eq
    + PartialEq
    + Hash
    + fmt::Debug
    + fmt::Display
    + FromStr
    + Serialize
    + serde::de::DeserializeOwned
    + Send
    + Sync
    + 'static
{
    const ENTITY_NAME: &'static str;

    fn new(uuid: Uuid) -> Self;
    fn as_uuid(&self) -> Uuid;

    fn nil() -> Self {
        Self::new(Uuid::nil())
    }

    fn now_v7() -> Self {
        Self::new(Uuid::now_v7())
    }

    fn new_v4() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Error parsing an entity ID from a string.
#[derive(Debug, Clone)]
pub struct EntityIdParseError {
    pub entity_name: &'static str,
    pub input: String,
    pub source: uuid::Error,
}

impl fmt::Display for EntityIdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to parse {} id from '{}': {}",
            self.entity_name, self.input, self.source
        )
    }
}

impl std::error::Error for EntityIdParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

macro_rules! define_entity_id {
    ($name:ident, $entity:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(Uuid);

        impl EntityIdType for $name {
            const ENTITY_NAME: &'static str = $entity;

            fn new(uuid: Uuid) -> Self {
                Self(uuid)
            }

            fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = EntityIdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::from_str(s)
                    .map(Self::new)
                    .map_err(|e| EntityIdParseError {
                        entity_name: Self::ENTITY_NAME,
                        input: s.to_string(),
                        source: e,
                    })
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::nil()
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                self.0.serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                Uuid::deserialize(deserializer).map(Self::new)
            }
        }
    };
}

define_entity_id!(
    ConversationId,
    "conversation",
    "Type-safe ID for a conversation."
);
define_entity_id!(MessageId, "message", "Type-safe ID for a message.");
define_entity_id!(SummaryId, "summary", "Type-safe ID for a summary.");

/// Timestamp type, always UTC.
pub type Timestamp = DateTime<Utc>;

/// Duration in milliseconds, used for TTL and deadline configuration.
pub type DurationMs = i64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_type_safety() {
        let c = ConversationId::now_v7();
        let m = MessageId::now_v7();
        assert_ne!(c.as_uuid(), m.as_uuid());
    }

    #[test]
    fn entity_id_display_and_debug() {
        let id = ConversationId::new(Uuid::nil());
        assert_eq!(
            format!("{:?}", id),
            "ConversationId(00000000-0000-0000-0000-000000000000)"
        );
        assert_eq!(format!("{}", id), "00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn entity_id_from_str_roundtrip() {
        let uuid_str = "550e8400-e29b-41d4-a716-446655440000";
        let id: MessageId = uuid_str.parse().expect("valid uuid parses");
        assert_eq!(id.to_string(), uuid_str);
    }

    #[test]
    fn entity_id_parse_error_is_informative() {
        let result: Result<MessageId, _> = "not-a-uuid".parse();
        let err = result.unwrap_err();
        assert_eq!(err.entity_name, "message");
        assert_eq!(err.input, "not-a-uuid");
    }

    #[test]
    fn entity_id_serde_is_transparent() {
        let id = SummaryId::now_v7();
        let json = serde_json::to_string(&id).unwrap();
        assert!(json.starts_with('"') && json.ends_with('"'));
        let back: SummaryId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn entity_id_default_is_nil() {
        assert_eq!(ConversationId::default(), ConversationId::nil());
    }
}
