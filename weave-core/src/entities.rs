//! Core data model entities (spec §3): Message, Summary, Scored Item.

use crate::identity::{ConversationId, MessageId, SummaryId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

fn normalize_token(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Role of a message's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            _ => Err(format!("invalid role: {}", s)),
        }
    }
}

/// A single message in a conversation.
///
/// Mutation after creation must invalidate any cached artifact derived
/// from the message; the engine itself never mutates messages (spec §3
/// Lifecycle: "the core only *reads* them").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub role: Role,
    pub content: String,
    pub created_at: Timestamp,
    pub parent_id: Option<MessageId>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub embedding: Option<crate::embedding::EmbeddingVector>,
}

/// Depth of a summary's abstraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SummaryLevel {
    Brief,
    Standard,
    Detailed,
}

impl fmt::Display for SummaryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SummaryLevel::Brief => "brief",
            SummaryLevel::Standard => "standard",
            SummaryLevel::Detailed => "detailed",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for SummaryLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "brief" => Ok(SummaryLevel::Brief),
            "standard" => Ok(SummaryLevel::Standard),
            "detailed" => Ok(SummaryLevel::Detailed),
            _ => Err(format!("invalid summary level: {}", s)),
        }
    }
}

/// A derived summary of some number of source messages.
///
/// At most one valid summary per `(conversation_id, level)` pair should be
/// surfaced for assembly; superseded summaries are marked `valid = false`
/// by the storage layer but may still exist historically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub id: SummaryId,
    pub conversation_id: ConversationId,
    pub level: SummaryLevel,
    pub content: String,
    pub token_count: i32,
    pub provider: String,
    pub model: String,
    pub source_message_count: i32,
    pub created_at: Timestamp,
    pub valid: bool,
}

/// Discriminates the underlying kind of a scored/included item without
/// requiring a trait object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemType {
    Message,
    Summary,
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ItemType::Message => "message",
            ItemType::Summary => "summary",
        };
        write!(f, "{}", s)
    }
}

/// A candidate enriched with a relevance score for one assembly call
/// (spec §3 "Scored Item"). Ephemeral: lives only for the duration of one
/// assembly and is never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredItem {
    pub item_type: ItemType,
    pub message_id: Option<MessageId>,
    pub summary_id: Option<SummaryId>,
    pub conversation_id: ConversationId,
    pub content: String,
    pub relevance_score: f32,
    pub token_count: i32,
    pub created_at: Timestamp,
    /// Present only for messages; used by entity-centric scoring and the
    /// assembled-text header.
    pub role: Option<Role>,
    /// Present only for summaries.
    pub level: Option<SummaryLevel>,
    /// Present only for summaries; the assembled text cites it.
    pub source_message_count: Option<i32>,
}

impl ScoredItem {
    pub fn from_message(m: &Message, relevance_score: f32, token_count: i32) -> Self {
        Self {
            item_type: ItemType::Message,
            message_id: Some(m.id),
            summary_id: None,
            conversation_id: m.conversation_id,
            content: m.content.clone(),
            relevance_score,
            token_count,
            created_at: m.created_at,
            role: Some(m.role),
            level: None,
            source_message_count: None,
        }
    }

    pub fn from_summary(s: &Summary, relevance_score: f32, token_count: i32) -> Self {
        Self {
            item_type: ItemType::Summary,
            message_id: None,
            summary_id: Some(s.id),
            conversation_id: s.conversation_id,
            content: s.content.clone(),
            relevance_score,
            token_count,
            created_at: s.created_at,
            role: None,
            level: Some(s.level),
            source_message_count: Some(s.source_message_count),
        }
    }

    /// Stable identity across message/summary for dedup-by-id (spec §4.5
    /// step 4 "Deduplicate by id").
    pub fn stable_id(&self) -> String {
        match self.item_type {
            ItemType::Message => format!("message:{}", self.message_id.unwrap()),
            ItemType::Summary => format!("summary:{}", self.summary_id.unwrap()),
        }
    }
}
