use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A conversation as the caller names it: a numeric id or a public handle
/// that still has to be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConversationHandle {
    Id(i64),
    Name(String),
}

impl ConversationHandle {
    /// Numeric strings (optional leading `-`, then digits) become `Id`,
    /// everything else is kept as a `Name`.
    pub fn parse(raw: &str) -> Self {
        let digits = raw.strip_prefix('-').unwrap_or(raw);
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(id) = raw.parse::<i64>() {
                return Self::Id(id);
            }
        }
        Self::Name(raw.to_string())
    }
}

impl fmt::Display for ConversationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{}", id),
            Self::Name(name) => write!(f, "{}", name),
        }
    }
}

/// One event from a conversation's history, as the platform hands it over.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: i64,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sender: Option<PeerRef>,
    #[serde(default)]
    pub action: Option<RawAction>,
}

/// Service action attached to an event. Only some kinds are membership
/// changes; the shape fields are all optional and platform-dependent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAction {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default)]
    pub users: Option<Vec<UserRef>>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub user_ids: Option<Vec<IdValue>>,
}

impl RawAction {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            users: None,
            user_id: None,
            user_ids: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    MembersAdded,
    JoinedByLink,
    JoinedByRequest,
    MemberJoined,
    #[serde(other)]
    Other,
}

impl ActionKind {
    pub fn is_membership_change(self) -> bool {
        !matches!(self, Self::Other)
    }
}

/// Entry of a batch user list: a bare id or a user object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserRef {
    Id(i64),
    Entity {
        #[serde(default)]
        id: Option<i64>,
        #[serde(default)]
        username: Option<String>,
    },
}

/// Entry of a `user_ids` list. Some exports carry ids as strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdValue {
    Int(i64),
    Text(String),
}

/// Originating peer of an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PeerRef {
    Id(i64),
    User { user_id: i64 },
    Other(serde_json::Value),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numeric_handles() {
        assert_eq!(ConversationHandle::parse("12345"), ConversationHandle::Id(12345));
        assert_eq!(
            ConversationHandle::parse("-1001234567890"),
            ConversationHandle::Id(-1001234567890)
        );
        assert_eq!(
            ConversationHandle::parse("cool_group"),
            ConversationHandle::Name("cool_group".into())
        );
        assert_eq!(ConversationHandle::parse("-"), ConversationHandle::Name("-".into()));
        assert_eq!(ConversationHandle::parse("12a"), ConversationHandle::Name("12a".into()));
    }

    #[test]
    fn deserializes_heterogeneous_action_shapes() {
        let json = r#"{
            "id": 7,
            "date": "2024-03-01T12:00:00Z",
            "sender": {"channel_id": 99},
            "action": {
                "type": "members_added",
                "users": [1, {"id": 2, "username": "bob"}, {"username": "ghost"}],
                "user_ids": ["3", 4]
            }
        }"#;
        let event: RawEvent = serde_json::from_str(json).unwrap();
        let action = event.action.unwrap();
        assert_eq!(action.kind, ActionKind::MembersAdded);
        assert_eq!(action.users.as_ref().map(Vec::len), Some(3));
        assert!(matches!(event.sender, Some(PeerRef::Other(_))));
        assert!(matches!(action.user_ids.as_deref(), Some([IdValue::Text(_), IdValue::Int(4)])));
    }

    #[test]
    fn unknown_action_kind_is_other() {
        let action: RawAction = serde_json::from_str(r#"{"type": "title_changed"}"#).unwrap();
        assert_eq!(action.kind, ActionKind::Other);
        assert!(!action.kind.is_membership_change());
    }
}
