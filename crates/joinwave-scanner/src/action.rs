use joinwave_types::{IdValue, PeerRef, RawAction, UserRef};

/// The shapes a membership action can take, in the order they are tried.
#[derive(Debug, Clone)]
pub enum MemberAction {
    /// Explicit list of affected users (batch invite/add).
    BatchUsers(Vec<UserRef>),
    /// A single `user_id` field.
    SingleUserField(i64),
    /// A list of raw user ids.
    UserIdList(Vec<IdValue>),
    /// Nothing on the action names a user; whoever sent the event joined.
    SenderFallback(PeerRef),
}

/// Subject ids pulled out of one action, plus entries that could not be read.
#[derive(Debug, Default, PartialEq)]
pub struct Extraction {
    pub ids: Vec<i64>,
    pub rejected: Vec<String>,
}

impl MemberAction {
    /// Picks exactly one shape. Empty lists and a zero `user_id` count as
    /// absent. Returns `None` when neither the action nor the sender names
    /// anyone.
    pub fn classify(action: &RawAction, sender: Option<&PeerRef>) -> Option<Self> {
        if let Some(users) = action.users.as_ref().filter(|u| !u.is_empty()) {
            return Some(Self::BatchUsers(users.clone()));
        }
        if let Some(user_id) = action.user_id.filter(|&id| id != 0) {
            return Some(Self::SingleUserField(user_id));
        }
        if let Some(ids) = action.user_ids.as_ref().filter(|ids| !ids.is_empty()) {
            return Some(Self::UserIdList(ids.clone()));
        }
        sender.cloned().map(Self::SenderFallback)
    }

    pub fn extract(&self) -> Extraction {
        let mut out = Extraction::default();
        match self {
            Self::BatchUsers(users) => {
                for user in users {
                    match user {
                        UserRef::Id(id) => out.ids.push(*id),
                        UserRef::Entity { id: Some(id), .. } => out.ids.push(*id),
                        UserRef::Entity { id: None, username } => out.rejected.push(format!(
                            "user entry without id ({})",
                            username.as_deref().unwrap_or("no username")
                        )),
                    }
                }
            }
            Self::SingleUserField(id) => out.ids.push(*id),
            Self::UserIdList(ids) => {
                for value in ids {
                    match value {
                        IdValue::Int(id) => out.ids.push(*id),
                        IdValue::Text(text) => match text.trim().parse::<i64>() {
                            Ok(id) => out.ids.push(id),
                            Err(_) => out.rejected.push(format!("non-numeric user id {:?}", text)),
                        },
                    }
                }
            }
            Self::SenderFallback(peer) => match peer {
                PeerRef::Id(id) => out.ids.push(*id),
                PeerRef::User { user_id } => out.ids.push(*user_id),
                PeerRef::Other(raw) => out.rejected.push(format!("sender is not a user: {}", raw)),
            },
        }
        out
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::BatchUsers(_) => "batch_users",
            Self::SingleUserField(_) => "single_user_field",
            Self::UserIdList(_) => "user_id_list",
            Self::SenderFallback(_) => "sender_fallback",
        }
    }
}
