pub mod events;
pub mod models;

pub use events::{ActionKind, ConversationHandle, IdValue, PeerRef, RawAction, RawEvent, UserRef};
pub use models::{JoinRecord, Wave, WaveSummary};
