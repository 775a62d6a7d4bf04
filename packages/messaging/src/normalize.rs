//! Turning REST rooms and messages into threads.
//!
//! The interesting part is participant resolution. Rooms normally carry
//! structured participant records; older rooms only have a composite name such
//! as "Ada Admin & Sam Lee", which we split and match against the user
//! directory. That path is a compatibility shim and only runs when no
//! structured participant is present.

use chat_client::{ChatMessage, Room, UserProfile};

use crate::types::{CurrentUser, Message, ParticipantType, Thread};

/// Name used when no participant can be resolved.
pub const UNKNOWN_USER: &str = "Unknown User";

/// The non-self side of a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub name: String,
    pub email: String,
    pub kind: ParticipantType,
    pub image_url: Option<String>,
}

impl Participant {
    fn unknown() -> Self {
        Self {
            name: UNKNOWN_USER.to_string(),
            email: String::new(),
            kind: ParticipantType::Client,
            image_url: None,
        }
    }

    fn from_profile(profile: &UserProfile) -> Self {
        Self {
            name: profile
                .display_name()
                .unwrap_or_else(|| UNKNOWN_USER.to_string()),
            email: profile.email.clone().unwrap_or_default(),
            kind: ParticipantType::from_role(profile.role.as_deref()),
            image_url: profile.image_url.clone(),
        }
    }
}

fn other_participant(room: &Room, user: &CurrentUser) -> Option<UserProfile> {
    room.participant_profiles()
        .into_iter()
        .find(|p| p.id != user.id)
}

/// Whether resolving this room will need the user directory.
pub fn needs_directory(room: &Room, user: &CurrentUser) -> bool {
    match other_participant(room, user) {
        Some(profile) => profile.display_name().is_none(),
        None => true,
    }
}

/// Resolve the other participant of `room`. Never fails.
pub fn resolve_participant(
    room: &Room,
    user: &CurrentUser,
    directory: &[UserProfile],
) -> Participant {
    if let Some(profile) = other_participant(room, user) {
        if profile.display_name().is_some() {
            return Participant::from_profile(&profile);
        }
        // Structured entry with only an id: fill it in from the directory.
        if let Some(known) = directory.iter().find(|u| u.id == profile.id) {
            let mut participant = Participant::from_profile(known);
            if participant.image_url.is_none() {
                participant.image_url = profile.image_url.clone();
            }
            return participant;
        }
    }

    resolve_from_room_name(room.name.as_deref(), user, directory)
}

/// Deprecated: derive the participant from a composite room name.
fn resolve_from_room_name(
    name: Option<&str>,
    user: &CurrentUser,
    directory: &[UserProfile],
) -> Participant {
    let Some(name) = name else {
        return Participant::unknown();
    };

    let own_name = user.full_name();
    let own_email = user.email.as_deref().unwrap_or("");
    let candidates: Vec<&str> = name
        .split(['&', ',', '|', '_'])
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .filter(|piece| !piece.eq_ignore_ascii_case(&own_name))
        .filter(|piece| own_email.is_empty() || !piece.eq_ignore_ascii_case(own_email))
        .collect();

    for piece in &candidates {
        let matched = directory.iter().find(|u| {
            u.id != user.id
                && (u.full_name().eq_ignore_ascii_case(piece)
                    || u.email
                        .as_deref()
                        .is_some_and(|email| email.eq_ignore_ascii_case(piece)))
        });
        if let Some(profile) = matched {
            return Participant::from_profile(profile);
        }
    }

    match candidates.first() {
        Some(piece) => Participant {
            name: piece.to_string(),
            ..Participant::unknown()
        },
        None => Participant::unknown(),
    }
}

/// Convert one REST message. `index` keys messages that arrive without an id.
pub fn message_from_api(
    message: ChatMessage,
    room_id: &str,
    index: usize,
    user: &CurrentUser,
    participant: &Participant,
) -> Message {
    let sender_id = message.sender_id().unwrap_or_default().to_string();
    let sender_name = message.sender_display_name().unwrap_or_else(|| {
        if sender_id == user.id {
            user.full_name()
        } else {
            participant.name.clone()
        }
    });

    Message {
        id: message
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("{}#{}", room_id, index)),
        sender_id,
        sender_name,
        content: message.content,
        created_at: message.created_at.unwrap_or_default(),
        read: message.read,
        message_type: message.message_type.unwrap_or_else(|| "text".to_string()),
    }
}

/// Build a thread from a room and its messages, oldest first.
pub fn thread_from_room(
    room: &Room,
    messages: Vec<ChatMessage>,
    user: &CurrentUser,
    directory: &[UserProfile],
) -> Thread {
    let participant = resolve_participant(room, user, directory);
    let room_id = room.api_id().to_string();

    let mut messages: Vec<Message> = messages
        .into_iter()
        .enumerate()
        .map(|(index, m)| message_from_api(m, &room_id, index, user, &participant))
        .collect();
    messages.sort_by_key(|m| m.created_at);

    let preview = room.last_message.as_ref();
    let mut thread = Thread {
        id: room.id.clone(),
        room_id,
        participant_name: participant.name,
        participant_email: participant.email,
        participant_type: participant.kind,
        participant_image_url: participant.image_url,
        last_message: preview.map(|m| m.content.clone()).unwrap_or_default(),
        last_message_time: preview.and_then(|m| m.created_at).or(room.updated_at),
        unread_count: 0,
        messages,
    };
    thread.recount(&user.id);
    thread
}
