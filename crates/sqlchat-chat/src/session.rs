//! Session store.
//!
//! Holds the ordered list of chat sessions and the active session id. The
//! whole list is persisted under one key after every mutation.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use sqlchat_core::{load_json, save_json, KeyValueStore};

use crate::error::ChatError;
use crate::keys;
use crate::types::{ChatSession, Message, Role, SessionSummary, DEFAULT_SESSION_NAME};

/// Greeting shown once in every new session.
pub const WELCOME_MESSAGES: [&str; 3] = [
    "Hi there.",
    "Ask me a sales question related to revenue, margin, or budget.",
    "I will try my best to respond with the right insights.",
];

/// Characters of the first user message used as an automatic session name.
const AUTO_NAME_CHARS: usize = 32;

/// Characters of the last message shown in a session summary.
const PREVIEW_CHARS: usize = 44;

pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
    sessions: Vec<ChatSession>,
    active: Option<Uuid>,
}

impl SessionStore {
    /// Load sessions, synthesizing a default one if none were persisted.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Result<Self, ChatError> {
        let sessions: Vec<ChatSession> = load_json(store.as_ref(), keys::CHATS).unwrap_or_default();
        let mut this = Self {
            active: sessions.first().map(|s| s.id),
            store,
            sessions,
        };
        if this.sessions.is_empty() {
            this.new_session()?;
        }
        debug!(count = this.sessions.len(), "Sessions loaded");
        Ok(this)
    }

    pub fn save(&self) -> Result<(), ChatError> {
        save_json(self.store.as_ref(), keys::CHATS, &self.sessions)?;
        Ok(())
    }

    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    pub fn active_id(&self) -> Option<Uuid> {
        self.active
    }

    pub fn active(&self) -> Option<&ChatSession> {
        self.active.and_then(|id| self.get(id))
    }

    pub fn get(&self, id: Uuid) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| s.id == id)
    }

    fn get_mut(&mut self, id: Uuid) -> Result<&mut ChatSession, ChatError> {
        self.sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(ChatError::SessionNotFound(id))
    }

    /// Create a session at the front of the list and make it active.
    pub fn new_session(&mut self) -> Result<Uuid, ChatError> {
        let session = ChatSession::new();
        let id = session.id;
        self.sessions.insert(0, session);
        self.active = Some(id);
        self.save()?;
        info!(session_id = %id, "Session created");
        Ok(id)
    }

    /// The active session id, creating a session if there is none.
    pub fn ensure_active(&mut self) -> Result<Uuid, ChatError> {
        match self.active {
            Some(id) if self.get(id).is_some() => Ok(id),
            _ => self.new_session(),
        }
    }

    pub fn activate(&mut self, id: Uuid) -> Result<(), ChatError> {
        if self.get(id).is_none() {
            return Err(ChatError::SessionNotFound(id));
        }
        self.active = Some(id);
        Ok(())
    }

    /// Rename a session. A blank name leaves it unchanged.
    pub fn rename(&mut self, id: Uuid, name: &str) -> Result<(), ChatError> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(());
        }
        self.get_mut(id)?.name = name.to_string();
        self.save()
    }

    /// Append a message. The first user message names a session that still
    /// carries the default name.
    pub fn push_message(&mut self, session_id: Uuid, message: Message) -> Result<Uuid, ChatError> {
        let session = self.get_mut(session_id)?;
        if session.name == DEFAULT_SESSION_NAME && message.role == Role::User {
            session.name = message.content.chars().take(AUTO_NAME_CHARS).collect();
        }
        let id = message.id;
        session.messages.push(message);
        self.save()?;
        Ok(id)
    }

    /// Delete a stage prompt. No other message may be removed.
    pub fn remove_stage_prompt(&mut self, session_id: Uuid, message_id: Uuid) -> Result<(), ChatError> {
        let session = self.get_mut(session_id)?;
        let pos = session
            .messages
            .iter()
            .position(|m| m.id == message_id && m.is_stage_prompt())
            .ok_or(ChatError::MessageNotFound(message_id))?;
        session.messages.remove(pos);
        self.save()
    }

    /// Append the welcome messages if the session has not shown them yet.
    /// Returns whether anything was added.
    pub fn show_welcome(&mut self, session_id: Uuid) -> Result<bool, ChatError> {
        let session = self.get_mut(session_id)?;
        if session.welcome_shown {
            return Ok(false);
        }
        session.welcome_shown = true;
        session
            .messages
            .extend(WELCOME_MESSAGES.iter().map(|m| Message::assistant(*m)));
        self.save()?;
        Ok(true)
    }

    /// Delete every session.
    pub fn clear_all(&mut self) -> Result<(), ChatError> {
        self.sessions.clear();
        self.active = None;
        self.save()?;
        info!("All sessions cleared");
        Ok(())
    }

    pub fn summaries(&self) -> Vec<SessionSummary> {
        self.sessions
            .iter()
            .map(|s| SessionSummary {
                id: s.id,
                name: s.name.clone(),
                preview: s
                    .messages
                    .last()
                    .map(|m| m.content.chars().take(PREVIEW_CHARS).collect())
                    .unwrap_or_else(|| "No messages".to_string()),
                message_count: s.messages.len(),
                active: self.active == Some(s.id),
            })
            .collect()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.sessions.len())
            .field("active", &self.active)
            .finish()
    }
}
