use super::document::timestamp;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sessions kept per user
pub const MAX_SESSIONS: usize = 10;

/// Turns kept per session
pub const MAX_TURNS: usize = 10;

/// Words of the first user message kept in a session summary
pub const SUMMARY_WORDS: usize = 10;

/// One user/assistant round ("exchange" in the persisted document)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// When the turn happened
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Local>,
    /// Model (or model display name) that answered
    #[serde(default)]
    pub model: String,
    /// What the user sent
    #[serde(default)]
    pub user_message: String,
    /// Assistant reply as plain text/markdown
    #[serde(default)]
    pub ai_response: String,
    /// Assistant reply rendered to HTML
    #[serde(default)]
    pub ai_response_html: String,
    /// Whether an upload accompanied the turn
    #[serde(default)]
    pub has_file: bool,
    /// Name of the uploaded or generated file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Path of a generated file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_file: Option<String>,
    /// URL of a generated image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl ChatTurn {
    /// Plain text turn
    pub fn text(
        timestamp: DateTime<Local>,
        model: impl Into<String>,
        user_message: impl Into<String>,
        ai_response: impl Into<String>,
        ai_response_html: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            model: model.into(),
            user_message: user_message.into(),
            ai_response: ai_response.into(),
            ai_response_html: ai_response_html.into(),
            has_file: false,
            file_name: None,
            generated_file: None,
            image_url: None,
        }
    }

    /// Turn that carried an upload
    ///
    /// A blank message is replaced by the `[File uploaded: <name>]` placeholder.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::Local;
    /// use nebenchat::session::ChatTurn;
    ///
    /// let turn = ChatTurn::with_attachment(Local::now(), "gpt-5", "", "report.pdf", "ok", "ok");
    /// assert_eq!(turn.user_message, "[File uploaded: report.pdf]");
    /// assert!(turn.has_file);
    /// ```
    pub fn with_attachment(
        timestamp: DateTime<Local>,
        model: impl Into<String>,
        user_message: impl Into<String>,
        file_name: impl Into<String>,
        ai_response: impl Into<String>,
        ai_response_html: impl Into<String>,
    ) -> Self {
        let file_name = file_name.into();
        let mut user_message = user_message.into();
        if user_message.trim().is_empty() {
            user_message = format!("[File uploaded: {}]", file_name);
        }
        Self {
            has_file: true,
            file_name: Some(file_name),
            ..Self::text(timestamp, model, user_message, ai_response, ai_response_html)
        }
    }

    /// Turn that produced a downloadable file at `path`
    pub fn generated_file(
        timestamp: DateTime<Local>,
        model: impl Into<String>,
        file_type: &str,
        prompt: &str,
        file_name: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        let file_name = file_name.into();
        let turn = Self::text(
            timestamp,
            model,
            format!("Generate {} file: {}", file_type, prompt),
            format!("Generated file: {}", file_name),
            format!("Generated file: <strong>{}</strong>", file_name),
        );
        Self {
            file_name: Some(file_name),
            generated_file: Some(path.into()),
            ..turn
        }
    }

    /// Turn that produced an image hosted at `image_url`
    pub fn generated_image(
        timestamp: DateTime<Local>,
        model_display: impl Into<String>,
        prompt: &str,
        image_url: impl Into<String>,
    ) -> Self {
        let model_display = model_display.into();
        Self {
            image_url: Some(image_url.into()),
            ..Self::text(
                timestamp,
                model_display.clone(),
                format!("Generate image: {}", prompt),
                format!("Generated image using {}", model_display),
                String::new(),
            )
        }
    }
}

/// Speaker of a context message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human side
    User,
    /// The model side
    Assistant,
}

/// One entry of the rolling window sent to the completion API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMessage {
    /// Who said it
    pub role: Role,
    /// What was said
    pub content: String,
}

/// Ordered run of turns sharing one conversation context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    /// Unique identifier
    pub session_id: String,
    /// When the session was opened
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Local>,
    /// Last change to the session
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Local>,
    /// First words of the opening message
    #[serde(default)]
    pub summary: String,
    /// Vector store tied to this session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_store_id: Option<String>,
    /// Turns, oldest first
    #[serde(default)]
    pub exchanges: Vec<ChatTurn>,
}

impl ChatSession {
    /// Open an empty session with a fresh id
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            summary: String::new(),
            vector_store_id: None,
            exchanges: Vec::new(),
        }
    }

    /// Whether the session has no turns yet
    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    /// Timestamp of the latest turn, or `updated_at` for an empty session
    pub fn last_activity(&self) -> DateTime<Local> {
        self.exchanges
            .last()
            .map(|turn| turn.timestamp)
            .unwrap_or(self.updated_at)
    }

    /// Append a turn, keeping at most `max_turns`
    ///
    /// Returns the turns that fell off the front, oldest first.
    pub fn push_turn(&mut self, turn: ChatTurn, max_turns: usize) -> Vec<ChatTurn> {
        self.updated_at = turn.timestamp;
        self.exchanges.push(turn);
        if self.summary.is_empty() {
            self.refresh_summary();
        }

        let overflow = self.exchanges.len().saturating_sub(max_turns.max(1));
        self.exchanges.drain(..overflow).collect()
    }

    /// Recompute the summary from the first turn
    pub fn refresh_summary(&mut self) {
        self.summary = self
            .exchanges
            .first()
            .map(|turn| summarize(&turn.user_message))
            .unwrap_or_default();
    }

    /// Rolling user/assistant window for the next completion
    ///
    /// Empty user messages and empty replies are skipped.
    pub fn context_messages(&self) -> Vec<ContextMessage> {
        let mut messages = Vec::with_capacity(self.exchanges.len() * 2);
        for turn in &self.exchanges {
            if !turn.user_message.is_empty() {
                messages.push(ContextMessage {
                    role: Role::User,
                    content: turn.user_message.clone(),
                });
            }
            if !turn.ai_response.is_empty() {
                messages.push(ContextMessage {
                    role: Role::Assistant,
                    content: turn.ai_response.clone(),
                });
            }
        }
        messages
    }
}

/// First [`SUMMARY_WORDS`] words of `text`, with `...` when truncated
///
/// # Examples
///
/// ```
/// use nebenchat::session::summarize;
///
/// assert_eq!(summarize("hello there"), "hello there");
/// assert_eq!(
///     summarize("one two three four five six seven eight nine ten eleven"),
///     "one two three four five six seven eight nine ten..."
/// );
/// ```
pub fn summarize(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut summary = words
        .iter()
        .take(SUMMARY_WORDS)
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    if words.len() > SUMMARY_WORDS {
        summary.push_str("...");
    }
    summary
}

/// A user's sessions, oldest first; the last one is current
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionCollection {
    sessions: Vec<ChatSession>,
}

impl SessionCollection {
    /// Empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions, oldest first
    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    /// Number of sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether there are no sessions
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// The current (most recent) session
    pub fn current(&self) -> Option<&ChatSession> {
        self.sessions.last()
    }

    /// Detach the current session
    pub fn take_current(&mut self) -> Option<ChatSession> {
        self.sessions.pop()
    }

    /// Append a session, making it current
    pub fn push(&mut self, session: ChatSession) {
        self.sessions.push(session);
    }

    /// Look a session up by id
    pub fn find(&self, session_id: &str) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| s.session_id == session_id)
    }

    /// Mutable lookup by id
    pub fn find_mut(&mut self, session_id: &str) -> Option<&mut ChatSession> {
        self.sessions.iter_mut().find(|s| s.session_id == session_id)
    }

    /// Drop every session with `session_id`, returning the last one removed
    pub fn remove(&mut self, session_id: &str) -> Option<ChatSession> {
        let mut removed = None;
        let mut kept = Vec::with_capacity(self.sessions.len());
        for session in self.sessions.drain(..) {
            if session.session_id == session_id {
                removed = Some(session);
            } else {
                kept.push(session);
            }
        }
        self.sessions = kept;
        removed
    }

    /// Remove the oldest sessions beyond `max_sessions`, returning them
    pub fn take_overflow(&mut self, max_sessions: usize) -> Vec<ChatSession> {
        let overflow = self.sessions.len().saturating_sub(max_sessions.max(1));
        self.sessions.drain(..overflow).collect()
    }

    /// Iterate sessions, oldest first
    pub fn iter(&self) -> std::slice::Iter<'_, ChatSession> {
        self.sessions.iter()
    }

    /// Consume into the underlying list
    pub fn into_sessions(self) -> Vec<ChatSession> {
        self.sessions
    }
}

impl From<Vec<ChatSession>> for SessionCollection {
    fn from(sessions: Vec<ChatSession>) -> Self {
        Self { sessions }
    }
}

impl<'a> IntoIterator for &'a SessionCollection {
    type Item = &'a ChatSession;
    type IntoIter = std::slice::Iter<'a, ChatSession>;

    fn into_iter(self) -> Self::IntoIter {
        self.sessions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn turn_at(now: DateTime<Local>, message: &str) -> ChatTurn {
        ChatTurn::text(now, "gpt-5", message, format!("re: {message}"), "")
    }

    #[test]
    fn test_push_turn_sets_summary_and_updated_at() {
        let start = Local::now();
        let mut session = ChatSession::new(start);
        let later = start + Duration::seconds(5);
        let evicted = session.push_turn(turn_at(later, "What is the capital of France?"), MAX_TURNS);

        assert!(evicted.is_empty());
        assert_eq!(session.summary, "What is the capital of France?");
        assert_eq!(session.updated_at, later);
        assert_eq!(session.last_activity(), later);
    }

    #[test]
    fn test_push_turn_evicts_oldest_beyond_cap() {
        let now = Local::now();
        let mut session = ChatSession::new(now);
        let mut evicted = Vec::new();
        for i in 0..12 {
            evicted.extend(session.push_turn(turn_at(now, &format!("message {i}")), MAX_TURNS));
        }

        assert_eq!(session.exchanges.len(), MAX_TURNS);
        assert_eq!(session.exchanges[0].user_message, "message 2");
        assert_eq!(
            evicted.iter().map(|t| t.user_message.as_str()).collect::<Vec<_>>(),
            vec!["message 0", "message 1"]
        );
        // summary stays with the message that opened the session
        assert_eq!(session.summary, "message 0");
    }

    #[test]
    fn test_summarize_truncates_after_ten_words() {
        assert_eq!(summarize(""), "");
        assert_eq!(summarize("  spaced   out  "), "spaced out");
        assert_eq!(
            summarize("a b c d e f g h i j"),
            "a b c d e f g h i j",
            "exactly ten words are not truncated"
        );
        assert_eq!(summarize("a b c d e f g h i j k"), "a b c d e f g h i j...");
    }

    #[test]
    fn test_context_messages_skip_empty_content() {
        let now = Local::now();
        let mut session = ChatSession::new(now);
        session.push_turn(turn_at(now, "hi"), MAX_TURNS);
        session.push_turn(ChatTurn::text(now, "gpt-5", "", "orphan reply", ""), MAX_TURNS);
        session.push_turn(ChatTurn::text(now, "gpt-5", "no reply", "", ""), MAX_TURNS);

        let messages = session.context_messages();
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::Assistant, Role::User]
        );
        assert_eq!(messages[2].content, "orphan reply");
        assert_eq!(messages[3].content, "no reply");
    }

    #[test]
    fn test_attachment_placeholder_only_for_blank_message() {
        let now = Local::now();
        let blank = ChatTurn::with_attachment(now, "gpt-5", "  ", "a.png", "ok", "ok");
        assert_eq!(blank.user_message, "[File uploaded: a.png]");

        let described = ChatTurn::with_attachment(now, "gpt-5", "see this", "a.png", "ok", "ok");
        assert_eq!(described.user_message, "see this");
        assert_eq!(described.file_name.as_deref(), Some("a.png"));
    }

    #[test]
    fn test_generated_turns() {
        let now = Local::now();
        let file = ChatTurn::generated_file(
            now,
            "gpt-5",
            "csv",
            "sales by month",
            "sales.csv",
            "generated_files/neben_1700000000_sales.csv",
        );
        assert_eq!(file.user_message, "Generate csv file: sales by month");
        assert_eq!(file.ai_response_html, "Generated file: <strong>sales.csv</strong>");
        assert_eq!(file.file_name.as_deref(), Some("sales.csv"));
        assert!(!file.has_file);

        let image = ChatTurn::generated_image(now, "DALL-E 3 (1024x1024)", "a cat", "https://img/1");
        assert_eq!(image.ai_response, "Generated image using DALL-E 3 (1024x1024)");
        assert_eq!(image.image_url.as_deref(), Some("https://img/1"));
    }

    #[test]
    fn test_optional_fields_omitted_when_absent() {
        let turn = turn_at(Local::now(), "hi");
        let value = serde_json::to_value(&turn).unwrap();
        assert!(value.get("file_name").is_none());
        assert!(value.get("generated_file").is_none());
        assert!(value.get("image_url").is_none());
        assert_eq!(value["has_file"], false);
    }

    #[test]
    fn test_collection_take_overflow_keeps_newest() {
        let now = Local::now();
        let mut collection: SessionCollection =
            (0..12).map(|_| ChatSession::new(now)).collect::<Vec<_>>().into();
        let ids: Vec<String> = collection.iter().map(|s| s.session_id.clone()).collect();

        let evicted = collection.take_overflow(MAX_SESSIONS);
        assert_eq!(evicted.len(), 2);
        assert_eq!(evicted[0].session_id, ids[0]);
        assert_eq!(evicted[1].session_id, ids[1]);
        assert_eq!(collection.len(), MAX_SESSIONS);
        assert_eq!(collection.sessions()[0].session_id, ids[2]);
    }

    #[test]
    fn test_collection_remove_drops_duplicates() {
        let now = Local::now();
        let session = ChatSession::new(now);
        let other = ChatSession::new(now);
        let mut collection =
            SessionCollection::from(vec![session.clone(), other.clone(), session.clone()]);

        assert!(collection.remove(&session.session_id).is_some());
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.current(), Some(&other));
        assert!(collection.remove("missing").is_none());
    }
}
