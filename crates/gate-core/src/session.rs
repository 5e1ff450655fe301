//! Intake Session
//!
//! The per-user dialog state machine: one question at a time, validated on
//! the way in, terminal once completed, expired, or cancelled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::form::{self, CompletedForm, ContactForm};

/// Messaging-platform user/chat identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique session token, distinguishes a session from any successor for the
/// same user when a stale timer fires.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Dialog stage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    AwaitingName,
    AwaitingEmail,
    AwaitingPhone,
    Completed,
    Expired,
    Cancelled,
}

impl Stage {
    /// Terminal stages admit no further transition.
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Expired | Stage::Cancelled)
    }
}

/// Outbound prompt for the next turn of the dialog
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Prompt {
    AskName,
    AskEmail,
    InvalidEmail,
    AskPhone,
    InvalidPhone,
}

impl Prompt {
    /// User-facing text for this prompt
    pub fn text(self) -> &'static str {
        match self {
            Prompt::AskName => "Let's get you signed up! What's your full name?",
            Prompt::AskEmail => "Thanks! What's your email address?",
            Prompt::InvalidEmail => {
                "That doesn't look like a valid email address. Please try again."
            }
            Prompt::AskPhone => "Almost done. What's your phone number?",
            Prompt::InvalidPhone => {
                "That doesn't look like a valid phone number. Please send 10-15 digits."
            }
        }
    }
}

/// Result of feeding one inbound message to a session
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Turn {
    /// Next question (or a re-prompt after invalid input)
    Prompt(Prompt),

    /// Input started with the command marker and was not consumed
    CommandIgnored,

    /// All fields collected; the session is terminal
    Completed(CompletedForm),
}

/// One user's in-progress intake form
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    /// Unique token for this session instance
    pub id: SessionId,

    /// Owning user
    pub user_id: UserId,

    /// Current dialog stage
    pub stage: Stage,

    /// Fields collected so far
    pub form: ContactForm,

    /// Creation timestamp
    pub started_at: DateTime<Utc>,

    /// Deadline after which the session expires
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Create a new session at the first stage.
    pub fn new(user_id: UserId, timeout: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            user_id,
            stage: Stage::AwaitingName,
            form: ContactForm::default(),
            started_at: now,
            expires_at: now + timeout,
        }
    }

    /// Apply one inbound message to the dialog.
    ///
    /// Invalid field input re-prompts without mutating the form. Command
    /// input (leading `/`) is never consumed as a field. Must not be called
    /// once the session is terminal; the store enforces that.
    pub fn apply(&mut self, input: &str) -> Turn {
        debug_assert!(!self.stage.is_terminal());

        let input = input.trim();
        if input.starts_with('/') {
            return Turn::CommandIgnored;
        }

        match self.stage {
            Stage::AwaitingName => {
                if !form::is_valid_name(input) {
                    return Turn::Prompt(Prompt::AskName);
                }
                self.form.name = Some(input.to_string());
                self.stage = Stage::AwaitingEmail;
                Turn::Prompt(Prompt::AskEmail)
            }
            Stage::AwaitingEmail => {
                if !form::is_valid_email(input) {
                    return Turn::Prompt(Prompt::InvalidEmail);
                }
                self.form.email = Some(input.to_string());
                self.stage = Stage::AwaitingPhone;
                Turn::Prompt(Prompt::AskPhone)
            }
            Stage::AwaitingPhone => {
                if !form::is_valid_phone(input) {
                    return Turn::Prompt(Prompt::InvalidPhone);
                }
                self.form.phone = Some(input.to_string());
                self.stage = Stage::Completed;
                // All three fields are present at this point.
                let completed = self
                    .form
                    .clone()
                    .into_completed()
                    .unwrap_or_else(|| unreachable!("completed session missing fields"));
                Turn::Completed(completed)
            }
            Stage::Completed | Stage::Expired | Stage::Cancelled => Turn::CommandIgnored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(UserId(42), chrono::Duration::minutes(10))
    }

    #[test]
    fn test_happy_path_collects_trimmed_fields() {
        let mut s = session();
        assert_eq!(s.apply("  Maria Silva  "), Turn::Prompt(Prompt::AskEmail));
        assert_eq!(s.stage, Stage::AwaitingEmail);

        assert_eq!(
            s.apply(" maria@example.com "),
            Turn::Prompt(Prompt::AskPhone)
        );
        assert_eq!(s.stage, Stage::AwaitingPhone);

        let turn = s.apply("+55 11 98765-4321");
        let Turn::Completed(form) = turn else {
            panic!("expected completion, got {turn:?}");
        };
        assert_eq!(form.name, "Maria Silva");
        assert_eq!(form.email, "maria@example.com");
        assert_eq!(form.phone, "+55 11 98765-4321");
        assert_eq!(s.stage, Stage::Completed);
    }

    #[test]
    fn test_invalid_email_reprompts_without_mutation() {
        let mut s = session();
        s.apply("Maria");

        assert_eq!(s.apply("not-an-email"), Turn::Prompt(Prompt::InvalidEmail));
        assert_eq!(s.stage, Stage::AwaitingEmail);
        assert_eq!(s.form.email, None);
    }

    #[test]
    fn test_invalid_phone_reprompts() {
        let mut s = session();
        s.apply("Maria");
        s.apply("maria@example.com");

        assert_eq!(s.apply("12345"), Turn::Prompt(Prompt::InvalidPhone));
        assert_eq!(s.stage, Stage::AwaitingPhone);
        assert_eq!(s.form.phone, None);
    }

    #[test]
    fn test_commands_are_not_consumed_as_fields() {
        let mut s = session();
        assert_eq!(s.apply("/help"), Turn::CommandIgnored);
        assert_eq!(s.stage, Stage::AwaitingName);
        assert_eq!(s.form.name, None);
    }

    #[test]
    fn test_terminal_stages() {
        assert!(Stage::Completed.is_terminal());
        assert!(Stage::Expired.is_terminal());
        assert!(Stage::Cancelled.is_terminal());
        assert!(!Stage::AwaitingEmail.is_terminal());
    }
}
