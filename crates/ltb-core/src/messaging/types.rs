use crate::{
    domain::{ChatId, ChatKind, ChatProfile, MessageId, MessageRef, UserProfile},
    utils::truncate_text,
};

/// Incoming update, already stripped of Telegram-specific fields.
#[derive(Clone, Debug)]
pub enum IncomingUpdate {
    Command(Command),
    GroupMessage(GroupMessage),
    Callback(CallbackQuery),
}

/// `/name args` sent by a user.
#[derive(Clone, Debug)]
pub struct Command {
    pub chat_id: ChatId,
    pub chat_kind: ChatKind,
    pub from: UserProfile,
    pub name: String,
    pub args: String,
}

/// Any non-command message observed in a group, supergroup or channel.
#[derive(Clone, Debug)]
pub struct GroupMessage {
    pub chat: ChatProfile,
    pub from: UserProfile,
    pub message_id: MessageId,
    /// Text or caption, if any.
    pub text: Option<String>,
}

#[derive(Clone, Debug)]
pub struct CallbackQuery {
    pub chat_id: ChatId,
    pub from: UserProfile,
    pub callback_id: String,
    pub data: String,
    /// Message carrying the keyboard, when Telegram still has it.
    pub message: Option<MessageRef>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatAction {
    UploadDocument,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ButtonAction {
    Callback(String),
    Url(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub action: ButtonAction,
}

impl InlineButton {
    pub fn callback(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Callback(data.into()),
        }
    }

    pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Url(url.into()),
        }
    }

    /// Shorten the label to at most `max_len` characters (ellipsis included).
    pub fn truncated(mut self, max_len: usize) -> Self {
        self.label = truncate_text(&self.label, max_len);
        self
    }
}

/// Inline keyboard as rows of buttons.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    pub fn new(rows: Vec<Vec<InlineButton>>) -> Self {
        Self { rows }
    }

    pub fn one_per_row(buttons: Vec<InlineButton>) -> Self {
        Self {
            rows: buttons.into_iter().map(|b| vec![b]).collect(),
        }
    }

    pub fn single(button: InlineButton) -> Self {
        Self {
            rows: vec![vec![button]],
        }
    }

    pub fn buttons(&self) -> impl Iterator<Item = &InlineButton> {
        self.rows.iter().flatten()
    }
}

/// A file sent as a chat document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingDocument {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub caption: Option<String>,
}

/// What a messenger implementation can do.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    /// Sent messages can be edited in place; otherwise a new message is sent.
    pub supports_edit: bool,
    /// Hard upper bound on one message body.
    pub max_message_len: usize,
}
