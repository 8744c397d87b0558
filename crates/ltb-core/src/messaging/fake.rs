//! In-memory [`MessagingPort`] for tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId, MessageRef},
    messaging::{
        port::MessagingPort,
        types::{ChatAction, InlineKeyboard, MessagingCapabilities, OutgoingDocument},
    },
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Sent {
    Html(ChatId, String),
    Keyboard(ChatId, String, InlineKeyboard),
    Document(ChatId, OutgoingDocument),
}

pub(crate) struct FakeMessenger {
    caps: MessagingCapabilities,
    next_id: Mutex<i32>,
    pub(crate) sent: Mutex<Vec<Sent>>,
    pub(crate) edits: Mutex<Vec<(MessageRef, String, Option<InlineKeyboard>)>>,
    pub(crate) answers: Mutex<Vec<(String, Option<String>, bool)>>,
}

impl FakeMessenger {
    pub(crate) fn new() -> Self {
        Self::with_capabilities(MessagingCapabilities {
            supports_edit: true,
            max_message_len: 4096,
        })
    }

    pub(crate) fn with_capabilities(caps: MessagingCapabilities) -> Self {
        Self {
            caps,
            next_id: Mutex::new(1),
            sent: Mutex::default(),
            edits: Mutex::default(),
            answers: Mutex::default(),
        }
    }

    fn alloc(&self, chat_id: ChatId) -> MessageRef {
        let mut guard = self.next_id.lock().unwrap();
        let id = *guard;
        *guard += 1;
        MessageRef {
            chat_id,
            message_id: MessageId(id),
        }
    }

    /// Text of every sent message (plain or with keyboard), in order.
    pub(crate) fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| match s {
                Sent::Html(_, t) | Sent::Keyboard(_, t, _) => Some(t.clone()),
                Sent::Document(..) => None,
            })
            .collect()
    }

    pub(crate) fn last_text(&self) -> String {
        self.sent_texts().pop().unwrap_or_default()
    }

    pub(crate) fn keyboards(&self) -> Vec<InlineKeyboard> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| match s {
                Sent::Keyboard(_, _, kb) => Some(kb.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn documents(&self) -> Vec<OutgoingDocument> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| match s {
                Sent::Document(_, d) => Some(d.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        self.caps
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.sent
            .lock()
            .unwrap()
            .push(Sent::Html(chat_id, html.to_string()));
        Ok(self.alloc(chat_id))
    }

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
        self.edits.lock().unwrap().push((msg, html.to_string(), None));
        Ok(())
    }

    async fn send_chat_action(&self, _chat_id: ChatId, _action: ChatAction) -> Result<()> {
        Ok(())
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.sent
            .lock()
            .unwrap()
            .push(Sent::Keyboard(chat_id, html.to_string(), keyboard));
        Ok(self.alloc(chat_id))
    }

    async fn edit_inline_keyboard(
        &self,
        msg: MessageRef,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<()> {
        self.edits
            .lock()
            .unwrap()
            .push((msg, html.to_string(), Some(keyboard)));
        Ok(())
    }

    async fn send_document(&self, chat_id: ChatId, doc: OutgoingDocument) -> Result<MessageRef> {
        self.sent.lock().unwrap().push(Sent::Document(chat_id, doc));
        Ok(self.alloc(chat_id))
    }

    async fn answer_callback_query(
        &self,
        callback_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<()> {
        self.answers.lock().unwrap().push((
            callback_id.to_string(),
            text.map(str::to_string),
            show_alert,
        ));
        Ok(())
    }
}
