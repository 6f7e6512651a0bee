use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use teloxide::utils::html;
use tokio::sync::Mutex as AsyncMutex;

use crate::session::{
    BotError, Feedback, InboundEvent, Reply, SessionMachine, UserId, CUSTOM_GENRE, GENRES,
};
use crate::storage::{PreferenceStore, SessionStore};

const START_BUTTON: &str = "/start";

/// Message for the transport to deliver: HTML text plus reply keyboard
/// buttons. No buttons means the reply keyboard is removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPayload {
    pub text: String,
    pub options: Vec<String>,
}

impl OutboundPayload {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            options: Vec::new(),
        }
    }

    fn with_options(text: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            text: text.into(),
            options,
        }
    }
}

/// One async mutex per user so that events of the same user are handled one
/// after another, in arrival order.
#[derive(Default)]
struct UserLocks {
    inner: Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>,
}

impl UserLocks {
    fn for_user(&self, user: UserId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(user).or_default().clone()
    }

    /// Forgets the lock of `user` unless someone else is holding or waiting
    /// on it. `lock` is the caller's own handle, the map holds the other one.
    fn release(&self, user: UserId, lock: Arc<AsyncMutex<()>>) {
        let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&user);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

pub struct Controller {
    machine: SessionMachine,
    sessions: SessionStore,
    preferences: PreferenceStore,
    locks: UserLocks,
    support_contact: String,
}

impl Controller {
    pub fn new(
        machine: SessionMachine,
        sessions: SessionStore,
        preferences: PreferenceStore,
        support_contact: String,
    ) -> Self {
        Self {
            machine,
            sessions,
            preferences,
            locks: UserLocks::default(),
            support_contact,
        }
    }

    /// Handles one event of `user`. Never fails: problems are logged and the
    /// user gets an apology while their stored session stays untouched.
    pub async fn handle(&self, user: UserId, event: InboundEvent) -> OutboundPayload {
        let lock = self.locks.for_user(user);
        let payload = {
            let _guard = lock.lock().await;

            log::debug!("User {user}: {event:?}");
            match self.try_handle(user, event).await {
                Ok(payload) => payload,
                Err(err) => {
                    log::error!("Failed to handle event of user {user}: {err}");
                    apology(&err)
                }
            }
        };
        self.locks.release(user, lock);
        payload
    }

    async fn try_handle(&self, user: UserId, event: InboundEvent) -> Result<OutboundPayload, BotError> {
        let state = self.sessions.load(user).await?;
        let transition = self.machine.apply(user, &state, event).await?;
        debug_assert!(transition.next.is_consistent());
        self.sessions.save(user, &transition.next).await?;
        // The preference outlives the session, so it is written last
        if let Some(genre) = &transition.chosen_genre {
            self.preferences.set(user, genre).await?;
        }
        Ok(self.render(transition.reply))
    }

    fn render(&self, reply: Reply) -> OutboundPayload {
        match reply {
            Reply::Question {
                feedback,
                item,
                show_genre_tip,
            } => {
                let mut text = String::new();
                match feedback {
                    Some(Feedback::Correct) => text.push_str("✅ Correct! Let's try another one!\n\n"),
                    Some(Feedback::Wrong { correct_answer }) => text.push_str(&format!(
                        "❌ Wrong! The correct answer was: {}\n\n",
                        html::escape(&correct_answer)
                    )),
                    None => {}
                }
                text.push_str(&format!("🎵 {}", html::escape(&item.question)));
                if let Some(hint) = &item.hint {
                    text.push_str(&format!(
                        "\n\n💡 Hint: <tg-spoiler>{}</tg-spoiler>",
                        html::escape(hint)
                    ));
                }
                if show_genre_tip {
                    text.push_str("\n\n<i>Tip: pick a genre with /genre to get questions about the music you like.</i>");
                }
                OutboundPayload::with_options(text, item.option_texts())
            }
            Reply::GenreMenu => {
                OutboundPayload::with_options("🎸 Choose a genre for your questions:", genre_menu())
            }
            Reply::UnknownGenre => OutboundPayload::with_options(
                "Please choose one of the genres below.",
                genre_menu(),
            ),
            Reply::AskCustomGenre => {
                OutboundPayload::text("Type the genre you'd like questions about:")
            }
            Reply::GenreSaved(genre) => OutboundPayload::with_options(
                format!(
                    "Genre set to <b>{}</b>. Send /start to play!",
                    html::escape(&genre)
                ),
                start_button(),
            ),
            Reply::Cancelled => OutboundPayload::with_options(
                "Quiz stopped. Send /start whenever you want to play again.",
                start_button(),
            ),
            Reply::Support => OutboundPayload::text(html::escape(&self.support_contact)),
            Reply::StartFirst => OutboundPayload::with_options(
                "Please start the quiz with /start command",
                start_button(),
            ),
            Reply::Restart => OutboundPayload::with_options(
                "Something went wrong with your quiz. Please restart it with /start",
                start_button(),
            ),
        }
    }
}

fn genre_menu() -> Vec<String> {
    GENRES
        .iter()
        .chain(std::iter::once(&CUSTOM_GENRE))
        .map(|g| g.to_string())
        .collect()
}

fn start_button() -> Vec<String> {
    vec![START_BUTTON.to_string()]
}

fn apology(err: &BotError) -> OutboundPayload {
    let text = match err {
        BotError::Generation(_) => {
            "😔 Sorry, I couldn't come up with a question right now. Please try again in a moment."
        }
        BotError::Store(_) => "😔 Sorry, the quiz is temporarily unavailable. Please try again later.",
    };
    OutboundPayload::with_options(text, start_button())
}
