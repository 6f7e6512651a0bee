//! Per-user conversation phases and the rules for moving between them.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::quiz::generator::QuizGenerator;
use crate::quiz::{GenerationError, QuizItem, ValidationError};
use crate::storage::{PreferenceStore, StoreError};

pub const GENRES: [&str; 6] = ["Rock", "Pop", "Jazz", "Classical", "Hip-Hop", "Electronic"];
pub const CUSTOM_GENRE: &str = "✏️ Custom genre";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Phase {
    #[default]
    Idle,
    Answering,
    SelectingGenre,
    EnteringCustomGenre,
}

/// Where a user is in the conversation.
///
/// `pending_correct_answer` is set exactly when the phase is `Answering`.
/// The constructors keep it that way; a record read back from storage is not
/// trusted to.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SessionState {
    phase: Phase,
    #[serde(default)]
    pending_correct_answer: Option<String>,
}

impl SessionState {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn answering(correct_answer: String) -> Self {
        Self {
            phase: Phase::Answering,
            pending_correct_answer: Some(correct_answer),
        }
    }

    pub fn selecting_genre() -> Self {
        Self {
            phase: Phase::SelectingGenre,
            pending_correct_answer: None,
        }
    }

    pub fn entering_custom_genre() -> Self {
        Self {
            phase: Phase::EnteringCustomGenre,
            pending_correct_answer: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn pending_correct_answer(&self) -> Option<&str> {
        self.pending_correct_answer.as_deref()
    }

    pub fn is_consistent(&self) -> bool {
        (self.phase == Phase::Answering) == self.pending_correct_answer.is_some()
    }
}

/// Something the user did, as seen by the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Start,
    Genre,
    Cancel,
    Support,
    FreeText(String),
    GenreMenuSelection(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feedback {
    Correct,
    Wrong { correct_answer: String },
}

/// What the user should be told after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Question {
        feedback: Option<Feedback>,
        item: QuizItem,
        show_genre_tip: bool,
    },
    GenreMenu,
    UnknownGenre,
    AskCustomGenre,
    GenreSaved(String),
    Cancelled,
    Support,
    StartFirst,
    Restart,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub next: SessionState,
    pub reply: Reply,
    /// Genre to store once `next` has been saved.
    pub chosen_genre: Option<String>,
}

impl Transition {
    fn new(next: SessionState, reply: Reply) -> Self {
        Self {
            next,
            reply,
            chosen_genre: None,
        }
    }

    fn genre_chosen(genre: String) -> Self {
        Self {
            next: SessionState::idle(),
            reply: Reply::GenreSaved(genre.clone()),
            chosen_genre: Some(genre),
        }
    }
}

#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct SessionMachine {
    generator: Arc<QuizGenerator>,
    preferences: PreferenceStore,
}

impl SessionMachine {
    pub fn new(generator: Arc<QuizGenerator>, preferences: PreferenceStore) -> Self {
        Self {
            generator,
            preferences,
        }
    }

    /// Computes the state that follows `state` once `event` is handled.
    ///
    /// Nothing is written here apart from reading the preference; the caller
    /// persists `next` and then `chosen_genre`. On error the caller should
    /// keep `state`.
    pub async fn apply(
        &self,
        user: UserId,
        state: &SessionState,
        event: InboundEvent,
    ) -> Result<Transition, BotError> {
        use InboundEvent::*;

        match (state.phase(), event) {
            (_, Start) => self.next_question(user, None).await,
            (_, Genre) => Ok(Transition::new(
                SessionState::selecting_genre(),
                Reply::GenreMenu,
            )),
            (_, Cancel) => Ok(Transition::new(SessionState::idle(), Reply::Cancelled)),
            (_, Support) => Ok(Transition::new(state.clone(), Reply::Support)),

            (Phase::SelectingGenre, FreeText(label) | GenreMenuSelection(label)) => {
                Ok(select_genre(user, label))
            }
            (Phase::EnteringCustomGenre, FreeText(text) | GenreMenuSelection(text)) => {
                Ok(enter_custom_genre(user, text))
            }
            (Phase::Answering, FreeText(answer) | GenreMenuSelection(answer)) => {
                match state.pending_correct_answer() {
                    Some(correct) => {
                        // Exact comparison, the button text is what gets sent back
                        let feedback = if answer == correct {
                            Feedback::Correct
                        } else {
                            Feedback::Wrong {
                                correct_answer: correct.to_string(),
                            }
                        };
                        self.next_question(user, Some(feedback)).await
                    }
                    None => {
                        log::warn!("User {user} is answering without a pending answer, resetting");
                        Ok(Transition::new(SessionState::idle(), Reply::Restart))
                    }
                }
            }
            (Phase::Idle, FreeText(_) | GenreMenuSelection(_)) => {
                Ok(Transition::new(SessionState::idle(), Reply::StartFirst))
            }
        }
    }

    async fn next_question(
        &self,
        user: UserId,
        feedback: Option<Feedback>,
    ) -> Result<Transition, BotError> {
        let genre = self.preferences.get(user).await?;
        let item = self.generator.generate_item(genre.as_deref()).await?;
        let correct = item
            .correct_answer()
            .ok_or(GenerationError::Invalid(ValidationError::CorrectCount(0)))?
            .to_string();

        let show_genre_tip = genre.is_none() && feedback.is_none();
        Ok(Transition::new(
            SessionState::answering(correct),
            Reply::Question {
                feedback,
                item,
                show_genre_tip,
            },
        ))
    }
}

fn select_genre(user: UserId, label: String) -> Transition {
    if label == CUSTOM_GENRE {
        return Transition::new(SessionState::entering_custom_genre(), Reply::AskCustomGenre);
    }
    if !GENRES.contains(&label.as_str()) {
        return Transition::new(SessionState::selecting_genre(), Reply::UnknownGenre);
    }

    log::info!("User {user} picked genre {label:?}");
    Transition::genre_chosen(label)
}

fn enter_custom_genre(user: UserId, text: String) -> Transition {
    // Tapping the menu button again is not a genre
    if text.trim().is_empty() || text == CUSTOM_GENRE {
        return Transition::new(SessionState::entering_custom_genre(), Reply::AskCustomGenre);
    }

    log::info!("User {user} entered custom genre {text:?}");
    Transition::genre_chosen(text)
}
