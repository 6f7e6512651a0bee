pub mod gemini;
pub mod generator;

use std::collections::HashSet;

use thiserror::Error;

/// One generated quiz question together with its answer options.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QuizItem {
    pub question: String,
    pub options: Vec<AnswerOption>,
    #[serde(default)]
    pub hint: Option<String>,
}

impl QuizItem {
    /// Text of the single correct option.
    ///
    /// Only meaningful after [`QuizItem::validate`] succeeded.
    pub fn correct_answer(&self) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.is_correct)
            .map(|o| o.text.as_str())
    }

    pub fn option_texts(&self) -> Vec<String> {
        self.options.iter().map(|o| o.text.clone()).collect()
    }

    /// Checks the shape the rest of the bot relies on. The upstream model is
    /// asked for exactly this, but nothing guarantees it actually complies.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.question.trim().is_empty() {
            return Err(ValidationError::EmptyQuestion);
        }
        if self.options.len() < 2 {
            return Err(ValidationError::TooFewOptions(self.options.len()));
        }

        let correct = self.options.iter().filter(|o| o.is_correct).count();
        if correct != 1 {
            return Err(ValidationError::CorrectCount(correct));
        }

        let mut seen = HashSet::new();
        for option in &self.options {
            if option.text.trim().is_empty() {
                return Err(ValidationError::EmptyOption);
            }
            if !seen.insert(option.text.as_str()) {
                return Err(ValidationError::DuplicateOption(option.text.clone()));
            }
        }
        Ok(())
    }

    /// Blank hints come back from the model fairly often; treat them as absent.
    pub(crate) fn normalize_hint(mut self) -> Self {
        if self.hint.as_deref().is_some_and(|h| h.trim().is_empty()) {
            self.hint = None;
        }
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnswerOption {
    pub text: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("question text is empty")]
    EmptyQuestion,
    #[error("expected at least 2 options, got {0}")]
    TooFewOptions(usize),
    #[error("expected exactly one correct option, got {0}")]
    CorrectCount(usize),
    #[error("option text is empty")]
    EmptyOption,
    #[error("option {0:?} appears more than once")]
    DuplicateOption(String),
}

/// Why a quiz item could not be produced. Always fatal for the current request.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("upstream still overloaded after {attempts} attempts")]
    Exhausted { attempts: u32 },
    #[error("upstream request failed: {0}")]
    Upstream(String),
    #[error("upstream returned malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("upstream returned an invalid quiz item: {0}")]
    Invalid(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opt(text: &str, is_correct: bool) -> AnswerOption {
        AnswerOption {
            text: text.into(),
            is_correct,
        }
    }

    fn item(options: Vec<AnswerOption>) -> QuizItem {
        QuizItem {
            question: "Who wrote Bolero?".into(),
            options,
            hint: None,
        }
    }

    #[test]
    fn valid_item_passes() {
        let item = item(vec![
            opt("Ravel", true),
            opt("Debussy", false),
            opt("Satie", false),
        ]);
        assert_eq!(item.validate(), Ok(()));
        assert_eq!(item.correct_answer(), Some("Ravel"));
    }

    #[test]
    fn rejects_zero_or_two_correct() {
        let none = item(vec![
            opt("Ravel", false),
            opt("Debussy", false),
        ]);
        assert_eq!(none.validate(), Err(ValidationError::CorrectCount(0)));

        let two = item(vec![
            opt("Ravel", true),
            opt("Debussy", true),
        ]);
        assert_eq!(two.validate(), Err(ValidationError::CorrectCount(2)));
    }

    #[test]
    fn rejects_single_option() {
        let single = item(vec![opt("Ravel", true)]);
        assert_eq!(single.validate(), Err(ValidationError::TooFewOptions(1)));
    }

    #[test]
    fn rejects_duplicate_option_text() {
        let dup = item(vec![
            opt("Ravel", true),
            opt("Ravel", false),
        ]);
        assert_eq!(
            dup.validate(),
            Err(ValidationError::DuplicateOption("Ravel".into()))
        );
    }

    #[test]
    fn rejects_blank_question() {
        let blank = QuizItem {
            question: "  ".into(),
            ..item(vec![opt("a", true), opt("b", false)])
        };
        assert_eq!(blank.validate(), Err(ValidationError::EmptyQuestion));
    }

    #[test]
    fn blank_hint_becomes_none() {
        let item = QuizItem {
            hint: Some(" ".into()),
            ..item(vec![])
        }
        .normalize_hint();
        assert_eq!(item.hint, None);
    }
}
