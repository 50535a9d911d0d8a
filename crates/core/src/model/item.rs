use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

use crate::model::ids::ItemId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ItemContentError {
    #[error("item prompt cannot be empty")]
    EmptyPrompt,

    #[error("item needs at least 2 options, got {got}")]
    TooFewOptions { got: usize },

    #[error("item allows at most 8 options, got {got}")]
    TooManyOptions { got: usize },

    #[error("option {index} is empty")]
    EmptyOption { index: usize },

    #[error("invalid figure url: {0}")]
    InvalidFigure(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ItemError {
    #[error("item category cannot be empty")]
    EmptyCategory,

    #[error("item topic cannot be empty")]
    EmptyTopic,

    #[error("unknown difficulty tier: {0}")]
    UnknownDifficulty(String),

    #[error(transparent)]
    Content(#[from] ItemContentError),
}

//
// ─── DIFFICULTY ────────────────────────────────────────────────────────────────
//

/// Difficulty tier of an exam item.
///
/// Ordered so that `Easy < Medium < Hard`; the session pace controller relies
/// on this ordering when it biases the unserved tail toward easier items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// Stable string form used for persistence.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = ItemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(ItemError::UnknownDifficulty(other.to_string())),
        }
    }
}

//
// ─── CONTENT ───────────────────────────────────────────────────────────────────
//

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 8;

/// Validated multiple-choice payload: prompt, option texts, optional figure.
///
/// The correct-option index deliberately lives outside this type (and outside
/// `Item` entirely); content served to a session never carries the answer key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemContent {
    prompt: String,
    options: Vec<String>,
    figure: Option<Url>,
}

impl ItemContent {
    /// Validates and builds the content payload.
    ///
    /// # Errors
    ///
    /// Returns `ItemContentError` when the prompt is blank, the option count
    /// is outside `[MIN_OPTIONS, MAX_OPTIONS]`, any option is blank, or the
    /// figure is not a parseable URL.
    pub fn new(
        prompt: impl Into<String>,
        options: Vec<String>,
        figure: Option<&str>,
    ) -> Result<Self, ItemContentError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(ItemContentError::EmptyPrompt);
        }
        if options.len() < MIN_OPTIONS {
            return Err(ItemContentError::TooFewOptions { got: options.len() });
        }
        if options.len() > MAX_OPTIONS {
            return Err(ItemContentError::TooManyOptions { got: options.len() });
        }
        for (index, option) in options.iter().enumerate() {
            if option.trim().is_empty() {
                return Err(ItemContentError::EmptyOption { index });
            }
        }
        let figure = figure
            .map(|raw| Url::parse(raw).map_err(|e| ItemContentError::InvalidFigure(e.to_string())))
            .transpose()?;

        Ok(Self {
            prompt,
            options,
            figure,
        })
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    /// Number of answer options.
    #[must_use]
    pub fn option_count(&self) -> usize {
        self.options.len()
    }

    #[must_use]
    pub fn figure(&self) -> Option<&Url> {
        self.figure.as_ref()
    }
}

//
// ─── ITEM ──────────────────────────────────────────────────────────────────────
//

/// One exam item as served to a session.
///
/// Carries everything the UI needs and nothing it must not have: there is no
/// correct-option field here. The answer key stays in the catalog store and
/// is only reachable through the score aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    id: ItemId,
    category: String,
    topic: String,
    difficulty: Difficulty,
    content: ItemContent,
}

impl Item {
    /// Builds an item, validating category and topic.
    ///
    /// # Errors
    ///
    /// Returns `ItemError` if category or topic is blank.
    pub fn new(
        id: ItemId,
        category: impl Into<String>,
        topic: impl Into<String>,
        difficulty: Difficulty,
        content: ItemContent,
    ) -> Result<Self, ItemError> {
        let category = category.into();
        if category.trim().is_empty() {
            return Err(ItemError::EmptyCategory);
        }
        let topic = topic.into();
        if topic.trim().is_empty() {
            return Err(ItemError::EmptyTopic);
        }
        Ok(Self {
            id,
            category,
            topic,
            difficulty,
            content,
        })
    }

    #[must_use]
    pub fn id(&self) -> ItemId {
        self.id
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    #[must_use]
    pub fn content(&self) -> &ItemContent {
        &self.content
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn two_options() -> Vec<String> {
        vec!["a".to_string(), "b".to_string()]
    }

    #[test]
    fn content_rejects_blank_prompt() {
        let err = ItemContent::new("   ", two_options(), None).unwrap_err();
        assert_eq!(err, ItemContentError::EmptyPrompt);
    }

    #[test]
    fn content_rejects_too_few_options() {
        let err = ItemContent::new("Q", vec!["only".to_string()], None).unwrap_err();
        assert!(matches!(err, ItemContentError::TooFewOptions { got: 1 }));
    }

    #[test]
    fn content_rejects_too_many_options() {
        let options: Vec<String> = (0..9).map(|i| format!("o{i}")).collect();
        let err = ItemContent::new("Q", options, None).unwrap_err();
        assert!(matches!(err, ItemContentError::TooManyOptions { got: 9 }));
    }

    #[test]
    fn content_rejects_blank_option() {
        let options = vec!["a".to_string(), " ".to_string(), "c".to_string()];
        let err = ItemContent::new("Q", options, None).unwrap_err();
        assert!(matches!(err, ItemContentError::EmptyOption { index: 1 }));
    }

    #[test]
    fn content_rejects_bad_figure_url() {
        let err = ItemContent::new("Q", two_options(), Some("not a url")).unwrap_err();
        assert!(matches!(err, ItemContentError::InvalidFigure(_)));
    }

    #[test]
    fn content_accepts_figure_url() {
        let content =
            ItemContent::new("Q", two_options(), Some("https://cdn.example.com/fig.png")).unwrap();
        assert_eq!(content.figure().unwrap().host_str(), Some("cdn.example.com"));
        assert_eq!(content.option_count(), 2);
    }

    #[test]
    fn item_validates_category_and_topic() {
        let content = ItemContent::new("Q", two_options(), None).unwrap();
        let err = Item::new(ItemId::new(1), "", "algebra", Difficulty::Easy, content.clone())
            .unwrap_err();
        assert_eq!(err, ItemError::EmptyCategory);

        let err =
            Item::new(ItemId::new(1), "math", "  ", Difficulty::Easy, content).unwrap_err();
        assert_eq!(err, ItemError::EmptyTopic);
    }

    #[test]
    fn difficulty_orders_easy_to_hard() {
        assert!(Difficulty::Easy < Difficulty::Medium);
        assert!(Difficulty::Medium < Difficulty::Hard);
    }

    #[test]
    fn difficulty_round_trips_as_str() {
        for tier in [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard] {
            assert_eq!(tier.as_str().parse::<Difficulty>().unwrap(), tier);
        }
        assert!(matches!(
            "extreme".parse::<Difficulty>(),
            Err(ItemError::UnknownDifficulty(_))
        ));
    }
}
