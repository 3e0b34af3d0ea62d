use std::fmt;

use serde::{Deserialize, Serialize};

/// Visual bucket deciding which sub-pool of images is eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    General,
    Concert,
    Vinyl,
}

impl Category {
    /// Every category, in pool concatenation order.
    pub const ALL: [Category; 3] = [Category::General, Category::Concert, Category::Vinyl];

    /// Categories tested by keyword, highest priority first. `General` is the
    /// default and is never scanned.
    const PRIORITY: [Category; 2] = [Category::Concert, Category::Vinyl];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::General => "general",
            Category::Concert => "concert",
            Category::Vinyl => "vinyl",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Substrings that pull a classification input towards a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordTable {
    #[serde(default)]
    pub concert: Vec<String>,
    #[serde(default)]
    pub vinyl: Vec<String>,
    /// Kept for completeness; `general` wins by default whether or not one of
    /// these matches.
    #[serde(default)]
    pub general: Vec<String>,
}

impl KeywordTable {
    pub fn keywords(&self, category: Category) -> &[String] {
        match category {
            Category::General => &self.general,
            Category::Concert => &self.concert,
            Category::Vinyl => &self.vinyl,
        }
    }

    fn normalised(mut self) -> Self {
        for list in [&mut self.concert, &mut self.vinyl, &mut self.general] {
            for keyword in list.iter_mut() {
                *keyword = keyword.to_lowercase();
            }
            list.retain(|keyword| !keyword.is_empty());
        }
        self
    }
}

impl Default for KeywordTable {
    fn default() -> Self {
        fn words(list: &[&str]) -> Vec<String> {
            list.iter().map(|word| word.to_string()).collect()
        }

        Self {
            concert: words(&["concert", "live", "stage", "performance", "show", "festival"]),
            vinyl: words(&["vinyl", "record", "retro", "classic", "vintage", "old school"]),
            general: words(&["music", "song", "track", "artist", "band", "album", "sound"]),
        }
    }
}

/// The free-text signals a context-driven backdrop reacts to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchContext {
    pub query: String,
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
}

impl SearchContext {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_mood(mut self, mood: impl Into<String>) -> Self {
        self.mood = Some(mood.into());
        self
    }

    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }

    pub fn has_query(&self) -> bool {
        !self.query.is_empty()
    }

    /// Joins query, mood and genre into the lower-cased text the classifier
    /// scans. Missing labels contribute an empty segment.
    pub fn classification_text(&self) -> String {
        format!(
            "{} {} {}",
            self.query,
            self.mood.as_deref().unwrap_or_default(),
            self.genre.as_deref().unwrap_or_default()
        )
        .to_lowercase()
    }
}

/// Outcome of a classification along with the keyword that decided it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub category: Category,
    pub keyword: Option<String>,
}

/// Keyword classifier mapping free text onto a [`Category`].
#[derive(Debug, Clone)]
pub struct Classifier {
    keywords: KeywordTable,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(KeywordTable::default())
    }
}

impl Classifier {
    pub fn new(keywords: KeywordTable) -> Self {
        Self {
            keywords: keywords.normalised(),
        }
    }

    pub fn keywords(&self) -> &KeywordTable {
        &self.keywords
    }

    /// Classifies `text`. Never fails: anything unmatched is `General`.
    pub fn classify(&self, text: &str) -> Category {
        self.explain(text).category
    }

    /// Like [`Classifier::classify`], but also reports the matching keyword.
    pub fn explain(&self, text: &str) -> Classification {
        if text.is_empty() {
            return Classification {
                category: Category::General,
                keyword: None,
            };
        }

        let haystack = text.to_lowercase();
        for category in Category::PRIORITY {
            if let Some(keyword) = self
                .keywords
                .keywords(category)
                .iter()
                .find(|keyword| haystack.contains(keyword.as_str()))
            {
                return Classification {
                    category,
                    keyword: Some(keyword.clone()),
                };
            }
        }

        Classification {
            category: Category::General,
            keyword: None,
        }
    }

    /// Classifies a search context. Only the query decides emptiness; mood and
    /// genre on their own never select a category.
    pub fn classify_context(&self, context: &SearchContext) -> Category {
        if !context.has_query() {
            return Category::General;
        }

        let classification = self.explain(&context.classification_text());
        tracing::debug!(
            query = %context.query,
            category = %classification.category,
            keyword = classification.keyword.as_deref(),
            "classified search context"
        );
        classification.category
    }
}
