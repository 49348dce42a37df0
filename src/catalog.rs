// Book catalog used as ground truth for recommendations
//
// The catalog is loaded once at startup (built-in sample or a JSON file)
// and never mutated afterwards. Its full contents are embedded into the
// prompt in catalog-constrained mode, so its size is capped.

use crate::error::CatalogError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest catalog that will be embedded verbatim into a prompt
pub const MAX_EMBEDDED_ENTRIES: usize = 200;

/// A single book record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub title: String,
    pub author: String,
    pub published_year: String,
    pub description: String,
    pub category: String,
}

impl CatalogEntry {
    fn new(title: &str, author: &str, published_year: &str, category: &str, description: &str) -> Self {
        CatalogEntry {
            title: title.to_string(),
            author: author.to_string(),
            published_year: published_year.to_string(),
            description: description.to_string(),
            category: category.to_string(),
        }
    }
}

/// Immutable, ordered collection of catalog entries
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn from_entries(entries: Vec<CatalogEntry>) -> Result<Self, CatalogError> {
        if entries.is_empty() {
            return Err(CatalogError::Empty);
        }
        if entries.len() > MAX_EMBEDDED_ENTRIES {
            return Err(CatalogError::TooLarge {
                count: entries.len(),
                limit: MAX_EMBEDDED_ENTRIES,
            });
        }
        Ok(Catalog { entries })
    }

    /// Load a catalog from a JSON array of entries
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        let entries: Vec<CatalogEntry> = serde_json::from_str(&raw)?;
        tracing::info!("Loaded {} catalog entries from {:?}", entries.len(), path);
        Self::from_entries(entries)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the entry with this title and author, ignoring case and
    /// runs of whitespace.
    pub fn find(&self, title: &str, author: &str) -> Option<&CatalogEntry> {
        let title = normalize(title);
        let author = normalize(author);
        self.entries
            .iter()
            .find(|entry| normalize(&entry.title) == title && normalize(&entry.author) == author)
    }

    /// The reference library shipped with the application
    pub fn sample() -> Self {
        Catalog {
            entries: sample_entries(),
        }
    }
}

fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn sample_entries() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry::new(
            "The Pragmatic Programmer",
            "Andrew Hunt & David Thomas",
            "1999",
            "Computer Science",
            "A comprehensive guide to software engineering best practices, covering topics from code adaptability to team responsibility.",
        ),
        CatalogEntry::new(
            "Clean Code",
            "Robert C. Martin",
            "2008",
            "Computer Science",
            "A handbook of agile software craftsmanship that emphasizes the importance of writing clean, readable, and maintainable code.",
        ),
        CatalogEntry::new(
            "Sapiens: A Brief History of Humankind",
            "Yuval Noah Harari",
            "2011",
            "History",
            "An exploration of the history of the human species, from the Stone Age up to the twenty-first century.",
        ),
        CatalogEntry::new(
            "Thinking, Fast and Slow",
            "Daniel Kahneman",
            "2011",
            "Psychology",
            "A detailed tour of the two systems that drive the way we think: System 1 is fast and emotional; System 2 is slower and more logical.",
        ),
        CatalogEntry::new(
            "The Structure of Scientific Revolutions",
            "Thomas S. Kuhn",
            "1962",
            "Philosophy of Science",
            "A landmark book in the history of science that introduced the concept of 'paradigm shifts'.",
        ),
        CatalogEntry::new(
            "Design Patterns: Elements of Reusable Object-Oriented Software",
            "Erich Gamma et al.",
            "1994",
            "Computer Science",
            "The classic book on software design patterns, cataloging 23 classic software design patterns.",
        ),
        CatalogEntry::new(
            "1491: New Revelations of the Americas Before Columbus",
            "Charles C. Mann",
            "2005",
            "History",
            "A non-fiction book that argues that the Americas were more populated and sophisticated before the arrival of Europeans than previously thought.",
        ),
        CatalogEntry::new(
            "Silent Spring",
            "Rachel Carson",
            "1962",
            "Environmental Science",
            "An environmental science book that documented the adverse environmental effects caused by the indiscriminate use of pesticides.",
        ),
        CatalogEntry::new(
            "The Selfish Gene",
            "Richard Dawkins",
            "1976",
            "Biology",
            "A book on evolution that builds upon the principal theory of George C. Williams's Adaptation and Natural Selection.",
        ),
        CatalogEntry::new(
            "Guns, Germs, and Steel",
            "Jared Diamond",
            "1997",
            "History",
            "Argues that geographical and environmental factors, not genetic ones, shaped the modern world.",
        ),
        CatalogEntry::new(
            "Introduction to Algorithms",
            "Thomas H. Cormen",
            "2009",
            "Computer Science",
            "A comprehensive textbook that covers a broad range of algorithms in depth, yet makes their design and analysis accessible to all levels of readers.",
        ),
        CatalogEntry::new(
            "The Myth of Sisyphus",
            "Albert Camus",
            "1942",
            "Philosophy",
            "A philosophical essay which introduces Camus's philosophy of the absurd: man's futile search for meaning, unity, and clarity.",
        ),
        CatalogEntry::new(
            "Cosmos",
            "Carl Sagan",
            "1980",
            "Astronomy",
            "Explores the mutual development of science and civilization, covering topics such as the origin of life and the human brain.",
        ),
        CatalogEntry::new(
            "Deep Work",
            "Cal Newport",
            "2016",
            "Productivity",
            "Rules for focused success in a distracted world, arguing that the ability to focus without distraction is becoming increasingly rare.",
        ),
        CatalogEntry::new(
            "Atomic Habits",
            "James Clear",
            "2018",
            "Self-Help",
            "A practical and proven framework for forming good habits, breaking bad ones, and mastering the tiny behaviors that lead to remarkable results.",
        ),
    ]
}
