// Recommendation request builder
//
// Turns a research topic (and, in catalog-constrained mode, the whole
// catalog) into the instruction text plus the response schema the
// recommender validates against. Pure: no I/O, no logging.

use super::system_prompt::{CATALOG_MODE_RULES, LIBRARIAN_ROLE, OPEN_MODE_GUIDANCE, OUTPUT_REMINDER};
use crate::catalog::CatalogEntry;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Where recommendations may come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogMode {
    /// Any real-world book from the capability's general knowledge
    Open,
    /// Only entries of the embedded catalog
    #[default]
    Catalog,
}

impl CatalogMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "open" => Some(CatalogMode::Open),
            "catalog" | "constrained" | "catalog_constrained" => Some(CatalogMode::Catalog),
            _ => None,
        }
    }
}

/// One string field of a recommended book
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

/// Shape of the expected response: an ordered array of book objects whose
/// fields are all strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSchema {
    pub fields: Vec<FieldSpec>,
}

impl ResponseSchema {
    /// The book-list shape shared by both modes. isbn is deliberately absent:
    /// the capability is never asked to produce one.
    pub fn book_list() -> Self {
        let field = |name, description, required| FieldSpec {
            name,
            description,
            required,
        };
        ResponseSchema {
            fields: vec![
                field("title", "The full title of the book", true),
                field("author", "The name(s) of the author(s)", true),
                field("publishedYear", "Year of publication", false),
                field(
                    "description",
                    "A concise summary of the book's content (max 2 sentences).",
                    true,
                ),
                field(
                    "relevance",
                    "A specific explanation of why this book is useful for the provided research idea.",
                    true,
                ),
                field(
                    "category",
                    "The genre or academic field of the book (e.g., Philosophy, Computer Science).",
                    true,
                ),
            ],
        }
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.required)
    }

    /// Render as the provider's response schema (OpenAPI subset)
    pub fn to_json(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| {
                (
                    f.name.to_string(),
                    json!({ "type": "STRING", "description": f.description }),
                )
            })
            .collect();
        let required: Vec<&str> = self.required_fields().map(|f| f.name).collect();

        json!({
            "type": "ARRAY",
            "items": {
                "type": "OBJECT",
                "properties": properties,
                "required": required,
            }
        })
    }
}

/// A fully built request, ready for the recommender
#[derive(Debug, Clone)]
pub struct PromptSpec {
    pub instruction_text: String,
    pub output_shape: ResponseSchema,
    pub mode: CatalogMode,
}

pub struct RequestBuilder;

impl RequestBuilder {
    /// Build the prompt for a topic. The query is embedded as-is; the caller
    /// is responsible for rejecting blank queries.
    pub fn build(query: &str, catalog: &[CatalogEntry], mode: CatalogMode) -> PromptSpec {
        let instruction_text = match mode {
            CatalogMode::Open => format!(
                "I am researching the following idea or topic: \"{}\".\n{}\n{}\n\n{}",
                query, LIBRARIAN_ROLE, OPEN_MODE_GUIDANCE, OUTPUT_REMINDER
            ),
            CatalogMode::Catalog => format!(
                "I am researching the following idea or topic: \"{}\".\n{}\n{}\n\nLibrary catalog:\n{}\n\n{}",
                query,
                LIBRARIAN_ROLE,
                CATALOG_MODE_RULES,
                Self::catalog_context(catalog),
                OUTPUT_REMINDER
            ),
        };

        PromptSpec {
            instruction_text,
            output_shape: ResponseSchema::book_list(),
            mode,
        }
    }

    /// Serialize the catalog exactly as the capability should copy it
    fn catalog_context(catalog: &[CatalogEntry]) -> String {
        // Plain string fields only, serialization cannot fail
        serde_json::to_string_pretty(catalog).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;

    #[test]
    fn test_catalog_mode_embeds_every_entry() {
        let catalog = Catalog::sample();
        let spec = RequestBuilder::build("Stoicism in Modern Life", catalog.entries(), CatalogMode::Catalog);

        assert!(spec.instruction_text.contains("\"Stoicism in Modern Life\""));
        for entry in catalog.entries() {
            let title = serde_json::to_string(&entry.title).unwrap();
            assert!(spec.instruction_text.contains(&title), "missing {}", entry.title);
        }
        assert!(spec.instruction_text.contains("between 3 and 6"));
        assert_eq!(spec.mode, CatalogMode::Catalog);
    }

    #[test]
    fn test_open_mode_ignores_catalog() {
        let catalog = Catalog::sample();
        let spec = RequestBuilder::build("History of Coffee", catalog.entries(), CatalogMode::Open);

        assert!(spec.instruction_text.contains("3 to 8"));
        assert!(!spec.instruction_text.contains("Silent Spring"));
    }

    #[test]
    fn test_build_tolerates_odd_queries() {
        let long = "ephemeral ".repeat(5_000);
        for query in ["", "   ", "量子コンピュータ \"quoted\" {braces}", long.as_str()] {
            let spec = RequestBuilder::build(query, &[], CatalogMode::Catalog);
            assert!(spec.instruction_text.contains(query));
        }
    }

    #[test]
    fn test_schema_required_and_optional_fields() {
        let schema = ResponseSchema::book_list();
        let required: Vec<&str> = schema.required_fields().map(|f| f.name).collect();
        assert_eq!(required, vec!["title", "author", "description", "relevance", "category"]);
        let published = schema.fields.iter().find(|f| f.name == "publishedYear").unwrap();
        assert!(!published.required);
        assert!(schema.fields.iter().all(|f| f.name != "isbn"));

        let json = schema.to_json();
        assert_eq!(json["type"], "ARRAY");
        assert_eq!(json["items"]["properties"]["relevance"]["type"], "STRING");
        assert_eq!(json["items"]["required"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn test_catalog_mode_parse() {
        assert_eq!(CatalogMode::parse("OPEN"), Some(CatalogMode::Open));
        assert_eq!(CatalogMode::parse("catalog"), Some(CatalogMode::Catalog));
        assert_eq!(CatalogMode::parse("whatever"), None);
    }
}
