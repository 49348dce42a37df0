// Prompt fragments for the research librarian
//
// The request builder stitches these together with the user's topic and,
// in catalog-constrained mode, the serialized catalog.

/// Opening line framing the capability as a librarian
pub const LIBRARIAN_ROLE: &str = "Please act as a librarian helping a researcher find books.";

/// Guidance for open mode (general knowledge, no catalog)
pub const OPEN_MODE_GUIDANCE: &str = r#"Search your knowledge to recommend 3 to 8 real, high-quality, and relevant books that would assist me.
Prioritize seminal works, highly-rated academic resources, or influential popular science/non-fiction books depending on the tone of the query.
Provide a brief description of each book and specifically why it is relevant to my research idea."#;

/// Rules for catalog-constrained mode. The catalog JSON follows this text.
pub const CATALOG_MODE_RULES: &str = r#"You may ONLY recommend books from the library catalog below.
Select between 3 and 6 entries from this exact list that best match the research topic, ordered from most to least relevant.
Do not invent, rename, or paraphrase titles. Copy title, author, publishedYear, description and category exactly as they appear in the catalog.
The only field you write yourself is "relevance": a specific explanation of why the book is useful for this research topic. It must not repeat the description.
If no entry is relevant, return an empty list."#;

/// Closing reminder about the output format
pub const OUTPUT_REMINDER: &str = "Respond only with a JSON array that follows the provided response schema.";

/// Starter topics offered before the user types anything
pub const SUGGESTED_TOPICS: [&str; 4] = [
    "Quantum Computing Basics",
    "History of Coffee",
    "Stoicism in Modern Life",
    "Sustainable Urban Planning",
];
