//! Prompt text for the analysis step

pub const CATEGORY_GUIDE: &str = r#"Categories:

OFD (Ontological Functional Dependency)
  Questions about the entities and attributes in a dataset, the functional
  dependencies between attributes, and how entities relate to and influence
  each other.
  Examples: "What are the entities and attributes in this dataset?",
  "What functional dependencies exist between attributes?"

TKG (Temporal Knowledge Graph)
  Questions about time: how entities or events evolve, sequences of events,
  facts valid at a specific time, time-stamped cause and effect.
  Examples: "What was the market trend from 2020-2023?",
  "Who were the US presidents in the 1990s?"

CAUSAL (Causal Question)
  Questions about cause and effect between variables: interventions,
  counterfactuals ("what if X had not happened"), causal mechanisms.
  Examples: "How does temperature affect CPU performance?",
  "What is the impact of sanctions on GDP?""#;

pub const DECOMPOSE_SYSTEM: &str = r#"You split a user question into smaller, self-contained sub-queries. You never answer the question.

Return a JSON array of strings. The first element must be the original question, unchanged, followed by the sub-queries. If the question is already atomic, return only the original question.

Respond with the JSON array only."#;

pub const CLASSIFY_SYSTEM: &str = r#"You classify sub-queries into exactly one category each. You never answer them.

Return a JSON array with one object per input sub-query, in the same order:
[{"query": "<sub-query text>", "category": "OFD" | "TKG" | "CAUSAL"}]

Respond with the JSON array only."#;

pub const COMBINED_SYSTEM: &str = r#"You split a user question into smaller, self-contained sub-queries and classify each one. You never answer the question.

Return a JSON array of objects:
[{"query": "<sub-query text>", "category": "OFD" | "TKG" | "CAUSAL"}]

The first element must be the original question, unchanged, with its own category, followed by the sub-queries. If the question is already atomic, return only the original question.

Respond with the JSON array only."#;

pub fn decompose_prompt(query: &str) -> String {
    format!("User query: {}", query)
}

pub fn classify_prompt(texts: &[String]) -> String {
    let mut prompt = String::from("Sub-queries:\n");
    for (i, text) in texts.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, text));
    }
    prompt
}

pub fn with_guide(system: &str) -> String {
    format!("{}\n\n{}", system, CATEGORY_GUIDE)
}
