//! Prompt construction for program synthesis and narration.

use crate::dataset::SchemaDescription;
use crate::retrieval::RetrievedContext;
use crate::sandbox::{AllowList, FailureKind};

pub const SYNTHESIS_SYSTEM_PROMPT: &str = "You are a careful business data analyst. You answer questions by writing small JSON analysis programs in the exact format you are given. You never invent column names or values.";

pub const NARRATIVE_SYSTEM_PROMPT: &str = "You explain computed analytics results to business users in plain language. You only use the numbers you are given.";

/// Character budget for context in the simplified prompt.
const SIMPLIFIED_CONTEXT_CHARS: usize = 500;

const PROGRAM_EXAMPLE: &str = r#"{
  "table": "sales",
  "uses": ["filter", "aggregate"],
  "steps": [
    {"op": "filter", "column": "Year", "cmp": "eq", "value": 2024},
    {"op": "aggregate", "aggregations": [{"func": "sum", "column": "Net_Amount_BDT", "alias": "total_sales"}]}
  ]
}"#;

const GROUPED_EXAMPLE: &str = r#"{
  "table": "sales",
  "uses": ["group", "sort", "limit"],
  "steps": [
    {"op": "group", "by": ["Branch_Name"], "aggregations": [{"func": "sum", "column": "Profit_BDT", "alias": "profit"}]},
    {"op": "sort", "by": ["profit"], "descending": true},
    {"op": "limit", "n": 5}
  ]
}"#;

/// Failure of the previous attempt, fed into the revision prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorFailure {
    pub source: String,
    pub kind: FailureKind,
    pub message: String,
}

pub struct PromptInput<'a> {
    pub query: &'a str,
    pub schema: &'a SchemaDescription,
    pub primary_table: &'a str,
    pub context: &'a RetrievedContext,
    pub guidance: &'a str,
    pub allow_list: &'a AllowList,
    pub max_context_chars: usize,
}

fn format_section(allow_list: &AllowList) -> String {
    let mut lines = vec![
        "A program is a JSON object {\"table\": TABLE, \"uses\": [OPERATIONS], \"steps\": [STEP, ...]}.".to_string(),
        "\"uses\" must list every operation that appears in the steps. Only these operations exist:".to_string(),
    ];
    for op in allow_list.iter() {
        lines.push(format!("- {}: {}", op.as_str(), op.usage()));
    }
    lines.push(
        "AGG is {\"func\": \"sum|mean|min|max|count|n_unique\", \"column\": C, \"alias\": NAME}; count without a column counts rows."
            .to_string(),
    );
    lines.join("\n")
}

pub fn build_prompt(input: &PromptInput<'_>) -> String {
    let context = if input.context.is_empty() {
        "(no additional business context found)".to_string()
    } else {
        input.context.render(input.max_context_chars)
    };

    format!(
        "Write an analysis program that answers the question below.

QUESTION: {query}

DATASET SCHEMA (primary table: {table}):
{schema}
BUSINESS CONTEXT:
{context}

PROGRAM FORMAT:
{format}

RULES:
1. Use exact column names from the schema and exact values from the sample values.
2. \"How many\" questions count rows with count. Questions about sales, revenue, amounts or profit sum the matching amount column.
3. Keep results small: aggregate, sort and limit instead of returning raw rows.
4. Before dividing by a column, filter out rows where it is zero.
5. For period comparisons sort by the time column first; pct_change and forecast follow the current row order.

STRATEGY:
{guidance}

EXAMPLES:
```json
{example}
```
```json
{grouped}
```

Respond with exactly one ```json code block containing the program, then one line:
Explanation: <one sentence answering the question, with {{result}} where the computed value goes>",
        query = input.query,
        table = input.primary_table,
        schema = input.schema.render(),
        context = context,
        format = format_section(input.allow_list),
        guidance = input.guidance,
        example = PROGRAM_EXAMPLE,
        grouped = GROUPED_EXAMPLE,
    )
}

/// Shorter prompt used once after a response could not be parsed.
pub fn build_simplified_prompt(input: &PromptInput<'_>) -> String {
    let columns: Vec<String> = input
        .schema
        .table(input.primary_table)
        .map(|t| t.columns.iter().map(|c| format!("{} ({})", c.name, c.dtype)).collect())
        .unwrap_or_default();
    let context: String = input
        .context
        .render(SIMPLIFIED_CONTEXT_CHARS)
        .chars()
        .take(SIMPLIFIED_CONTEXT_CHARS)
        .collect();
    let operations: Vec<&str> = input.allow_list.iter().map(|op| op.as_str()).collect();

    format!(
        "QUESTION: {query}
TABLE: {table}
COLUMNS: {columns}
CONTEXT: {context}
OPERATIONS: {operations}

Answer with a ```json code block holding {{\"table\": \"{table}\", \"uses\": [...], \"steps\": [...]}} exactly like this example:
```json
{example}
```
Then write one line starting with \"Explanation:\".",
        query = input.query,
        table = input.primary_table,
        columns = columns.join(", "),
        context = if context.is_empty() { "none".to_string() } else { context },
        operations = operations.join(", "),
        example = PROGRAM_EXAMPLE,
    )
}

/// Revision preamble for a retry after an execution failure.
pub fn build_revision_prompt(prior: &PriorFailure, attempt: usize, allow_list: &AllowList) -> String {
    let mut parts = vec![format!(
        "RETRY ATTEMPT {}: Your previous program failed with the following error:",
        attempt
    )];

    match prior.kind {
        FailureKind::PolicyViolation => {
            parts.push(format!("Rejected: {}", prior.message));
            parts.push(format!(
                "Only these operations are allowed: {}.",
                allow_list.iter().map(|op| op.as_str()).collect::<Vec<_>>().join(", ")
            ));
            parts.push("List exactly the operations your steps use in \"uses\".".to_string());
        }
        FailureKind::ResourceExceeded => {
            parts.push(format!("Limit exceeded: {}", prior.message));
            parts.push(
                "Write a cheaper program: filter first, aggregate as early as possible, use fewer steps and end with a limit of at most 20 rows."
                    .to_string(),
            );
        }
        FailureKind::RuntimeFault => {
            parts.push(format!("Error details: {}", prior.message));
            parts.push(
                "Fix the cause. Check column names, value spellings and data types against the schema."
                    .to_string(),
            );
        }
    }

    parts.push("\nPrevious program:".to_string());
    parts.push(format!("```json\n{}\n```", prior.source));
    parts.push("\nPlease write a corrected program.".to_string());
    parts.join("\n")
}

pub fn build_narrative_prompt(query: &str, result: &str, style: &str) -> String {
    format!(
        "QUESTION: {}\n\nCOMPUTED RESULT:\n{}\n\nWrite a 2-3 sentence answer. {}\nUse the exact numbers above and do not mention programs or code.",
        query, result, style
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn schema() -> SchemaDescription {
        let df = df!["Year" => [2024i64], "Net_Amount_BDT" => [1.0]].unwrap();
        SchemaDescription::describe([("sales", &df)]).unwrap()
    }

    #[test]
    fn test_prompt_contains_sections() {
        let schema = schema();
        let context = RetrievedContext::empty();
        let allow = AllowList::standard();
        let prompt = build_prompt(&PromptInput {
            query: "What was total sales in 2024?",
            schema: &schema,
            primary_table: "sales",
            context: &context,
            guidance: "Answer directly.",
            allow_list: &allow,
            max_context_chars: 4000,
        });
        assert!(prompt.contains("QUESTION: What was total sales in 2024?"));
        assert!(prompt.contains("- Net_Amount_BDT"));
        assert!(prompt.contains("- forecast:"));
        assert!(prompt.contains("no additional business context"));
        assert!(prompt.contains("Explanation: <one sentence"));
        assert!(prompt.contains("{result}"));
    }

    #[test]
    fn test_revision_prompt_includes_failure_and_program() {
        let prior = PriorFailure {
            source: "{\"table\":\"sales\"}".to_string(),
            kind: FailureKind::RuntimeFault,
            message: "division by zero".to_string(),
        };
        let text = build_revision_prompt(&prior, 2, &AllowList::standard());
        assert!(text.starts_with("RETRY ATTEMPT 2"));
        assert!(text.contains("division by zero"));
        assert!(text.contains("{\"table\":\"sales\"}"));
    }

    #[test]
    fn test_simplified_prompt_truncates_context() {
        let schema = schema();
        let context = RetrievedContext::empty();
        let allow = AllowList::standard();
        let prompt = build_simplified_prompt(&PromptInput {
            query: "q",
            schema: &schema,
            primary_table: "sales",
            context: &context,
            guidance: "",
            allow_list: &allow,
            max_context_chars: 4000,
        });
        assert!(prompt.contains("COLUMNS: Year (i64), Net_Amount_BDT (f64)"));
        assert!(prompt.contains("CONTEXT: none"));
    }
}
