//! Visibility query building
//!
//! Search filters are kept per field and turned into a `Filter` tree, which
//! renders to the service's SQL-like visibility query language and can also
//! be evaluated in-process against an execution snapshot.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::model::{ExecutionInfo, ExecutionRef, ExecutionStatus};

/// Search attributes the dashboard filters on
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SearchField {
    WorkflowType,
    WorkflowId,
    ExecutionStatus,
}

impl SearchField {
    pub const ALL: [SearchField; 3] = [
        SearchField::WorkflowType,
        SearchField::WorkflowId,
        SearchField::ExecutionStatus,
    ];

    fn attribute(&self) -> Attribute {
        match self {
            SearchField::WorkflowType => Attribute::WorkflowType,
            SearchField::WorkflowId => Attribute::WorkflowId,
            SearchField::ExecutionStatus => Attribute::ExecutionStatus,
        }
    }

    pub fn prompt(&self) -> &'static str {
        match self {
            SearchField::WorkflowType => "Search WorkflowType: ",
            SearchField::WorkflowId => "Search WorkflowId: ",
            SearchField::ExecutionStatus => "Search WorkflowStatus: ",
        }
    }

    /// Normalize a typed value before it becomes a filter
    pub fn normalize(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        match self {
            SearchField::ExecutionStatus => ExecutionStatus::parse(trimmed)
                .map(|s| s.query_name().to_string())
                .unwrap_or_else(|| title_case(trimmed)),
            _ => trimmed.to_string(),
        }
    }
}

impl fmt::Display for SearchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.attribute().fmt(f)
    }
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attribute {
    WorkflowType,
    WorkflowId,
    ExecutionStatus,
    ParentWorkflowId,
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Attribute::WorkflowType => "WorkflowType",
            Attribute::WorkflowId => "WorkflowId",
            Attribute::ExecutionStatus => "ExecutionStatus",
            Attribute::ParentWorkflowId => "ParentWorkflowId",
        };
        f.write_str(name)
    }
}

impl Attribute {
    fn value_of(&self, info: &ExecutionInfo) -> Option<String> {
        match self {
            Attribute::WorkflowType => Some(info.workflow_type.clone()),
            Attribute::WorkflowId => Some(info.execution.workflow_id.clone()),
            Attribute::ExecutionStatus => Some(info.status.query_name().to_string()),
            Attribute::ParentWorkflowId => info.parent.as_ref().map(|p| p.workflow_id.clone()),
        }
    }
}

/// Visibility filter expression
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Filter {
    /// Matches everything; renders to the empty query
    All,
    Eq(Attribute, String),
    In(Attribute, Vec<String>),
    IsNull(Attribute),
    Between(Attribute, String, String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "\\'"))
}

impl Filter {
    /// `self AND other`, flattening the permissive filter away
    pub fn and(self, other: Filter) -> Filter {
        match (self, other) {
            (Filter::All, f) | (f, Filter::All) => f,
            (Filter::And(mut left), Filter::And(right)) => {
                left.extend(right);
                Filter::And(left)
            }
            (Filter::And(mut left), f) => {
                left.push(f);
                Filter::And(left)
            }
            (f, g) => Filter::And(vec![f, g]),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Filter::All)
    }

    /// Rendered query string
    pub fn to_query(&self) -> String {
        self.to_string()
    }

    /// Evaluate against an execution snapshot
    pub fn matches(&self, info: &ExecutionInfo) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(attr, value) => attr.value_of(info).as_deref() == Some(value.as_str()),
            Filter::In(attr, values) => attr
                .value_of(info)
                .map(|v| values.iter().any(|candidate| *candidate == v))
                .unwrap_or(false),
            Filter::IsNull(attr) => attr.value_of(info).is_none(),
            Filter::Between(attr, low, high) => attr
                .value_of(info)
                .map(|v| v.as_str() >= low.as_str() && v.as_str() <= high.as_str())
                .unwrap_or(false),
            Filter::And(parts) => parts.iter().all(|p| p.matches(info)),
            Filter::Or(parts) => parts.iter().any(|p| p.matches(info)),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::All => Ok(()),
            Filter::Eq(attr, value) => write!(f, "{} = {}", attr, quote(value)),
            Filter::In(attr, values) => {
                let quoted: Vec<String> = values.iter().map(|v| quote(v)).collect();
                write!(f, "{} IN ({})", attr, quoted.join(", "))
            }
            Filter::IsNull(attr) => write!(f, "{} IS NULL", attr),
            Filter::Between(attr, low, high) => {
                write!(f, "{} BETWEEN {} AND {}", attr, quote(low), quote(high))
            }
            Filter::And(parts) => {
                let rendered: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                f.write_str(&rendered.join(" AND "))
            }
            Filter::Or(parts) => {
                let rendered: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                if parts.len() > 1 {
                    write!(f, "({})", rendered.join(" OR "))
                } else {
                    f.write_str(&rendered.join(" OR "))
                }
            }
        }
    }
}

/// Accepted values per field: AND across fields, OR within one field
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchFilters {
    values: BTreeMap<SearchField, BTreeSet<String>>,
}

impl SearchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an accepted value; returns false for blanks and duplicates
    pub fn add(&mut self, field: SearchField, value: &str) -> bool {
        let normalized = field.normalize(value);
        if normalized.is_empty() {
            return false;
        }
        self.values.entry(field).or_default().insert(normalized)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.values.values().all(|v| v.is_empty())
    }

    pub fn values(&self, field: SearchField) -> impl Iterator<Item = &String> {
        self.values.get(&field).into_iter().flatten()
    }

    /// Build the filter for the current search, optionally restricted to
    /// top-level executions
    pub fn to_filter(&self, parents_only: bool) -> Filter {
        let mut filter = if parents_only {
            Filter::IsNull(Attribute::ParentWorkflowId)
        } else {
            Filter::All
        };
        for (field, accepted) in &self.values {
            if accepted.is_empty() {
                continue;
            }
            let clauses = accepted
                .iter()
                .map(|v| Filter::Eq(field.attribute(), v.clone()))
                .collect();
            filter = filter.and(Filter::Or(clauses));
        }
        filter
    }

    /// Short human summary, e.g. `WorkflowType: a|b  ExecutionStatus: Running`
    pub fn summary(&self) -> String {
        self.values
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(field, v)| {
                format!("{}: {}", field, v.iter().cloned().collect::<Vec<_>>().join("|"))
            })
            .collect::<Vec<_>>()
            .join("  ")
    }
}

/// Active filter narrowed to one status, for header counters
pub fn count_filter(base: &Filter, status: ExecutionStatus) -> Filter {
    base.clone().and(Filter::Eq(
        Attribute::ExecutionStatus,
        status.query_name().to_string(),
    ))
}

/// Executions to poll for status changes
pub fn running_filter(executions: &[ExecutionRef]) -> Filter {
    let mut ids: Vec<String> = executions.iter().map(|e| e.workflow_id.clone()).collect();
    ids.dedup();
    Filter::In(Attribute::WorkflowId, ids)
}

/// Prefix search used for search-as-you-type suggestions
pub fn suggestion_filter(field: SearchField, prefix: &str) -> Option<Filter> {
    match field {
        SearchField::WorkflowType | SearchField::WorkflowId => Some(Filter::Between(
            field.attribute(),
            prefix.to_string(),
            format!("{}~", prefix),
        )),
        SearchField::ExecutionStatus => None,
    }
}

/// Static suggestions for the status field
pub fn status_suggestions(prefix: &str) -> Vec<String> {
    let lower = prefix.to_lowercase();
    ExecutionStatus::SEARCHABLE
        .iter()
        .map(|s| s.query_name().to_string())
        .filter(|name| name.to_lowercase().starts_with(&lower))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clause_set(query: &str) -> BTreeSet<String> {
        query.split(" AND ").map(|s| s.to_string()).collect()
    }

    fn info(id: &str, kind: &str, status: ExecutionStatus) -> ExecutionInfo {
        ExecutionInfo {
            execution: ExecutionRef::new(id, "run"),
            workflow_type: kind.into(),
            status,
            start_time: None,
            close_time: None,
            parent: None,
        }
    }

    #[test]
    fn test_single_value() {
        let mut filters = SearchFilters::new();
        filters.add(SearchField::WorkflowType, "Foo");
        assert_eq!(filters.to_filter(false).to_query(), "WorkflowType = 'Foo'");
    }

    #[test]
    fn test_or_within_field() {
        let mut filters = SearchFilters::new();
        filters.add(SearchField::WorkflowId, "a");
        filters.add(SearchField::WorkflowId, "b");
        assert_eq!(
            filters.to_filter(false).to_query(),
            "(WorkflowId = 'a' OR WorkflowId = 'b')"
        );
    }

    #[test]
    fn test_and_across_fields() {
        let mut filters = SearchFilters::new();
        filters.add(SearchField::WorkflowId, "a");
        filters.add(SearchField::ExecutionStatus, "running");
        filters.add(SearchField::ExecutionStatus, "failed");
        let query = filters.to_filter(true).to_query();
        let expected: BTreeSet<String> = [
            "ParentWorkflowId IS NULL",
            "WorkflowId = 'a'",
            "(ExecutionStatus = 'Failed' OR ExecutionStatus = 'Running')",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(clause_set(&query), expected);
    }

    #[test]
    fn test_no_filters_is_permissive() {
        let filters = SearchFilters::new();
        assert!(filters.to_filter(false).is_all());
        assert_eq!(filters.to_filter(false).to_query(), "");
        assert_eq!(filters.to_filter(true).to_query(), "ParentWorkflowId IS NULL");
    }

    #[test]
    fn test_status_title_cased() {
        let mut filters = SearchFilters::new();
        assert!(filters.add(SearchField::ExecutionStatus, "  terminated "));
        assert!(!filters.add(SearchField::ExecutionStatus, "Terminated"));
        assert!(!filters.add(SearchField::WorkflowId, "   "));
        assert_eq!(
            filters.values(SearchField::ExecutionStatus).collect::<Vec<_>>(),
            vec!["Terminated"]
        );
    }

    #[test]
    fn test_quotes_escaped() {
        let filter = Filter::Eq(Attribute::WorkflowId, "it's".into());
        assert_eq!(filter.to_query(), r"WorkflowId = 'it\'s'");
    }

    #[test]
    fn test_count_filter() {
        assert_eq!(
            count_filter(&Filter::All, ExecutionStatus::Running).to_query(),
            "ExecutionStatus = 'Running'"
        );
        let mut filters = SearchFilters::new();
        filters.add(SearchField::WorkflowType, "Foo");
        let query = count_filter(&filters.to_filter(false), ExecutionStatus::Failed).to_query();
        assert_eq!(
            clause_set(&query),
            clause_set("WorkflowType = 'Foo' AND ExecutionStatus = 'Failed'")
        );
    }

    #[test]
    fn test_running_filter() {
        let refs = vec![ExecutionRef::new("a", "1"), ExecutionRef::new("b", "2")];
        assert_eq!(running_filter(&refs).to_query(), "WorkflowId IN ('a', 'b')");
    }

    #[test]
    fn test_filter_matches() {
        let mut filters = SearchFilters::new();
        filters.add(SearchField::WorkflowType, "Foo");
        filters.add(SearchField::ExecutionStatus, "Running");
        let filter = filters.to_filter(true);

        assert!(filter.matches(&info("x", "Foo", ExecutionStatus::Running)));
        assert!(!filter.matches(&info("x", "Bar", ExecutionStatus::Running)));
        assert!(!filter.matches(&info("x", "Foo", ExecutionStatus::Failed)));

        let mut child = info("x", "Foo", ExecutionStatus::Running);
        child.parent = Some(ExecutionRef::new("p", "r"));
        assert!(!filter.matches(&child));
    }

    #[test]
    fn test_suggestions() {
        let between = suggestion_filter(SearchField::WorkflowId, "ord").unwrap();
        assert_eq!(between.to_query(), "WorkflowId BETWEEN 'ord' AND 'ord~'");
        assert!(between.matches(&info("order-1", "T", ExecutionStatus::Running)));
        assert!(!between.matches(&info("invoice-1", "T", ExecutionStatus::Running)));

        assert!(suggestion_filter(SearchField::ExecutionStatus, "r").is_none());
        assert_eq!(status_suggestions("c"), vec!["Completed", "Canceled", "ContinuedAsNew"]);
    }
}
