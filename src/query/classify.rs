//! Statement classification.
//!
//! A statement is classified by its leading keyword against an ordered rule
//! table. The first matching rule wins; anything unmatched is a read.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// How a statement's result is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementClass {
    /// CREATE, ALTER, TRUNCATE, DROP: the raw driver result is returned.
    SchemaChange,
    /// INSERT, DELETE, UPDATE, REPLACE: the affected-row count is returned.
    Mutation,
    /// Everything else: rows are materialized.
    Read,
}

impl fmt::Display for StatementClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SchemaChange => write!(f, "schema-change"),
            Self::Mutation => write!(f, "mutation"),
            Self::Read => write!(f, "read"),
        }
    }
}

/// One row of the classification table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassRule {
    /// Case-insensitive pattern anchored at the start of the statement.
    pub pattern: &'static str,
    /// Class assigned when the pattern matches.
    pub class: StatementClass,
}

/// The ordered rule table.
pub const CLASS_RULES: &[ClassRule] = &[
    ClassRule {
        pattern: r"(?i)^\s*(create|alter|truncate|drop)\s",
        class: StatementClass::SchemaChange,
    },
    ClassRule {
        pattern: r"(?i)^\s*(insert|delete|update|replace)\s",
        class: StatementClass::Mutation,
    },
];

/// Statements whose execution generates an auto-increment id.
const INSERT_ID_PATTERN: &str = r"(?i)^\s*(insert|replace)\s";

/// Result of classifying a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// The statement class.
    pub class: StatementClass,
    /// Whether the statement may generate an insert id.
    pub generates_insert_id: bool,
}

/// Compiled form of [`CLASS_RULES`].
#[derive(Debug)]
pub struct StatementClassifier {
    rules: Vec<(Regex, StatementClass)>,
    insert_id: Regex,
}

impl StatementClassifier {
    /// Compiles a classifier from a rule table.
    pub fn from_rules(rules: &[ClassRule]) -> Result<Self, regex::Error> {
        let rules = rules
            .iter()
            .map(|rule| Ok((Regex::new(rule.pattern)?, rule.class)))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self {
            rules,
            insert_id: Regex::new(INSERT_ID_PATTERN)?,
        })
    }

    /// Classifies a statement.
    pub fn classify(&self, sql: &str) -> Classification {
        let class = self
            .rules
            .iter()
            .find(|(pattern, _)| pattern.is_match(sql))
            .map(|(_, class)| *class)
            .unwrap_or(StatementClass::Read);

        Classification {
            class,
            generates_insert_id: class == StatementClass::Mutation && self.insert_id.is_match(sql),
        }
    }
}

/// Classifies a statement with the built-in rule table.
pub fn classify_statement(sql: &str) -> Classification {
    static CLASSIFIER: OnceLock<StatementClassifier> = OnceLock::new();
    CLASSIFIER
        .get_or_init(|| {
            StatementClassifier::from_rules(CLASS_RULES).expect("built-in class rules compile")
        })
        .classify(sql)
}
