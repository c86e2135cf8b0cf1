//! Subagent roles and keyword-based role inference.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// The closed set of specialist roles a subagent can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    General,
    Testing,
    Documentation,
    Refactoring,
    Analysis,
    Debug,
    Performance,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::General,
        Role::Testing,
        Role::Documentation,
        Role::Refactoring,
        Role::Analysis,
        Role::Debug,
        Role::Performance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::General => "general",
            Role::Testing => "testing",
            Role::Documentation => "documentation",
            Role::Refactoring => "refactoring",
            Role::Analysis => "analysis",
            Role::Debug => "debug",
            Role::Performance => "performance",
        }
    }

    /// Parse a role name, falling back to [`Role::General`] for anything unrecognized.
    pub fn parse_lossy(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == needle)
            .ok_or_else(|| crate::Error::Validation(format!("unknown role: {}", s)))
    }
}

// Keyword groups, checked in this order. The first group that matches wins, so
// "refactor and test the parser" is a Testing task.
static TESTING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(test\w*|specs?|coverage|tdd|assertions?)\b").unwrap()
});
static DOCUMENTATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(docs?|document\w*|readme|docstrings?|comments?|changelog|jsdoc|rustdoc)\b")
        .unwrap()
});
static REFACTORING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(refactor\w*|restructur\w*|clean\s?up|simplify|rename|extract|reorganiz\w*|modulariz\w*)\b")
        .unwrap()
});
static ANALYSIS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(analy[sz]\w*|review\w*|audit\w*|inspect\w*|investigat\w*|assess\w*|understand)\b")
        .unwrap()
});
static DEBUG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(debug\w*|bugs?|fix\w*|errors?|crash\w*|exceptions?|broken|stack\s?trace)\b")
        .unwrap()
});
static PERFORMANCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(performance|perf|optimi[sz]\w*|speed\w*|slow\w*|latency|throughput|benchmark\w*|profil\w*|memory)\b")
        .unwrap()
});

/// Infer the role for a task from its free-text description.
///
/// Precedence: testing, documentation, refactoring, analysis, debug, performance.
/// Descriptions matching none of them get [`Role::General`].
pub fn infer_role(description: &str) -> Role {
    let text = description.to_lowercase();
    let groups: [(&LazyLock<Regex>, Role); 6] = [
        (&TESTING_RE, Role::Testing),
        (&DOCUMENTATION_RE, Role::Documentation),
        (&REFACTORING_RE, Role::Refactoring),
        (&ANALYSIS_RE, Role::Analysis),
        (&DEBUG_RE, Role::Debug),
        (&PERFORMANCE_RE, Role::Performance),
    ];

    groups
        .into_iter()
        .find(|(re, _)| re.is_match(&text))
        .map(|(_, role)| role)
        .unwrap_or(Role::General)
}
