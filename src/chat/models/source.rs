use serde::{Deserialize, Serialize};

use crate::chat::error::EngineError;

/// A repository scope plus a grounding query for one turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    pub repositories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_learning: Option<bool>,
}

impl SourceConfig {
    pub fn new(repositories: Vec<String>, query: impl Into<String>) -> Self {
        Self {
            repositories,
            query: Some(query.into()),
            scope_learning: None,
        }
    }

    fn has_query(&self) -> bool {
        self.query
            .as_deref()
            .map(|q| !q.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Validate sources for turn submission.
///
/// A live turn needs every source to carry at least one repository and a
/// non-blank query. Scope-learning mode skips validation entirely; any
/// source list, including an empty one, is accepted.
pub fn validate_sources(
    sources: &[SourceConfig],
    scope_learning: bool,
) -> Result<(), EngineError> {
    if scope_learning {
        return Ok(());
    }

    for (index, source) in sources.iter().enumerate() {
        if source.repositories.is_empty() {
            return Err(EngineError::InvalidSource(format!(
                "source {} has no repositories selected",
                index + 1
            )));
        }
        if !source.has_query() {
            return Err(EngineError::InvalidSource(format!(
                "source {} has no query",
                index + 1
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_source_accepted() {
        let sources = vec![SourceConfig::new(vec!["core".to_string()], "auth flow")];
        assert!(validate_sources(&sources, false).is_ok());
    }

    #[test]
    fn test_empty_repositories_rejected() {
        let sources = vec![SourceConfig::new(vec![], "auth flow")];
        assert!(matches!(
            validate_sources(&sources, false),
            Err(EngineError::InvalidSource(_))
        ));
    }

    #[test]
    fn test_whitespace_query_rejected() {
        let sources = vec![SourceConfig::new(vec!["core".to_string()], "   ")];
        assert!(matches!(
            validate_sources(&sources, false),
            Err(EngineError::InvalidSource(_))
        ));
    }

    #[test]
    fn test_missing_query_rejected() {
        let sources = vec![SourceConfig {
            repositories: vec!["core".to_string()],
            query: None,
            scope_learning: None,
        }];
        assert!(validate_sources(&sources, false).is_err());
    }

    #[test]
    fn test_scope_learning_skips_validation() {
        let sources = vec![SourceConfig::new(vec![], "")];
        assert!(validate_sources(&sources, true).is_ok());
        assert!(validate_sources(&[], true).is_ok());
    }
}
