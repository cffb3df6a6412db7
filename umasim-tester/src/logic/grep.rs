use anyhow::{Context, Result};
use serde::Serialize;
use umasim_race::{MockConditions, Pattern, SkillCatalog};

/// Which condition strings of each alternative are searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GrepScope {
    #[default]
    Both,
    PreconditionsOnly,
    ConditionsOnly,
}

impl GrepScope {
    #[must_use]
    pub const fn from_flags(pre: bool, exclude_pre: bool) -> Self {
        match (pre, exclude_pre) {
            (true, _) => Self::PreconditionsOnly,
            (false, true) => Self::ConditionsOnly,
            (false, false) => Self::Both,
        }
    }

    const fn searches_pre(self) -> bool {
        !matches!(self, Self::ConditionsOnly)
    }

    const fn searches_condition(self) -> bool {
        !matches!(self, Self::PreconditionsOnly)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedAlternative {
    pub precondition: String,
    pub condition: String,
}

/// A skill with at least one matching alternative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrepMatch {
    pub skill_id: String,
    pub alternatives: Vec<MatchedAlternative>,
}

fn matches(pattern: &Pattern, source: &str) -> Result<bool> {
    if source.is_empty() {
        return Ok(false);
    }
    pattern
        .matches_source(source, MockConditions::shared())
        .with_context(|| format!("matching {source:?}"))
}

/// Skills whose conditions structurally contain `query`, in id order.
///
/// Inherited skills (ids starting with 9) repeat their originals and are skipped.
pub fn grep_skills(catalog: &SkillCatalog, query: &str, scope: GrepScope) -> Result<Vec<GrepMatch>> {
    let pattern = Pattern::new(query, MockConditions::shared())
        .with_context(|| format!("invalid search condition {query:?}"))?;
    let mut found = Vec::new();
    for id in catalog.ids() {
        if id.starts_with('9') {
            continue;
        }
        let entry = catalog.get(id)?;
        let mut alternatives = Vec::new();
        for alt in &entry.alternatives {
            let hit = (scope.searches_pre() && matches(&pattern, &alt.precondition)?)
                || (scope.searches_condition() && matches(&pattern, &alt.condition)?);
            if hit {
                alternatives.push(MatchedAlternative {
                    precondition: alt.precondition.clone(),
                    condition: alt.condition.clone(),
                });
            }
        }
        if !alternatives.is_empty() {
            found.push(GrepMatch {
                skill_id: id.to_string(),
                alternatives,
            });
        }
    }
    Ok(found)
}
