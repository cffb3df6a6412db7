//! Skill catalog loaded from the game's skill data JSON.
//!
//! Durations and modifiers are stored as integers scaled by 10000; they are
//! converted when effects are built for a particular perspective.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::solver::{Perspective, SkillEffect, SkillType, is_target};

/// Scale of fixed-point fields in the raw data.
pub const FIXED_POINT_SCALE: f64 = 10000.0;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("invalid skill data: {0}")]
    Parse(String),
    #[error("bad skill ID {0}")]
    UnknownSkill(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEffect {
    #[serde(rename = "type")]
    pub effect_type: i64,
    pub modifier: f64,
    pub target: i64,
}

/// One way a skill can trigger: a precondition, a condition and what it does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alternative {
    #[serde(default)]
    pub precondition: String,
    pub condition: String,
    pub base_duration: f64,
    #[serde(default)]
    pub effects: Vec<RawEffect>,
}

impl Alternative {
    /// Effects as seen from `perspective`. Unknown kinds and effects that do
    /// not target this horse become no-ops.
    #[must_use]
    pub fn effects(&self, perspective: Perspective) -> Vec<SkillEffect> {
        self.effects
            .iter()
            .map(|raw| SkillEffect {
                effect_type: if is_target(perspective, raw.target) {
                    SkillType::from_raw(raw.effect_type)
                } else {
                    SkillType::Noop
                },
                base_duration: self.base_duration / FIXED_POINT_SCALE,
                modifier: raw.modifier / FIXED_POINT_SCALE,
            })
            .collect()
    }

    #[must_use]
    pub fn has_precondition(&self) -> bool {
        !self.precondition.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillEntry {
    pub rarity: i64,
    pub alternatives: Vec<Alternative>,
}

/// Every skill keyed by id.
#[derive(Debug, Clone, Default)]
pub struct SkillCatalog {
    skills: HashMap<String, SkillEntry>,
}

impl SkillCatalog {
    /// Parse `{ skillId: { rarity, alternatives: [...] } }`.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let skills: HashMap<String, SkillEntry> =
            serde_json::from_str(json).map_err(|err| CatalogError::Parse(err.to_string()))?;
        if let Some((id, _)) = skills.iter().find(|(_, entry)| entry.alternatives.is_empty()) {
            return Err(CatalogError::Parse(format!("skill {id} has no alternatives")));
        }
        Ok(Self { skills })
    }

    pub fn get(&self, skill_id: &str) -> Result<&SkillEntry, CatalogError> {
        self.skills
            .get(skill_id)
            .ok_or_else(|| CatalogError::UnknownSkill(skill_id.to_string()))
    }

    #[must_use]
    pub fn contains(&self, skill_id: &str) -> bool {
        self.skills.contains_key(skill_id)
    }

    /// Skill ids in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.skills.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SkillEntry)> {
        self.skills.iter().map(|(id, entry)| (id.as_str(), entry))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.skills.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::TARGET_SELF;

    const SAMPLE: &str = r#"{
        "200331": {
            "rarity": 2,
            "alternatives": [{
                "precondition": "",
                "condition": "phase==2&corner!=0",
                "baseDuration": 30000,
                "effects": [{"type": 27, "modifier": 3500, "target": 1}]
            }]
        },
        "201611": {
            "rarity": 1,
            "alternatives": [{
                "condition": "order_rate>50",
                "baseDuration": 30000,
                "effects": [{"type": 27, "modifier": -1500, "target": 18}, {"type": 501, "modifier": 1, "target": 1}]
            }]
        }
    }"#;

    #[test]
    fn loads_and_scales_effects() {
        let catalog = SkillCatalog::from_json(SAMPLE).expect("sample parses");
        assert_eq!(catalog.ids(), vec!["200331", "201611"]);
        let entry = catalog.get("200331").expect("present");
        let effects = entry.alternatives[0].effects(Perspective::Own);
        assert_eq!(
            effects,
            vec![SkillEffect {
                effect_type: SkillType::TargetSpeed,
                base_duration: 3.0,
                modifier: 0.35,
            }]
        );
        assert!(!entry.alternatives[0].has_precondition());
        assert_eq!(entry.alternatives[0].effects[0].target, TARGET_SELF);
    }

    #[test]
    fn debuffs_only_apply_from_the_other_side() {
        let catalog = SkillCatalog::from_json(SAMPLE).expect("sample parses");
        let alt = &catalog.get("201611").expect("present").alternatives[0];
        let own = alt.effects(Perspective::Own);
        assert_eq!(own[0].effect_type, SkillType::Noop);
        assert_eq!(own[1].effect_type, SkillType::Noop);
        let other = alt.effects(Perspective::Other);
        assert_eq!(other[0].effect_type, SkillType::TargetSpeed);
        assert!((other[0].modifier + 0.15).abs() < 1e-12);
    }

    #[test]
    fn unknown_ids_and_bad_json_are_errors() {
        let catalog = SkillCatalog::from_json(SAMPLE).expect("sample parses");
        assert_eq!(
            catalog.get("999999").unwrap_err(),
            CatalogError::UnknownSkill("999999".into())
        );
        assert!(matches!(
            SkillCatalog::from_json("[1, 2]"),
            Err(CatalogError::Parse(_))
        ));
        assert!(matches!(
            SkillCatalog::from_json(r#"{"1": {"rarity": 1, "alternatives": []}}"#),
            Err(CatalogError::Parse(_))
        ));
    }
}
