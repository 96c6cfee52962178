//! Structured input: a config-defined choice tree and the rules that turn a
//! picked key-value set back into an English phrase.
//!
//! Each node of the tree may contribute key-value pairs; a leaf's meaning is the
//! union of the pairs on its path from the root. Two leaves meaning the same
//! thing would make stored entries ambiguous, so that is a configuration error.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

use super::types::Kvs;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("multiple leaf choices mean {0:?}")]
    DuplicateLeaf(Kvs),

    #[error("choice without a label (under {parent:?})")]
    EmptyLabel { parent: String },
}

/// One choice as written in the config file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChoiceConfig {
    pub label: String,
    #[serde(default)]
    pub kv: Kvs,
    #[serde(default)]
    pub choices: Vec<ChoiceConfig>,
}

/// Predicate → phrase rule used by [`StructuredInput::english`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConversionRule {
    /// Key the rule reports on.
    pub key: String,
    /// If set, only this value matches.
    #[serde(default)]
    pub value: Option<String>,
    /// Fixed phrase to emit instead of the value.
    #[serde(default)]
    pub label: Option<String>,
    /// Word emitted before the label or value.
    #[serde(default)]
    pub prepend: Option<String>,
    /// Rules are applied in ascending order.
    #[serde(default)]
    pub order: i64,
}

/// The `[bots.structured]` config section.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StructuredConfig {
    pub choices: Vec<ChoiceConfig>,
    pub rules: Vec<ConversionRule>,
    /// Display labels for values, e.g. a drug identifier → its name.
    pub value_labels: BTreeMap<String, String>,
    /// Key whose distinct values get a line each in the bot status.
    pub dose_key: Option<String>,
}

/// A validated choice-tree node, serialized for the entry form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceNode {
    pub label: String,
    #[serde(skip_serializing_if = "Kvs::is_empty")]
    pub kv: Kvs,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<ChoiceNode>,
}

/// A bot's validated structured-input vocabulary.
#[derive(Debug, Clone, Default)]
pub struct StructuredInput {
    choices: Vec<ChoiceNode>,
    rules: Vec<ConversionRule>,
    value_labels: BTreeMap<String, String>,
    dose_key: Option<String>,
}

impl StructuredInput {
    /// Build the tree and check that every leaf means something different.
    pub fn from_config(config: &StructuredConfig) -> Result<Self, SchemaError> {
        let mut choices = Vec::with_capacity(config.choices.len());
        let mut leaves = Vec::new();
        for root in &config.choices {
            let (node, mut root_leaves) = build_node(root, &Kvs::new(), "")?;
            choices.push(node);
            leaves.append(&mut root_leaves);
        }
        check_unique_leaves(leaves)?;

        let mut rules = config.rules.clone();
        rules.sort_by_key(|r| r.order);

        Ok(Self {
            choices,
            rules,
            value_labels: config.value_labels.clone(),
            dose_key: config.dose_key.clone(),
        })
    }

    pub fn choices(&self) -> &[ChoiceNode] {
        &self.choices
    }

    pub fn dose_key(&self) -> Option<&str> {
        self.dose_key.as_deref()
    }

    /// Phrase for a stored key-value set, empty if no rule matched.
    pub fn english(&self, kvs: &Kvs) -> String {
        let mut words: Vec<&str> = Vec::new();
        for rule in &self.rules {
            for (k, v) in kvs {
                if *k != rule.key || rule.value.as_ref().is_some_and(|want| want != v) {
                    continue;
                }
                if let Some(prepend) = &rule.prepend {
                    words.push(prepend);
                }
                match &rule.label {
                    Some(label) => words.push(label),
                    None => words.push(self.value_labels.get(v).unwrap_or(v)),
                }
            }
        }
        words.join(" ")
    }

    /// English phrase, or the raw pairs when no rule covers them.
    pub fn describe(&self, kvs: &Kvs) -> String {
        let words = self.english(kvs);
        if words.is_empty() {
            kvs.iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(", ")
        } else {
            words
        }
    }
}

/// Walk one subtree. Returns the validated node and the accumulated kv-set of
/// every leaf beneath it.
fn build_node(
    config: &ChoiceConfig,
    inherited: &Kvs,
    parent: &str,
) -> Result<(ChoiceNode, Vec<Kvs>), SchemaError> {
    if config.label.trim().is_empty() {
        return Err(SchemaError::EmptyLabel {
            parent: parent.to_string(),
        });
    }

    let mut here = inherited.clone();
    here.extend(config.kv.iter().map(|(k, v)| (k.clone(), v.clone())));

    if config.choices.is_empty() {
        let node = ChoiceNode {
            label: config.label.clone(),
            kv: config.kv.clone(),
            choices: Vec::new(),
        };
        return Ok((node, vec![here]));
    }

    let mut children = Vec::with_capacity(config.choices.len());
    let mut leaves = Vec::new();
    for child in &config.choices {
        let (node, mut child_leaves) = build_node(child, &here, &config.label)?;
        children.push(node);
        leaves.append(&mut child_leaves);
    }

    let node = ChoiceNode {
        label: config.label.clone(),
        kv: config.kv.clone(),
        choices: children,
    };
    Ok((node, leaves))
}

fn check_unique_leaves(leaves: Vec<Kvs>) -> Result<(), SchemaError> {
    let mut seen = HashSet::with_capacity(leaves.len());
    for kvs in leaves {
        let key: Vec<(String, String)> = kvs.clone().into_iter().collect();
        if !seen.insert(key) {
            return Err(SchemaError::DuplicateLeaf(kvs));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kv(pairs: &[(&str, &str)]) -> Kvs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn leaf(label: &str, pairs: &[(&str, &str)]) -> ChoiceConfig {
        ChoiceConfig {
            label: label.into(),
            kv: kv(pairs),
            choices: Vec::new(),
        }
    }

    fn meds_config() -> StructuredConfig {
        StructuredConfig {
            choices: vec![ChoiceConfig {
                label: "ibuprofen".into(),
                kv: kv(&[("drug", "ibu")]),
                choices: vec![
                    leaf("200mg", &[("dose", "200mg")]),
                    leaf("400mg", &[("dose", "400mg")]),
                ],
            }],
            rules: vec![
                ConversionRule {
                    key: "dose".into(),
                    value: None,
                    label: None,
                    prepend: None,
                    order: 2,
                },
                ConversionRule {
                    key: "drug".into(),
                    value: None,
                    label: None,
                    prepend: Some("took".into()),
                    order: 1,
                },
            ],
            value_labels: [("ibu".to_string(), "ibuprofen".to_string())].into(),
            dose_key: Some("drug".into()),
        }
    }

    #[test]
    fn builds_tree_from_config() {
        let input = StructuredInput::from_config(&meds_config()).unwrap();
        assert_eq!(input.choices().len(), 1);
        assert_eq!(input.choices()[0].choices.len(), 2);
        assert_eq!(input.dose_key(), Some("drug"));
    }

    #[test]
    fn duplicate_leaf_kvs_are_rejected() {
        let mut config = meds_config();
        config.choices.push(ChoiceConfig {
            label: "advil".into(),
            kv: kv(&[("drug", "ibu")]),
            choices: vec![leaf("two hundred", &[("dose", "200mg")])],
        });

        let err = StructuredInput::from_config(&config).unwrap_err();
        assert_eq!(err, SchemaError::DuplicateLeaf(kv(&[("dose", "200mg"), ("drug", "ibu")])));
    }

    #[test]
    fn same_leaf_labels_with_different_paths_are_fine() {
        let config = StructuredConfig {
            choices: vec![
                ChoiceConfig {
                    label: "morning".into(),
                    kv: kv(&[("when", "am")]),
                    choices: vec![leaf("ok", &[("mood", "ok")])],
                },
                ChoiceConfig {
                    label: "evening".into(),
                    kv: kv(&[("when", "pm")]),
                    choices: vec![leaf("ok", &[("mood", "ok")])],
                },
            ],
            ..StructuredConfig::default()
        };
        assert!(StructuredInput::from_config(&config).is_ok());
    }

    #[test]
    fn empty_label_is_rejected() {
        let config = StructuredConfig {
            choices: vec![leaf(" ", &[("x", "1")])],
            ..StructuredConfig::default()
        };
        assert!(matches!(
            StructuredInput::from_config(&config),
            Err(SchemaError::EmptyLabel { .. })
        ));
    }

    #[test]
    fn english_follows_rule_order_and_labels() {
        let input = StructuredInput::from_config(&meds_config()).unwrap();
        let phrase = input.english(&kv(&[("dose", "200mg"), ("drug", "ibu")]));
        assert_eq!(phrase, "took ibuprofen 200mg");
    }

    #[test]
    fn value_specific_rule_only_matches_that_value() {
        let mut config = meds_config();
        config.rules = vec![ConversionRule {
            key: "mood".into(),
            value: Some("bad".into()),
            label: Some("feeling rough".into()),
            prepend: None,
            order: 0,
        }];
        let input = StructuredInput::from_config(&config).unwrap();
        assert_eq!(input.english(&kv(&[("mood", "bad")])), "feeling rough");
        assert_eq!(input.english(&kv(&[("mood", "good")])), "");
    }

    #[test]
    fn describe_falls_back_to_raw_pairs() {
        let input = StructuredInput::default();
        assert_eq!(input.describe(&kv(&[("a", "1"), ("b", "2")])), "a=1, b=2");
    }
}
