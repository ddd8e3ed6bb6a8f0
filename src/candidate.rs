use serde_json::{Map, Value};

use crate::errors::{AppError, AppResult};

/// One suggestion from the lookup service, reshaped from the deeply nested
/// payload into the pieces the scorer and the output writer care about.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Position in the provider's response, starting at 0.
    pub rank: usize,
    pub chi: AddressTree,
    pub eng: AddressTree,
    /// Carried through untouched; absence still disqualifies a suggestion.
    pub geo: Value,
    pub provider_score: f64,
}

/// A premises address as an ordered list of named fields. Keys arrive in
/// map order, so traversal is deterministic for identical payloads.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AddressTree {
    pub fields: Vec<AddressField>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddressField {
    pub name: String,
    pub node: AddressNode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AddressNode {
    Text(String),
    Object(AddressTree),
    Street(StreetValue),
}

/// Street or village block of a premises address. Building numbers keep
/// whatever the provider sent, including empty strings; normalization is
/// the matcher's business.
#[derive(Debug, Clone, PartialEq)]
pub struct StreetValue {
    pub kind: StreetKind,
    pub name: String,
    pub building_no_from: Option<String>,
    pub building_no_to: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreetKind {
    Street,
    Village,
}

impl StreetKind {
    pub fn field_name(self) -> &'static str {
        match self {
            StreetKind::Street => "StreetName",
            StreetKind::Village => "VillageName",
        }
    }
}

/// Turns the provider's `SuggestedAddress` array into ranked candidates.
/// Any suggestion missing a required branch fails the whole batch, since a
/// partial list would silently shift ranks.
pub fn flatten_suggestions(items: &[Value]) -> AppResult<Vec<Candidate>> {
    items
        .iter()
        .enumerate()
        .map(|(rank, item)| build_candidate(rank, item))
        .collect()
}

fn build_candidate(rank: usize, item: &Value) -> AppResult<Candidate> {
    let chi = require(item, rank, &["Address", "PremisesAddress", "ChiPremisesAddress"])?;
    let eng = require(item, rank, &["Address", "PremisesAddress", "EngPremisesAddress"])?;
    let geo = require(item, rank, &["Address", "PremisesAddress", "GeospatialInformation"])?;
    let score = require(item, rank, &["ValidationInformation", "Score"])?;
    let provider_score = score.as_f64().ok_or_else(|| {
        AppError::Schema(format!(
            "suggestion {rank} has a non-numeric ValidationInformation.Score"
        ))
    })?;

    Ok(Candidate {
        rank,
        chi: AddressTree::from_value(chi)?,
        eng: AddressTree::from_value(eng)?,
        geo: geo.clone(),
        provider_score,
    })
}

fn require<'a>(item: &'a Value, rank: usize, path: &[&str]) -> AppResult<&'a Value> {
    let mut node = item;
    for key in path {
        node = node.get(key).ok_or_else(|| {
            AppError::Schema(format!("suggestion {rank} is missing {}", path.join(".")))
        })?;
    }
    Ok(node)
}

impl AddressTree {
    pub fn from_value(value: &Value) -> AppResult<Self> {
        let Value::Object(map) = value else {
            return Err(AppError::Schema(
                "premises address is not an object".to_string(),
            ));
        };

        let mut fields = Vec::with_capacity(map.len());
        for (key, child) in map {
            let node = if is_street_key(key) {
                AddressNode::Street(StreetValue::from_value(key, child)?)
            } else {
                match child {
                    Value::String(text) => AddressNode::Text(text.clone()),
                    Value::Object(_) => AddressNode::Object(AddressTree::from_value(child)?),
                    // numbers, arrays and nulls carry nothing matchable
                    _ => continue,
                }
            };
            fields.push(AddressField {
                name: key.clone(),
                node,
            });
        }
        Ok(Self { fields })
    }

    /// Resolves a key path to a text leaf, `None` when any step is absent
    /// or the path ends on something that is not text.
    pub fn text_at(&self, path: &[&str]) -> Option<&str> {
        let (first, rest) = path.split_first()?;
        let field = self.fields.iter().find(|f| f.name == *first)?;
        match &field.node {
            AddressNode::Text(text) if rest.is_empty() => Some(text),
            AddressNode::Object(tree) => tree.text_at(rest),
            AddressNode::Street(street) => match rest {
                [leaf] => street.text_at(leaf),
                _ => None,
            },
            _ => None,
        }
    }
}

fn is_street_key(key: &str) -> bool {
    matches!(key, "ChiStreet" | "ChiVillage" | "EngStreet" | "EngVillage")
}

impl StreetValue {
    fn from_value(key: &str, value: &Value) -> AppResult<Self> {
        let Value::Object(map) = value else {
            return Err(AppError::Schema(format!("{key} is not an object")));
        };

        // VillageName takes precedence when a suggestion carries both.
        let (kind, name) = if let Some(name) = map.get("VillageName") {
            (StreetKind::Village, name)
        } else if let Some(name) = map.get("StreetName") {
            (StreetKind::Street, name)
        } else {
            return Err(AppError::Schema(format!(
                "{key} has neither StreetName nor VillageName"
            )));
        };
        let name = name
            .as_str()
            .ok_or_else(|| AppError::Schema(format!("{key} name is not a string")))?;
        if name.trim().is_empty() {
            return Err(AppError::Schema(format!("{key} name is empty")));
        }

        Ok(Self {
            kind,
            name: name.to_string(),
            building_no_from: text_field(map, key, "BuildingNoFrom")?,
            building_no_to: text_field(map, key, "BuildingNoTo")?,
        })
    }

    fn text_at(&self, key: &str) -> Option<&str> {
        if key == self.kind.field_name() {
            return Some(&self.name);
        }
        match key {
            "BuildingNoFrom" => self.building_no_from.as_deref(),
            "BuildingNoTo" => self.building_no_to.as_deref(),
            _ => None,
        }
    }
}

fn text_field(map: &Map<String, Value>, parent: &str, key: &str) -> AppResult<Option<String>> {
    match map.get(key) {
        None => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(_) => Err(AppError::Schema(format!("{parent}.{key} is not a string"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn suggestion(chi: Value, eng: Value, score: f64) -> Value {
        json!({
            "Address": {
                "PremisesAddress": {
                    "ChiPremisesAddress": chi,
                    "EngPremisesAddress": eng,
                    "GeospatialInformation": { "Latitude": 22.28, "Longitude": 114.15 },
                }
            },
            "ValidationInformation": { "Score": score },
        })
    }

    #[test]
    fn flattens_ranked_suggestions() {
        let items = vec![
            suggestion(
                json!({
                    "Region": "香港",
                    "ChiStreet": { "StreetName": "皇后大道中", "BuildingNoFrom": "99" },
                    "BuildingName": "中環中心",
                }),
                json!({
                    "Region": "HK",
                    "EngStreet": { "StreetName": "QUEEN'S ROAD CENTRAL", "BuildingNoFrom": "99" },
                }),
                75.0,
            ),
            suggestion(json!({ "Region": "九龍" }), json!({ "Region": "KLN" }), 62.5),
        ];

        let candidates = flatten_suggestions(&items).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].rank, 0);
        assert_eq!(candidates[1].rank, 1);
        assert_eq!(candidates[0].provider_score, 75.0);
        assert_eq!(
            candidates[0].chi.text_at(&["ChiStreet", "StreetName"]),
            Some("皇后大道中")
        );
        assert_eq!(
            candidates[0].chi.text_at(&["ChiStreet", "BuildingNoFrom"]),
            Some("99")
        );
        assert_eq!(candidates[1].chi.text_at(&["Region"]), Some("九龍"));
    }

    #[test]
    fn rejects_missing_premises_branch() {
        let item = json!({
            "Address": { "PremisesAddress": { "ChiPremisesAddress": { "Region": "香港" } } },
            "ValidationInformation": { "Score": 50.0 },
        });

        let err = flatten_suggestions(&[item]).unwrap_err();
        assert!(err.to_string().contains("EngPremisesAddress"), "{err}");
    }

    #[test]
    fn rejects_street_without_any_name() {
        let item = suggestion(
            json!({ "ChiStreet": { "BuildingNoFrom": "12" } }),
            json!({ "Region": "HK" }),
            40.0,
        );

        let err = flatten_suggestions(&[item]).unwrap_err();
        assert!(err.to_string().contains("ChiStreet"), "{err}");
    }

    #[test]
    fn village_name_wins_over_street_name() {
        let item = suggestion(
            json!({ "ChiVillage": { "StreetName": "青麟路", "VillageName": "新慶村" } }),
            json!({ "Region": "NT" }),
            40.0,
        );

        let candidates = flatten_suggestions(&[item]).unwrap();
        let AddressNode::Street(street) = &candidates[0].chi.fields[0].node else {
            panic!("expected a street node");
        };
        assert_eq!(street.kind, StreetKind::Village);
        assert_eq!(street.name, "新慶村");
        assert_eq!(
            candidates[0].chi.text_at(&["ChiVillage", "VillageName"]),
            Some("新慶村")
        );
        assert_eq!(candidates[0].chi.text_at(&["ChiVillage", "StreetName"]), None);
    }

    #[test]
    fn ignores_leaves_that_are_not_text() {
        let tree = AddressTree::from_value(&json!({
            "Region": "香港",
            "Flags": [1, 2],
            "Count": 3,
            "ChiDistrict": { "DcDistrict": "中西區" },
        }))
        .unwrap();

        assert_eq!(tree.fields.len(), 2);
        assert_eq!(tree.text_at(&["Region"]), Some("香港"));
        assert_eq!(tree.text_at(&["ChiDistrict", "DcDistrict"]), Some("中西區"));
        assert_eq!(tree.text_at(&["Count"]), None);
        assert_eq!(tree.text_at(&["ChiDistrict", "Missing"]), None);
    }
}
