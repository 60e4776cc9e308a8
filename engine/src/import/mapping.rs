//! Stage 2: column headers to schema fields.
//!
//! A header is resolved by exact lookup in [`EXACT_HEADERS`] first, then by
//! the ordered [`HEURISTICS`] over its trimmed, lowercased text. The first
//! rule that matches wins; no match means the column is skipped.

use crate::schema::household::*;
use crate::schema::Schema;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Where a column's values go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Field(String),
    Skip,
}

impl Target {
    pub fn field(&self) -> Option<&str> {
        match self {
            Target::Field(name) => Some(name),
            Target::Skip => None,
        }
    }
}

/// Headers of the household template, verbatim.
pub const EXACT_HEADERS: &[(&str, &str)] = &[
    ("date", DATE),
    ("village", VILLAGE),
    ("name", NAME),
    ("Livelihood description, NREGA work", LIVELIHOOD),
    ("Anyone in Family Does MNREGA Work", FAMILY_NREGA_STATUS),
    ("Landholding?", LANDHOLDING),
    ("# members in household", MEMBERS),
    ("# children", CHILDREN),
    ("Family Notes", FAMILY_NOTES),
    ("# kalamandir chicks alive", CHICKS_ALIVE),
    ("# female kalamandir chicks alive", FEMALE_CHICKS_ALIVE),
    ("Mortality Category", MORTALITY_CATEGORY),
    ("Mortality Description", MORTALITY_DESCRIPTION),
    ("Own poultry", OWN_POULTRY),
    ("Care description", CARE_DESCRIPTION),
    ("Azolla Status", AZOLLA_STATUS),
    ("Azolla Notes", AZOLLA_NOTES),
    ("Where they sell", SELL_LOCATION),
    ("Selling description (price, frequency etc.)", SELLING_DESCRIPTION),
    ("Entrepreneurial Tendencies", ENTREPRENEURIAL_TENDENCIES),
    ("Entrepreneurial Aspirations", ENTREPRENEURIAL_ASPIRATIONS),
    ("Village Level Egg FPO Acceptance", FPO_ACCEPTANCE),
    ("Additional Notes", ADDITIONAL_NOTES),
];

/// A keyword rule over a normalized (trimmed, lowercased) header.
#[derive(Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    pub matches: fn(&str) -> bool,
    pub field: &'static str,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("field", &self.field)
            .finish()
    }
}

/// Fallback rules, evaluated top to bottom.
pub const HEURISTICS: &[Rule] = &[
    Rule { name: "date", matches: |h| h.contains("date"), field: DATE },
    Rule { name: "name", matches: |h| h == "name", field: NAME },
    Rule { name: "village", matches: |h| h.contains("village"), field: VILLAGE },
    Rule { name: "members", matches: |h| h.contains("members"), field: MEMBERS },
    Rule { name: "children", matches: |h| h.contains("children"), field: CHILDREN },
    Rule { name: "land", matches: |h| h.contains("land"), field: LANDHOLDING },
    Rule {
        name: "female chicks",
        matches: |h| h.contains("female") && h.contains("chick"),
        field: FEMALE_CHICKS_ALIVE,
    },
    Rule {
        name: "chicks",
        matches: |h| h.contains("kalamandir") || (h.contains("chick") && !h.contains("female")),
        field: CHICKS_ALIVE,
    },
    Rule {
        name: "family nrega",
        matches: |h| h.contains("nrega") && (h.contains("family") || h.contains("anyone")),
        field: FAMILY_NREGA_STATUS,
    },
    Rule { name: "nrega", matches: |h| h.contains("nrega"), field: LIVELIHOOD },
    Rule { name: "livelihood", matches: |h| h.contains("livelihood"), field: LIVELIHOOD },
    Rule {
        name: "mortality category",
        matches: |h| h.contains("mortality") && h.contains("category"),
        field: MORTALITY_CATEGORY,
    },
    Rule { name: "mortality", matches: |h| h.contains("mortality"), field: MORTALITY_DESCRIPTION },
    Rule {
        name: "selling description",
        matches: |h| h.contains("selling") && h.contains("description"),
        field: SELLING_DESCRIPTION,
    },
    Rule { name: "sell", matches: |h| h.contains("sell"), field: SELL_LOCATION },
    Rule { name: "tendency", matches: |h| h.contains("tendenc"), field: ENTREPRENEURIAL_TENDENCIES },
    Rule {
        name: "aspiration",
        matches: |h| h.contains("aspiration"),
        field: ENTREPRENEURIAL_ASPIRATIONS,
    },
    Rule {
        name: "azolla status",
        matches: |h| h.contains("azolla") && h.contains("status"),
        field: AZOLLA_STATUS,
    },
    Rule { name: "azolla", matches: |h| h.contains("azolla"), field: AZOLLA_NOTES },
    Rule { name: "fpo", matches: |h| h.contains("fpo"), field: FPO_ACCEPTANCE },
    Rule { name: "poultry", matches: |h| h.contains("poultry"), field: OWN_POULTRY },
    Rule { name: "care", matches: |h| h.contains("care"), field: CARE_DESCRIPTION },
    Rule {
        name: "family notes",
        matches: |h| h.contains("family") && h.contains("notes"),
        field: FAMILY_NOTES,
    },
    Rule { name: "notes", matches: |h| h.contains("notes"), field: ADDITIONAL_NOTES },
];

/// The first heuristic rule matching `header`, if any.
pub fn matching_rule(header: &str) -> Option<&'static Rule> {
    let normalized = header.trim().to_lowercase();
    HEURISTICS.iter().find(|rule| (rule.matches)(&normalized))
}

/// Resolve a header to a target field name, ignoring any schema.
pub fn guess(header: &str) -> Target {
    let trimmed = header.trim();
    EXACT_HEADERS
        .iter()
        .find(|(exact, _)| *exact == trimmed)
        .map(|(_, field)| *field)
        .or_else(|| matching_rule(header).map(|rule| rule.field))
        .map(|field| Target::Field(field.to_string()))
        .unwrap_or(Target::Skip)
}

/// Per-column targets for one parsed table, in column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    columns: Vec<(String, Target)>,
}

impl ColumnMapping {
    /// Guess a target for every header. Guesses naming a field the schema
    /// does not declare become [`Target::Skip`].
    pub fn guess(headers: &[String], schema: &Schema) -> Self {
        let columns = headers
            .iter()
            .map(|header| {
                let target = match guess(header) {
                    Target::Field(field) if schema.contains(&field) => Target::Field(field),
                    _ => Target::Skip,
                };
                (header.clone(), target)
            })
            .collect();
        Self { columns }
    }

    pub fn target(&self, header: &str) -> Option<&Target> {
        self.columns
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, target)| target)
    }

    /// Override the target of one column.
    pub fn set(&mut self, header: &str, target: Target, schema: &Schema) -> Result<()> {
        if let Target::Field(field) = &target {
            if !schema.contains(field) {
                return Err(Error::UnknownField(field.clone()));
            }
        }
        let slot = self
            .columns
            .iter_mut()
            .find(|(h, _)| h == header)
            .ok_or_else(|| Error::UnknownColumn(header.to_string()))?;
        slot.1 = target;
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Target)> {
        self.columns.iter().map(|(h, t)| (h.as_str(), t))
    }

    /// Columns that will be imported.
    pub fn mapped(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns
            .iter()
            .filter_map(|(h, t)| t.field().map(|f| (h.as_str(), f)))
    }
}
