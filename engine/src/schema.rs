//! Schema definition and normalization.
//!
//! A schema declares each field's type. Normalizing a field map runs every
//! declared field through the coercion table and zero-fills the ones that
//! are missing, so consumers never observe an absent declared field.

use crate::coerce::{coerce, DateSystem};
use crate::Fields;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field types supported in schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Number,
    Bool,
    /// Free text
    Text,
    /// Text restricted (informationally) to a set of options
    Enum,
    /// List of strings
    List,
    /// Calendar date as `YYYY-MM-DD`
    Date,
}

impl FieldType {
    /// The value a record carries when the field was never provided.
    pub fn zero_value(&self) -> Value {
        match self {
            FieldType::Number => Value::from(0),
            FieldType::Bool => Value::Bool(false),
            FieldType::List => Value::Array(Vec::new()),
            FieldType::Text | FieldType::Enum | FieldType::Date => Value::String(String::new()),
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Number => write!(f, "Number"),
            FieldType::Bool => write!(f, "Bool"),
            FieldType::Text => write!(f, "Text"),
            FieldType::Enum => write!(f, "Enum"),
            FieldType::List => write!(f, "List"),
            FieldType::Date => write!(f, "Date"),
        }
    }
}

/// Definition of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Field type
    pub field_type: FieldType,
    /// Allowed values for enum fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl FieldDef {
    /// Create a new field definition.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            options: Vec::new(),
        }
    }

    /// Create an enum field with its allowed options.
    pub fn enumeration(name: impl Into<String>, options: &[&str]) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Enum,
            options: options.iter().map(|o| o.to_string()).collect(),
        }
    }
}

/// An ordered set of field definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    /// Schema name (the remote collection name)
    pub name: String,
    /// Field definitions in display order
    pub fields: Vec<FieldDef>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Add a field definition (builder pattern).
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Look up a field definition by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether `name` is a declared field.
    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Coerce every declared field and zero-fill the missing ones.
    ///
    /// Undeclared fields are kept untouched as opaque payload.
    pub fn normalize(&self, input: &Fields, dates: DateSystem) -> Fields {
        let mut out = Fields::new();
        for def in &self.fields {
            let value = input
                .get(&def.name)
                .and_then(|raw| coerce(def.field_type, raw, dates))
                .unwrap_or_else(|| def.field_type.zero_value());
            out.insert(def.name.clone(), value);
        }
        for (name, value) in input {
            if name != "id" && !self.contains(name) {
                out.insert(name.clone(), value.clone());
            }
        }
        out
    }

    /// Fill every declared field missing from `fields` with its zero value.
    pub fn zero_fill(&self, fields: &mut Fields) {
        for def in &self.fields {
            fields
                .entry(def.name.clone())
                .or_insert_with(|| def.field_type.zero_value());
        }
    }

    /// The household survey schema used by the field team.
    pub fn households() -> Self {
        use household::*;

        Schema::new("households")
            .with_field(FieldDef::new(DATE, FieldType::Date))
            .with_field(FieldDef::new(NAME, FieldType::Text))
            .with_field(FieldDef::new(VILLAGE, FieldType::Text))
            .with_field(FieldDef::new(LIVELIHOOD, FieldType::Text))
            .with_field(FieldDef::enumeration(
                FAMILY_NREGA_STATUS,
                &["Yes", "No", "Did in the Past"],
            ))
            .with_field(FieldDef::new(LANDHOLDING, FieldType::Bool))
            .with_field(FieldDef::new(MEMBERS, FieldType::Number))
            .with_field(FieldDef::new(CHILDREN, FieldType::Number))
            .with_field(FieldDef::new(FAMILY_NOTES, FieldType::Text))
            .with_field(FieldDef::new(CHICKS_ALIVE, FieldType::Number))
            .with_field(FieldDef::new(FEMALE_CHICKS_ALIVE, FieldType::Number))
            .with_field(FieldDef::new(MORTALITY_CATEGORY, FieldType::List))
            .with_field(FieldDef::new(MORTALITY_DESCRIPTION, FieldType::Text))
            .with_field(FieldDef::new(OWN_POULTRY, FieldType::Text))
            .with_field(FieldDef::new(CARE_DESCRIPTION, FieldType::Text))
            .with_field(FieldDef::enumeration(
                AZOLLA_STATUS,
                &["Remaining", "Destroyed", "Data Unavailable", "Not Azolla Beneficiary"],
            ))
            .with_field(FieldDef::new(AZOLLA_NOTES, FieldType::Text))
            .with_field(FieldDef::new(SELL_LOCATION, FieldType::List))
            .with_field(FieldDef::new(SELLING_DESCRIPTION, FieldType::Text))
            .with_field(FieldDef::enumeration(
                ENTREPRENEURIAL_TENDENCIES,
                &["Low", "Medium", "High"],
            ))
            .with_field(FieldDef::new(ENTREPRENEURIAL_ASPIRATIONS, FieldType::Text))
            .with_field(FieldDef::new(FPO_ACCEPTANCE, FieldType::Bool))
            .with_field(FieldDef::new(ADDITIONAL_NOTES, FieldType::Text))
    }
}

/// Field names of the household survey schema.
pub mod household {
    pub const DATE: &str = "date";
    pub const NAME: &str = "name";
    pub const VILLAGE: &str = "village";
    pub const LIVELIHOOD: &str = "livelihoodDescriptionandnregaWork";
    pub const FAMILY_NREGA_STATUS: &str = "familyNregaStatus";
    pub const LANDHOLDING: &str = "landholding";
    pub const MEMBERS: &str = "membersInHousehold";
    pub const CHILDREN: &str = "childrenInHousehold";
    pub const FAMILY_NOTES: &str = "familyNotes";
    pub const CHICKS_ALIVE: &str = "kalamandirChicksAlive";
    pub const FEMALE_CHICKS_ALIVE: &str = "femaleKalamandirChicksAlive";
    pub const MORTALITY_CATEGORY: &str = "mortalityCategory";
    pub const MORTALITY_DESCRIPTION: &str = "mortalityDescription";
    pub const OWN_POULTRY: &str = "ownPoultry";
    pub const CARE_DESCRIPTION: &str = "careDescription";
    pub const AZOLLA_STATUS: &str = "azollaStatus";
    pub const AZOLLA_NOTES: &str = "azollaNotes";
    pub const SELL_LOCATION: &str = "sellLocation";
    pub const SELLING_DESCRIPTION: &str = "sellingDescription";
    pub const ENTREPRENEURIAL_TENDENCIES: &str = "entrepreneurialTendencies";
    pub const ENTREPRENEURIAL_ASPIRATIONS: &str = "entrepreneurialAspirations";
    pub const FPO_ACCEPTANCE: &str = "fpoAcceptance";
    pub const ADDITIONAL_NOTES: &str = "additionalNotes";
}
