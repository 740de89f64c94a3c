//! Per-form field schemas.
//!
//! Every supported (form type, tax year) pair maps to an ordered list of
//! field definitions. Schemas are data, not types: new forms and new years
//! are added by registering another schema record, never by subclassing.
//! Registered schemas are immutable: a past year's exports must stay
//! reproducible, so re-registering an existing pair is a conflict, not an
//! overwrite.

pub mod builtin;
pub mod registry;

pub use registry::SchemaRegistry;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("no schema registered for {form_type} tax year {tax_year}")]
    UnknownForm { form_type: FormType, tax_year: i32 },

    #[error("schema already registered for {form_type} tax year {tax_year}")]
    Conflict { form_type: FormType, tax_year: i32 },
}

/// The tax form types TaxClaw recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FormType {
    #[serde(rename = "W-2")]
    W2,
    #[serde(rename = "1099-NEC")]
    Nec1099,
    #[serde(rename = "1099-INT")]
    Int1099,
    #[serde(rename = "1099-DIV")]
    Div1099,
    #[serde(rename = "1099-B")]
    B1099,
    #[serde(rename = "1099-R")]
    R1099,
    #[serde(rename = "1099-DA")]
    Da1099,
    #[serde(rename = "K-1")]
    K1,
    #[serde(rename = "1040")]
    F1040,
    #[serde(rename = "unknown")]
    Unknown,
}

impl FormType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::W2 => "W-2",
            Self::Nec1099 => "1099-NEC",
            Self::Int1099 => "1099-INT",
            Self::Div1099 => "1099-DIV",
            Self::B1099 => "1099-B",
            Self::R1099 => "1099-R",
            Self::Da1099 => "1099-DA",
            Self::K1 => "K-1",
            Self::F1040 => "1040",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "W-2" => Some(Self::W2),
            "1099-NEC" => Some(Self::Nec1099),
            "1099-INT" => Some(Self::Int1099),
            "1099-DIV" => Some(Self::Div1099),
            "1099-B" => Some(Self::B1099),
            "1099-R" => Some(Self::R1099),
            "1099-DA" => Some(Self::Da1099),
            "K-1" => Some(Self::K1),
            "1040" => Some(Self::F1040),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl std::fmt::Display for FormType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What representations a field's extracted value may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Money,
    Text,
    Date,
    Boolean,
    Enum,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Money => "money",
            Self::Text => "text",
            Self::Date => "date",
            Self::Boolean => "boolean",
            Self::Enum => "enum",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "money" => Some(Self::Money),
            "text" => Some(Self::Text),
            "date" => Some(Self::Date),
            "boolean" => Some(Self::Boolean),
            "enum" => Some(Self::Enum),
            _ => None,
        }
    }
}

/// One extractable box on a form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Normalized identifier, e.g. `box_1_wages`.
    pub key: String,
    /// The printed box label, shown to reviewers and used in prompts.
    pub label: String,
    pub kind: ValueKind,
    pub required: bool,
    /// Permitted values for `ValueKind::Enum` fields; empty otherwise.
    pub choices: Vec<String>,
}

impl FieldDefinition {
    pub fn new(key: &str, label: &str, kind: ValueKind, required: bool) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            kind,
            required,
            choices: Vec::new(),
        }
    }

    pub fn enumerated(key: &str, label: &str, required: bool, choices: &[&str]) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            kind: ValueKind::Enum,
            required,
            choices: choices.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Ordered field definitions for one (form type, tax year) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormSchema {
    pub form_type: FormType,
    pub tax_year: i32,
    pub fields: Vec<FieldDefinition>,
}

impl FormSchema {
    pub fn new(form_type: FormType, tax_year: i32, fields: Vec<FieldDefinition>) -> Self {
        Self {
            form_type,
            tax_year,
            fields,
        }
    }

    pub fn field(&self, key: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.key.as_str())
    }
}
