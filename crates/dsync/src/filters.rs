//! 🔍 Filters: opt-in narrowing of what gets synced.
//!
//! A filter is a `;`-separated bag of `Key=Value` pairs:
//!
//! ```text
//! Type=aws_integration;Name=account_id;Value=123456789012;Operator=Equals
//! ```
//!
//! `Name` is a dotted attribute path. When it lands on a list, the filter tests
//! membership. Filters for other resource types are ignored, and an instance with
//! no applicable filters sails through. Multiple applicable filters are combined
//! with one global AND/OR, chosen once per run.
//!
//! A path that does not exist never matches, not even under `Not`. "I couldn't find
//! the field" is not the same thing as "the field is different". 🦆

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::errors::EngineError;
use crate::identity::lookup;

/// ⚖️ How one filter compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Equals,
    SubString,
    Not,
}

impl FromStr for FilterOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "equals" => Ok(FilterOperator::Equals),
            "substring" => Ok(FilterOperator::SubString),
            "not" => Ok(FilterOperator::Not),
            other => Err(format!(
                "operator '{other}' is not one of Equals, SubString, Not"
            )),
        }
    }
}

/// 🔀 How applicable filters are combined for one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    And,
    #[default]
    Or,
}

impl FromStr for FilterMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AND" => Ok(FilterMode::And),
            "OR" => Ok(FilterMode::Or),
            _ => Err(EngineError::InvalidFilter {
                filter: s.to_string(),
                reason: "filter operator must be AND or OR".to_string(),
            }),
        }
    }
}

/// 🎯 One compiled filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub resource_type: String,
    pub attr_path: String,
    pub value: String,
    pub operator: FilterOperator,
}

impl FromStr for Filter {
    type Err = EngineError;

    fn from_str(expr: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| EngineError::InvalidFilter {
            filter: expr.to_string(),
            reason,
        };

        let mut resource_type = None;
        let mut attr_path = None;
        let mut value = None;
        let mut operator = FilterOperator::Equals;

        for pair in expr.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, val) = pair
                .split_once('=')
                .ok_or_else(|| invalid(format!("'{pair}' is not Key=Value")))?;
            match key.trim().to_ascii_lowercase().as_str() {
                "type" => resource_type = Some(val.trim().to_string()),
                "name" => attr_path = Some(val.trim().to_string()),
                "value" => value = Some(val.to_string()),
                "operator" => operator = val.trim().parse().map_err(invalid)?,
                other => return Err(invalid(format!("unknown key '{other}'"))),
            }
        }

        Ok(Filter {
            resource_type: resource_type.ok_or_else(|| invalid("missing Type".into()))?,
            attr_path: attr_path.ok_or_else(|| invalid("missing Name".into()))?,
            value: value.ok_or_else(|| invalid("missing Value".into()))?,
            operator,
        })
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Type={};Name={};Value={};Operator={:?}",
            self.resource_type, self.attr_path, self.value, self.operator
        )
    }
}

impl Filter {
    /// ✅ Does this instance satisfy the filter?
    pub fn matches(&self, instance: &Value) -> bool {
        let Some(leaf) = lookup(instance, &self.attr_path) else {
            return false;
        };
        let hit = match leaf {
            Value::Array(items) => items.iter().any(|item| self.compare(item)),
            scalar => self.compare(scalar),
        };
        match self.operator {
            FilterOperator::Not => !hit,
            _ => hit,
        }
    }

    fn compare(&self, leaf: &Value) -> bool {
        let text = match leaf {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            // -- 🐍 "True" and "true" are the same bool, whoever wrote the config
            Value::Bool(b) => return b.to_string().eq_ignore_ascii_case(self.value.trim()),
            _ => return false,
        };
        match self.operator {
            FilterOperator::SubString => text.contains(&self.value),
            FilterOperator::Equals | FilterOperator::Not => text == self.value,
        }
    }
}

/// 📋 Every filter for the run plus the global combine mode.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    filters: Vec<Filter>,
    mode: FilterMode,
}

impl FilterSet {
    pub fn new(filters: Vec<Filter>, mode: FilterMode) -> Self {
        Self { filters, mode }
    }

    /// 🏗️ Compile raw expressions. The first malformed one fails the whole set.
    pub fn parse<S: AsRef<str>>(exprs: &[S], mode: &str) -> Result<Self, EngineError> {
        let filters = exprs
            .iter()
            .map(|expr| expr.as_ref().parse())
            .collect::<Result<Vec<Filter>, _>>()?;
        Ok(Self::new(filters, mode.parse()?))
    }

    fn applicable<'a>(&'a self, resource_type: &'a str) -> impl Iterator<Item = &'a Filter> + 'a {
        self.filters
            .iter()
            .filter(move |f| f.resource_type == resource_type)
    }

    /// ✅ Does `instance` of `resource_type` survive the filters?
    pub fn allows(&self, resource_type: &str, instance: &Value) -> bool {
        let mut applicable = self.applicable(resource_type).peekable();
        if applicable.peek().is_none() {
            return true;
        }
        match self.mode {
            FilterMode::And => applicable.all(|f| f.matches(instance)),
            FilterMode::Or => applicable.any(|f| f.matches(instance)),
        }
    }

    /// 🎯 The literal values of `Equals` filters on `attr_path` for a type. Types
    /// with no list endpoint use these as the ids to import.
    pub fn equals_values(&self, resource_type: &str, attr_path: &str) -> Vec<String> {
        self.applicable(resource_type)
            .filter(|f| f.operator == FilterOperator::Equals && f.attr_path == attr_path)
            .map(|f| f.value.clone())
            .collect()
    }
}
