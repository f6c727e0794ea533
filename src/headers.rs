use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::path::Path;

use crate::models::{ParseErrorKind, RowError};
use crate::parser::mis::MisField;
use crate::parser::wbr::WbrField;

/// Canonical column of one registrar schema.
pub trait CanonicalField: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    fn name(&self) -> &'static str;
    fn all() -> &'static [Self];
    fn required() -> &'static [Self];
    fn builtin_aliases() -> &'static [(&'static str, Self)];

    fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|f| f.name() == name)
    }
}

pub fn normalize_header(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Literal header spelling -> canonical field. Built once, read-only afterwards.
#[derive(Debug, Clone)]
pub struct AliasTable<F: CanonicalField> {
    aliases: HashMap<String, F>,
}

impl<F: CanonicalField> AliasTable<F> {
    pub fn builtin() -> Self {
        let aliases = F::builtin_aliases()
            .iter()
            .map(|(alias, field)| (alias.to_string(), *field))
            .collect();
        Self { aliases }
    }

    /// Adds `spelling -> canonical name` pairs on top of the built-in table.
    pub fn with_overrides(mut self, overrides: &HashMap<String, String>) -> Result<Self> {
        for (spelling, canonical) in overrides {
            let field = F::from_name(canonical.trim())
                .ok_or_else(|| anyhow!("Unknown canonical field '{}' for alias '{}'", canonical, spelling))?;
            self.aliases.insert(normalize_header(spelling), field);
        }
        Ok(self)
    }

    pub fn lookup(&self, header: &str) -> Option<F> {
        self.aliases.get(&normalize_header(header)).copied()
    }

    /// Maps header cells to column indices. Unknown headers are ignored; a later
    /// duplicate spelling wins. Missing required fields abort with one row-0 error.
    pub fn resolve(&self, headers: &[String]) -> std::result::Result<ColumnMap<F>, RowError> {
        let mut indices = HashMap::new();
        for (idx, header) in headers.iter().enumerate() {
            if let Some(field) = self.lookup(header) {
                indices.insert(field, idx);
            }
        }

        let missing: Vec<&str> = F::required()
            .iter()
            .filter(|f| !indices.contains_key(*f))
            .map(|f| f.name())
            .collect();

        if !missing.is_empty() {
            let joined = missing.join(", ");
            return Err(RowError::file_level(
                joined.clone(),
                format!("Missing required columns: {}", joined),
                ParseErrorKind::MissingColumns,
            ));
        }

        Ok(ColumnMap { indices })
    }
}

#[derive(Debug, Clone)]
pub struct ColumnMap<F: CanonicalField> {
    indices: HashMap<F, usize>,
}

impl<F: CanonicalField> ColumnMap<F> {
    pub fn index_of(&self, field: F) -> Option<usize> {
        self.indices.get(&field).copied()
    }

    /// Trimmed cell value; empty or out-of-range cells read as absent.
    pub fn value<'a>(&self, field: F, values: &'a [String]) -> Option<&'a str> {
        let idx = self.index_of(field)?;
        let val = values.get(idx)?.trim();
        if val.is_empty() { None } else { Some(val) }
    }

    pub fn text(&self, field: F, values: &[String]) -> Option<String> {
        self.value(field, values).map(str::to_string)
    }
}

#[derive(Debug, Default, Deserialize)]
struct AliasOverrides {
    #[serde(default)]
    wbr: HashMap<String, String>,
    #[serde(default)]
    mis: HashMap<String, String>,
}

/// Alias tables for both registrar formats, shared by every parse.
#[derive(Debug, Clone)]
pub struct AliasTables {
    pub wbr: AliasTable<WbrField>,
    pub mis: AliasTable<MisField>,
}

impl Default for AliasTables {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AliasTables {
    pub fn builtin() -> Self {
        Self {
            wbr: AliasTable::builtin(),
            mis: AliasTable::builtin(),
        }
    }

    pub fn from_overrides_json(json: &str) -> Result<Self> {
        let overrides: AliasOverrides = serde_json::from_str(json).context("Invalid alias override JSON")?;
        Ok(Self {
            wbr: AliasTable::builtin().with_overrides(&overrides.wbr)?,
            mis: AliasTable::builtin().with_overrides(&overrides.mis)?,
        })
    }

    pub fn from_overrides_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read alias file {}", path.display()))?;
        Self::from_overrides_json(&json)
    }
}
