use std::collections::BTreeMap;

use super::TenantLevel;
use crate::backends::id::{sub_path, variable_name};
use crate::backends::{fields_to_json, BackendError, Result, SecretValue};
use crate::rotation::generate_secret;

const EMPTY_OBJECT: &str = "{}";

const ENVIRONMENT_SECRETS: &[&str] = &["zones"];
const TEAM_SECRETS: &[&str] = &["clientSecret", "teamToken"];
const APPLICATION_SECRETS: &[&str] = &["clientSecret", "externalSecrets"];

/// One variable to write during onboarding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,
    pub value: SecretValue,
    /// Caller-supplied fields folded into `value`.
    pub fields: BTreeMap<String, String>,
}

/// The secrets a tenant level owns, with their default values.
#[derive(Debug)]
pub struct SecretCatalog {
    level: TenantLevel,
    secrets: BTreeMap<String, SecretValue>,
    fields: BTreeMap<String, BTreeMap<String, String>>,
    secret_length: usize,
}

impl SecretCatalog {
    /// Names of the secrets owned at `level`.
    pub fn names(level: TenantLevel) -> &'static [&'static str] {
        match level {
            TenantLevel::Environment => ENVIRONMENT_SECRETS,
            TenantLevel::Team => TEAM_SECRETS,
            TenantLevel::Application => APPLICATION_SECRETS,
        }
    }

    /// Catalog with defaults: JSON containers start as `{}`, credentials random.
    pub fn new(level: TenantLevel, secret_length: usize) -> Self {
        let secrets = Self::names(level)
            .iter()
            .map(|name| {
                let default = match *name {
                    "zones" | "externalSecrets" => EMPTY_OBJECT.to_string(),
                    _ => generate_secret(secret_length),
                };
                (name.to_string(), SecretValue::Initial(default))
            })
            .collect();

        Self {
            level,
            secrets,
            fields: BTreeMap::new(),
            secret_length,
        }
    }

    pub fn level(&self) -> TenantLevel {
        self.level
    }

    /// Override a catalog secret, or set one field of it with `name/field`.
    pub fn try_set(&mut self, path: &str, value: SecretValue) -> Result<()> {
        let name = variable_name(path);
        if !self.secrets.contains_key(name) {
            return Err(BackendError::forbidden(
                path,
                format!("not a {} secret", self.level),
            ));
        }

        match sub_path(path) {
            None => {
                self.secrets.insert(name.to_string(), value);
            }
            Some(field) => {
                let resolved = value.resolve(None, self.secret_length).unwrap_or_default();
                self.fields
                    .entry(name.to_string())
                    .or_default()
                    .insert(field.to_string(), resolved);
            }
        }
        Ok(())
    }

    /// Fold fields into their parents and list the writes to perform.
    pub fn into_entries(self) -> Result<Vec<CatalogEntry>> {
        let mut fields = self.fields;
        self.secrets
            .into_iter()
            .map(|(name, value)| {
                let Some(entry_fields) = fields.remove(&name) else {
                    return Ok(CatalogEntry {
                        name,
                        value,
                        fields: BTreeMap::new(),
                    });
                };

                if !value.is_empty() && value.as_str() != Some(EMPTY_OBJECT) {
                    return Err(BackendError::invalid_value(format!(
                        "cannot set fields of non-empty secret {}",
                        name
                    )));
                }
                let encoded =
                    fields_to_json(entry_fields.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;
                Ok(CatalogEntry {
                    name,
                    value: SecretValue::Literal(encoded),
                    fields: entry_fields,
                })
            })
            .collect()
    }
}
