//! Startup seed file for principals, groups, scenarios and models
//!
//! Records that already exist are left untouched, so the same file can be
//! applied on every start.

use crate::db::{Database, DbError, PrincipalRole};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SeedError {
    #[error("Failed to read seed file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid seed file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Db(#[from] DbError),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SeedData {
    pub groups: Vec<SeedGroup>,
    pub principals: Vec<SeedPrincipal>,
    pub scenarios: Vec<SeedScenario>,
    pub llm_models: Vec<SeedModel>,
    /// Group to scenario submit grants
    pub access: Vec<SeedAccess>,
    pub scenario_models: Vec<SeedScenarioModel>,
}

#[derive(Debug, Deserialize)]
pub struct SeedGroup {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SeedPrincipal {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub role: PrincipalRole,
    #[serde(default)]
    pub group_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SeedScenario {
    pub id: String,
    pub name: String,
    pub config: Value,
}

#[derive(Debug, Deserialize)]
pub struct SeedModel {
    pub id: String,
    pub provider: String,
    pub name: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Deserialize)]
pub struct SeedAccess {
    pub group_id: String,
    pub scenario_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SeedScenarioModel {
    pub scenario_id: String,
    pub llm_model_id: String,
    #[serde(default)]
    pub is_default: bool,
}

/// Counts of records inserted by one seed run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub principals: usize,
    pub scenarios: usize,
    pub llm_models: usize,
}

pub fn load_file(db: &Database, path: &Path) -> Result<SeedReport, SeedError> {
    let raw = std::fs::read_to_string(path)?;
    let data: SeedData = serde_json::from_str(&raw)?;
    apply(db, &data)
}

/// Insert missing records in dependency order
pub fn apply(db: &Database, data: &SeedData) -> Result<SeedReport, SeedError> {
    let mut report = SeedReport::default();

    for group in &data.groups {
        db.create_group(&group.id, &group.name)?;
    }

    for principal in &data.principals {
        match db.get_principal(&principal.id) {
            Ok(_) => {}
            Err(DbError::PrincipalNotFound(_)) => {
                db.create_principal(
                    &principal.id,
                    &principal.name,
                    principal.role,
                    principal.group_id.as_deref(),
                )?;
                report.principals += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    for scenario in &data.scenarios {
        match db.get_scenario(&scenario.id) {
            Ok(_) => {}
            Err(DbError::ScenarioNotFound(_)) => {
                db.create_scenario(&scenario.id, &scenario.name, &scenario.config)?;
                report.scenarios += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    for model in &data.llm_models {
        match db.get_llm_model(&model.id) {
            Ok(_) => {}
            Err(DbError::ModelNotFound(_)) => {
                db.create_llm_model(&model.id, &model.provider, &model.name, &model.params)?;
                report.llm_models += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    for grant in &data.access {
        db.grant_scenario_access(&grant.group_id, &grant.scenario_id)?;
    }

    // An existing default is kept unless the file names one
    for binding in &data.scenario_models {
        if binding.is_default {
            db.set_default_scenario_model(&binding.scenario_id, &binding.llm_model_id)?;
        } else {
            db.attach_scenario_model(&binding.scenario_id, &binding.llm_model_id)?;
        }
    }

    Ok(report)
}
