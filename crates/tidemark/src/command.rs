//! Migration command flags.
//!
//! A [`MigrationCommand`] is a set of phases. Phases always run in the order
//! Drop, Create, Migrate, CodeGen, Schema, Reset, Data regardless of how the
//! flags were combined. `EXECUTE` and `SCRIPT` are standalone actions.

use crate::error::{MigrateError, Result};
use bitflags::bitflags;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MigrationCommand: u32 {
        const DROP = 1 << 0;
        const CREATE = 1 << 1;
        const MIGRATE = 1 << 2;
        const CODE_GEN = 1 << 3;
        const SCHEMA = 1 << 4;
        const RESET = 1 << 5;
        const DATA = 1 << 6;
        const EXECUTE = 1 << 10;
        const SCRIPT = 1 << 11;

        const DEPLOY = Self::MIGRATE.bits() | Self::SCHEMA.bits();
        const DEPLOY_WITH_DATA = Self::DEPLOY.bits() | Self::DATA.bits();
        const DATABASE = Self::CREATE.bits() | Self::MIGRATE.bits() | Self::CODE_GEN.bits() | Self::SCHEMA.bits();
        const ALL = Self::DATABASE.bits() | Self::DATA.bits();
        const DROP_AND_ALL = Self::DROP.bits() | Self::ALL.bits();
        const RESET_AND_DATA = Self::RESET.bits() | Self::DATA.bits();
        const RESET_AND_ALL = Self::RESET.bits() | Self::ALL.bits();
    }
}

/// A single lifecycle phase, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Drop,
    Create,
    Migrate,
    CodeGen,
    Schema,
    Reset,
    Data,
}

impl Phase {
    /// All phases in the fixed execution order.
    pub const ORDER: [Phase; 7] = [
        Phase::Drop,
        Phase::Create,
        Phase::Migrate,
        Phase::CodeGen,
        Phase::Schema,
        Phase::Reset,
        Phase::Data,
    ];

    pub fn flag(&self) -> MigrationCommand {
        match self {
            Phase::Drop => MigrationCommand::DROP,
            Phase::Create => MigrationCommand::CREATE,
            Phase::Migrate => MigrationCommand::MIGRATE,
            Phase::CodeGen => MigrationCommand::CODE_GEN,
            Phase::Schema => MigrationCommand::SCHEMA,
            Phase::Reset => MigrationCommand::RESET,
            Phase::Data => MigrationCommand::DATA,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Drop => "drop",
            Phase::Create => "create",
            Phase::Migrate => "migrate",
            Phase::CodeGen => "codegen",
            Phase::Schema => "schema",
            Phase::Reset => "reset",
            Phase::Data => "data",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl MigrationCommand {
    /// Reject empty commands and standalone actions mixed with anything else.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(MigrateError::Config("no migration command specified".into()));
        }
        for standalone in [MigrationCommand::EXECUTE, MigrationCommand::SCRIPT] {
            if self.contains(standalone) && *self != standalone {
                return Err(MigrateError::Config(format!(
                    "command '{}' cannot be combined with other commands",
                    name_of(standalone)
                )));
            }
        }
        Ok(())
    }

    /// Selected phases in execution order.
    pub fn phases(&self) -> Vec<Phase> {
        Phase::ORDER
            .into_iter()
            .filter(|p| self.contains(p.flag()))
            .collect()
    }

    pub fn includes(&self, phase: Phase) -> bool {
        self.contains(phase.flag())
    }
}

const NAMES: &[(&str, MigrationCommand)] = &[
    ("drop", MigrationCommand::DROP),
    ("create", MigrationCommand::CREATE),
    ("migrate", MigrationCommand::MIGRATE),
    ("codegen", MigrationCommand::CODE_GEN),
    ("schema", MigrationCommand::SCHEMA),
    ("reset", MigrationCommand::RESET),
    ("data", MigrationCommand::DATA),
    ("execute", MigrationCommand::EXECUTE),
    ("script", MigrationCommand::SCRIPT),
    ("deploy", MigrationCommand::DEPLOY),
    ("deploywithdata", MigrationCommand::DEPLOY_WITH_DATA),
    ("database", MigrationCommand::DATABASE),
    ("all", MigrationCommand::ALL),
    ("dropandall", MigrationCommand::DROP_AND_ALL),
    ("resetanddata", MigrationCommand::RESET_AND_DATA),
    ("resetandall", MigrationCommand::RESET_AND_ALL),
];

fn name_of(command: MigrationCommand) -> &'static str {
    NAMES
        .iter()
        .find(|(_, c)| *c == command)
        .map(|(n, _)| *n)
        .unwrap_or("unknown")
}

impl FromStr for MigrationCommand {
    type Err = MigrateError;

    /// Parse `migrate`, `DeployWithData`, `migrate,schema`, `reset|data` and so on.
    fn from_str(s: &str) -> Result<Self> {
        let mut command = MigrationCommand::empty();
        for part in s.split([',', '|', '+']).map(str::trim) {
            if part.is_empty() {
                continue;
            }
            let key = part.to_lowercase().replace(['-', '_'], "");
            let flag = NAMES
                .iter()
                .find(|(n, _)| *n == key)
                .map(|(_, c)| *c)
                .ok_or_else(|| {
                    MigrateError::Config(format!(
                        "unknown command '{}'. Valid commands: {}",
                        part,
                        NAMES.iter().map(|(n, _)| *n).collect::<Vec<_>>().join(", ")
                    ))
                })?;
            command |= flag;
        }
        command.validate()?;
        Ok(command)
    }
}

impl fmt::Display for MigrationCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some((name, _)) = NAMES.iter().find(|(_, c)| c == self) {
            return f.write_str(name);
        }
        let mut parts: Vec<&str> = self.phases().iter().map(|p| p.name()).collect();
        if self.contains(MigrationCommand::EXECUTE) {
            parts.push("execute");
        }
        if self.contains(MigrationCommand::SCRIPT) {
            parts.push("script");
        }
        f.write_str(&parts.join(","))
    }
}

impl Serialize for MigrationCommand {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}
