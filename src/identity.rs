//! Identity assignment for announcing modules.

use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use tracing::{info, warn};

use crate::error::{FleetError, Result};

/// Kind of module a device declares itself as on announcement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleType {
    Camera,
    Quadcopter,
    Controller,
    Position,
}

impl ModuleType {
    pub fn code(&self) -> i32 {
        match self {
            ModuleType::Camera => 0,
            ModuleType::Quadcopter => 1,
            ModuleType::Controller => 2,
            ModuleType::Position => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModuleType::Camera => "camera",
            ModuleType::Quadcopter => "quadcopter",
            ModuleType::Controller => "controller",
            ModuleType::Position => "position",
        }
    }
}

impl TryFrom<i32> for ModuleType {
    type Error = FleetError;

    fn try_from(code: i32) -> Result<Self> {
        match code {
            0 => Ok(ModuleType::Camera),
            1 => Ok(ModuleType::Quadcopter),
            2 => Ok(ModuleType::Controller),
            3 => Ok(ModuleType::Position),
            other => Err(FleetError::InvalidModuleType { module_type: other }),
        }
    }
}

/// Identity issued to one registered module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleIdentity {
    pub id: u32,
    pub module_type: ModuleType,
    /// Hardware id reported by camera modules
    pub hardware_id: Option<i64>,
}

/// Issues strictly increasing ids, starting at 0, and keeps them grouped by type.
///
/// Ids are never reused. A rejected announcement does not consume an id.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    next_id: u32,
    cameras: Vec<ModuleIdentity>,
    quadcopters: Vec<ModuleIdentity>,
    controllers: Vec<ModuleIdentity>,
    positions: Vec<ModuleIdentity>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module by its wire type code
    pub fn register(&mut self, type_code: i32, hardware_id: Option<i64>) -> Result<ModuleIdentity> {
        let module_type = ModuleType::try_from(type_code).map_err(|e| {
            warn!("Malformed register attempt with type {}", type_code);
            e
        })?;
        self.register_module(module_type, hardware_id)
    }

    pub fn register_module(
        &mut self,
        module_type: ModuleType,
        hardware_id: Option<i64>,
    ) -> Result<ModuleIdentity> {
        let identity = ModuleIdentity {
            id: self.next_id,
            module_type,
            hardware_id,
        };
        self.next_id = self.next_id.checked_add(1).ok_or_else(|| {
            warn!("Id space exhausted, refusing {} registration", module_type.name());
            FleetError::IdsExhausted
        })?;

        self.bucket_mut(module_type).push(identity);

        info!(
            "Registered new module with type {} and id {}",
            module_type.name(),
            identity.id
        );
        Ok(identity)
    }

    /// Id the next successful registration will receive
    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    pub fn modules(&self, module_type: ModuleType) -> &[ModuleIdentity] {
        match module_type {
            ModuleType::Camera => &self.cameras,
            ModuleType::Quadcopter => &self.quadcopters,
            ModuleType::Controller => &self.controllers,
            ModuleType::Position => &self.positions,
        }
    }

    pub fn lookup(&self, id: u32) -> Option<&ModuleIdentity> {
        [
            &self.cameras,
            &self.quadcopters,
            &self.controllers,
            &self.positions,
        ]
        .into_iter()
        .flat_map(|bucket| bucket.iter())
        .find(|identity| identity.id == id)
    }

    pub fn is_camera(&self, id: u32) -> bool {
        self.cameras.iter().any(|identity| identity.id == id)
    }

    pub fn len(&self) -> usize {
        self.cameras.len() + self.quadcopters.len() + self.controllers.len() + self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn bucket_mut(&mut self, module_type: ModuleType) -> &mut Vec<ModuleIdentity> {
        match module_type {
            ModuleType::Camera => &mut self.cameras,
            ModuleType::Quadcopter => &mut self.quadcopters,
            ModuleType::Controller => &mut self.controllers,
            ModuleType::Position => &mut self.positions,
        }
    }
}
