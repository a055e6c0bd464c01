//! Deck Layout Model
//!
//! Labware positions and the ordered layout submitted to the instrument.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Labware types understood by the instrument.
///
/// Serialized with the instrument's own names (`"96-well microplate"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LabwareType {
    #[serde(rename = "96-well microplate")]
    Microplate96,
    #[serde(rename = "384-well microplate")]
    Microplate384,
    #[serde(rename = "24-tube rack")]
    TubeRack24,
    #[serde(rename = "48-tube rack")]
    TubeRack48,
    #[serde(rename = "96-tube rack")]
    TubeRack96,
    #[serde(rename = "reservoir")]
    Reservoir,
    #[serde(rename = "96-tip rack")]
    TipRack96,
    #[serde(rename = "384-tip rack")]
    TipRack384,
    #[serde(rename = "adapter plate")]
    AdapterPlate,
    #[serde(rename = "custom")]
    Custom,
}

impl LabwareType {
    /// Instrument-facing name
    pub fn as_str(&self) -> &'static str {
        match self {
            LabwareType::Microplate96 => "96-well microplate",
            LabwareType::Microplate384 => "384-well microplate",
            LabwareType::TubeRack24 => "24-tube rack",
            LabwareType::TubeRack48 => "48-tube rack",
            LabwareType::TubeRack96 => "96-tube rack",
            LabwareType::Reservoir => "reservoir",
            LabwareType::TipRack96 => "96-tip rack",
            LabwareType::TipRack384 => "384-tip rack",
            LabwareType::AdapterPlate => "adapter plate",
            LabwareType::Custom => "custom",
        }
    }

}

impl fmt::Display for LabwareType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Occupancy of a deck position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    #[default]
    Empty,
    Occupied,
    Reserved,
    Error,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Empty => "empty",
            PositionStatus::Occupied => "occupied",
            PositionStatus::Reserved => "reserved",
            PositionStatus::Error => "error",
        }
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One labware slot on the deck
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub position_id: String,
    pub labware_type: LabwareType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
    #[serde(default)]
    pub status: PositionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_properties: Option<serde_json::Map<String, serde_json::Value>>,
}

impl Position {
    /// New position, empty until marked otherwise
    pub fn new(position_id: impl Into<String>, labware_type: LabwareType) -> Self {
        Self {
            position_id: position_id.into(),
            labware_type,
            barcode: None,
            status: PositionStatus::Empty,
            description: None,
            custom_properties: None,
        }
    }

    pub fn with_status(mut self, status: PositionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn occupied(self) -> Self {
        self.with_status(PositionStatus::Occupied)
    }

    pub fn with_barcode(mut self, barcode: impl Into<String>) -> Self {
        self.barcode = Some(barcode.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.custom_properties
            .get_or_insert_with(serde_json::Map::new)
            .insert(key.into(), value);
        self
    }
}

/// Ordered collection of positions submitted together
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Layout {
    positions: Vec<Position>,
}

impl Layout {
    pub fn new(positions: Vec<Position>) -> Self {
        Self { positions }
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// First position with this id
    pub fn get(&self, position_id: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.position_id == position_id)
    }

    pub fn push(&mut self, position: Position) {
        self.positions.push(position);
    }
}

impl FromIterator<Position> for Layout {
    fn from_iter<I: IntoIterator<Item = Position>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
