//! Instrument Catalog
//!
//! Immutable lookup table of liquid classes, tip types, labware working volumes
//! and named transfer protocols. Validation takes it by reference so a test or a
//! site-specific table can replace the instrument defaults.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;

use crate::deck::LabwareType;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog parse error: {0}")]
    Parse(String),

    #[error("Protocol {protocol} references unknown {kind}: {name}")]
    UnknownReference {
        protocol: String,
        kind: &'static str,
        name: String,
    },
}

/// Named set of liquid-handling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferProtocol {
    pub name: String,
    pub liquid_class: String,
    pub tip_type: String,
    pub aspiration_speed: f64,
    pub dispense_speed: f64,
    pub air_gap: f64,
    pub touch_off: bool,
    pub mix_cycles: u32,
    pub mix_volume: f64,
    pub blow_out: bool,
    pub retract_distance: f64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    liquid_classes: BTreeSet<String>,
    /// Tip type -> capacity in µL
    tips: BTreeMap<String, f64>,
    /// Labware -> working volume per well/tube in µL (absent = unbounded)
    #[serde(default)]
    labware: HashMap<LabwareType, f64>,
    #[serde(default)]
    protocols: BTreeMap<String, TransferProtocol>,
}

impl Catalog {
    /// Instrument default catalog
    pub fn standard() -> Self {
        let liquid_classes = [
            "Water",
            "DMSO",
            "Ethanol",
            "Standard",
            "HighViscosity",
            "LowVolume",
            "CellCulture",
            "Protein",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        let tips = [
            ("Standard_10uL", 10.0),
            ("Standard_50uL", 50.0),
            ("Standard_200uL", 200.0),
            ("Standard_1000uL", 1000.0),
            ("Filtered_200uL", 200.0),
            ("Filtered_1000uL", 1000.0),
            ("LowRetention_200uL", 200.0),
        ]
        .into_iter()
        .map(|(name, cap)| (name.to_string(), cap))
        .collect();

        let labware = HashMap::from([
            (LabwareType::Microplate96, 360.0),
            (LabwareType::Microplate384, 110.0),
            (LabwareType::TubeRack24, 2000.0),
            (LabwareType::TubeRack48, 1500.0),
            (LabwareType::TubeRack96, 1000.0),
            (LabwareType::Reservoir, 300_000.0),
        ]);

        let protocols = [
            protocol(
                "standard_water",
                "Standard Water Transfer",
                "Water",
                "Standard_200uL",
                [100.0, 100.0, 5.0, 25.0, 2.0],
                3,
                (true, true),
                "Standard protocol for aqueous solutions",
            ),
            protocol(
                "dmso_transfer",
                "DMSO Transfer",
                "DMSO",
                "LowRetention_200uL",
                [50.0, 50.0, 10.0, 30.0, 3.0],
                5,
                (true, true),
                "Protocol optimized for DMSO and organic solvents",
            ),
            protocol(
                "cell_culture",
                "Cell Culture Transfer",
                "CellCulture",
                "Filtered_200uL",
                [30.0, 30.0, 3.0, 20.0, 1.0],
                2,
                (false, false),
                "Gentle protocol for cell culture media",
            ),
            protocol(
                "protein_transfer",
                "Protein Transfer",
                "Protein",
                "LowRetention_200uL",
                [40.0, 40.0, 5.0, 25.0, 2.0],
                4,
                (true, true),
                "Protocol for protein solutions and biological samples",
            ),
        ]
        .into_iter()
        .collect();

        Self {
            liquid_classes,
            tips,
            labware,
            protocols,
        }
    }

    /// Load a catalog from YAML and check protocol references
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CatalogError> {
        let catalog: Catalog =
            serde_yaml::from_str(yaml).map_err(|e| CatalogError::Parse(e.to_string()))?;
        catalog.check_references()?;
        Ok(catalog)
    }

    pub fn from_file(path: &str) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    fn check_references(&self) -> Result<(), CatalogError> {
        for (key, p) in &self.protocols {
            if !self.has_liquid_class(&p.liquid_class) {
                return Err(CatalogError::UnknownReference {
                    protocol: key.clone(),
                    kind: "liquid class",
                    name: p.liquid_class.clone(),
                });
            }
            if self.tip_capacity_ul(&p.tip_type).is_none() {
                return Err(CatalogError::UnknownReference {
                    protocol: key.clone(),
                    kind: "tip type",
                    name: p.tip_type.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn has_liquid_class(&self, name: &str) -> bool {
        self.liquid_classes.contains(name)
    }

    pub fn tip_capacity_ul(&self, tip_type: &str) -> Option<f64> {
        self.tips.get(tip_type).copied()
    }

    pub fn working_volume_ul(&self, labware: LabwareType) -> Option<f64> {
        self.labware.get(&labware).copied()
    }

    /// Largest volume a single transfer may move with this tip into this labware
    ///
    /// `None` when the tip type is unknown.
    pub fn max_volume_ul(&self, tip_type: &str, destination: LabwareType) -> Option<f64> {
        let tip = self.tip_capacity_ul(tip_type)?;
        Some(match self.working_volume_ul(destination) {
            Some(well) => tip.min(well),
            None => tip,
        })
    }

    pub fn protocol(&self, name: &str) -> Option<&TransferProtocol> {
        self.protocols.get(name)
    }

    pub fn protocol_names(&self) -> Vec<&str> {
        self.protocols.keys().map(String::as_str).collect()
    }
}

#[allow(clippy::too_many_arguments)]
fn protocol(
    key: &str,
    name: &str,
    liquid_class: &str,
    tip_type: &str,
    // aspiration, dispense, air gap, mix volume, retract
    [aspiration_speed, dispense_speed, air_gap, mix_volume, retract_distance]: [f64; 5],
    mix_cycles: u32,
    (touch_off, blow_out): (bool, bool),
    description: &str,
) -> (String, TransferProtocol) {
    (
        key.to_string(),
        TransferProtocol {
            name: name.to_string(),
            liquid_class: liquid_class.to_string(),
            tip_type: tip_type.to_string(),
            aspiration_speed,
            dispense_speed,
            air_gap,
            touch_off,
            mix_cycles,
            mix_volume,
            blow_out,
            retract_distance,
            description: description.to_string(),
        },
    )
}
