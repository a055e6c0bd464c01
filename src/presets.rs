//! Deck and Transfer Presets
//!
//! Named deck layouts and transfer patterns shipped with the instrument
//! scripts, plus the standard single-transfer helper.

use crate::catalog::TransferProtocol;
use crate::deck::{LabwareType, Layout, Position};
use crate::plan::{TransferPlan, TransferSpec};

struct DeckPreset {
    name: &'static str,
    description: &'static str,
    positions: [(&'static str, LabwareType, &'static str); 8],
}

struct TransferPattern {
    name: &'static str,
    description: &'static str,
    transfers: &'static [(&'static str, &'static str, f64)],
}

const DECK_PRESETS: &[DeckPreset] = &[
    DeckPreset {
        name: "96_well_standard",
        description: "Standard 96-well microplate layout",
        positions: [
            ("A1", LabwareType::Microplate96, "Source Plate"),
            ("A2", LabwareType::Microplate96, "Destination Plate"),
            ("A3", LabwareType::TipRack96, "Tips 1"),
            ("A4", LabwareType::TipRack96, "Tips 2"),
            ("B1", LabwareType::Reservoir, "Wash Buffer"),
            ("B2", LabwareType::Reservoir, "Reagent 1"),
            ("B3", LabwareType::TipRack96, "Tips 3"),
            ("B4", LabwareType::TipRack96, "Tips 4"),
        ],
    },
    DeckPreset {
        name: "384_well_standard",
        description: "Standard 384-well microplate layout",
        positions: [
            ("A1", LabwareType::Microplate384, "Source Plate"),
            ("A2", LabwareType::Microplate384, "Destination Plate"),
            ("A3", LabwareType::TipRack384, "Tips 1"),
            ("A4", LabwareType::TipRack384, "Tips 2"),
            ("B1", LabwareType::Reservoir, "Wash Buffer"),
            ("B2", LabwareType::Reservoir, "Reagent 1"),
            ("B3", LabwareType::TipRack384, "Tips 3"),
            ("B4", LabwareType::TipRack384, "Tips 4"),
        ],
    },
    DeckPreset {
        name: "tube_rack_layout",
        description: "Tube rack layout for sample processing",
        positions: [
            ("A1", LabwareType::TubeRack24, "Sample Tubes"),
            ("A2", LabwareType::Microplate96, "Destination Plate"),
            ("A3", LabwareType::TipRack96, "Tips 1"),
            ("A4", LabwareType::TipRack96, "Tips 2"),
            ("B1", LabwareType::Reservoir, "Lysis Buffer"),
            ("B2", LabwareType::Reservoir, "Wash Buffer"),
            ("B3", LabwareType::TipRack96, "Tips 3"),
            ("B4", LabwareType::TipRack96, "Tips 4"),
        ],
    },
];

const TRANSFER_PATTERNS: &[TransferPattern] = &[
    TransferPattern {
        name: "serial_dilution",
        description: "Serial dilution pattern",
        transfers: &[
            ("A1", "A2", 100.0),
            ("A2", "A3", 50.0),
            ("A3", "A4", 50.0),
            ("A4", "A5", 50.0),
        ],
    },
    TransferPattern {
        name: "replicate_transfer",
        description: "Replicate transfer pattern",
        transfers: &[
            ("A1", "A2", 50.0),
            ("A1", "A3", 50.0),
            ("A1", "A4", 50.0),
            ("A1", "A5", 50.0),
        ],
    },
    TransferPattern {
        name: "multi_source_transfer",
        description: "Multiple source to single destination",
        transfers: &[
            ("A1", "B1", 25.0),
            ("A2", "B1", 25.0),
            ("A3", "B1", 25.0),
            ("A4", "B1", 25.0),
        ],
    },
];

/// Named deck layout with every position occupied
pub fn deck_preset(name: &str) -> Option<Layout> {
    let preset = DECK_PRESETS.iter().find(|p| p.name == name)?;
    Some(
        preset
            .positions
            .iter()
            .map(|&(id, labware, description)| {
                Position::new(id, labware)
                    .occupied()
                    .with_description(description)
            })
            .collect(),
    )
}

pub fn deck_preset_description(name: &str) -> Option<&'static str> {
    DECK_PRESETS
        .iter()
        .find(|p| p.name == name)
        .map(|p| p.description)
}

/// Deck used by the instrument's demo workflow
///
/// Unlike `96_well_standard` the positions carry the labware names the demo
/// run expects (`Source_Plate_01`, `Tips_01`, ...).
pub fn standard_deck() -> Layout {
    [
        ("A1", LabwareType::Microplate96, "Source_Plate_01"),
        ("A2", LabwareType::Microplate96, "Destination_Plate_01"),
        ("A3", LabwareType::TipRack96, "Tips_01"),
        ("A4", LabwareType::TipRack96, "Tips_02"),
        ("B1", LabwareType::Reservoir, "Wash_Buffer"),
        ("B2", LabwareType::Reservoir, "Reagent_01"),
        ("B3", LabwareType::TipRack96, "Tips_03"),
        ("B4", LabwareType::TipRack96, "Tips_04"),
    ]
    .into_iter()
    .map(|(id, labware, description)| {
        Position::new(id, labware)
            .occupied()
            .with_description(description)
    })
    .collect()
}

/// Expand a named pattern, applying `protocol` to every transfer
pub fn transfer_pattern(name: &str, protocol: &TransferProtocol) -> Option<TransferPlan> {
    let pattern = TRANSFER_PATTERNS.iter().find(|p| p.name == name)?;
    Some(
        pattern
            .transfers
            .iter()
            .map(|&(src, dst, volume)| TransferSpec::from_protocol(src, dst, volume, protocol))
            .collect(),
    )
}

pub fn transfer_pattern_description(name: &str) -> Option<&'static str> {
    TRANSFER_PATTERNS
        .iter()
        .find(|p| p.name == name)
        .map(|p| p.description)
}

/// Default single transfer: Standard liquid class, 200 µL tips, half-volume mix
pub fn standard_transfer(
    source_position: impl Into<String>,
    destination_position: impl Into<String>,
    volume_ul: f64,
) -> TransferSpec {
    TransferSpec::new(
        source_position,
        destination_position,
        volume_ul,
        "Standard",
        "Standard_200uL",
    )
    .with_speeds(100.0, 100.0)
    .with_air_gap(5.0)
    .with_touch_off(true)
    .with_mix(3, volume_ul * 0.5)
    .with_blow_out(true)
    .with_retract_distance(2.0)
}

pub fn list_deck_presets() -> Vec<&'static str> {
    DECK_PRESETS.iter().map(|p| p.name).collect()
}

pub fn list_transfer_patterns() -> Vec<&'static str> {
    TRANSFER_PATTERNS.iter().map(|p| p.name).collect()
}
