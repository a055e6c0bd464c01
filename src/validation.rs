//! Layout and plan validation
//!
//! Pure, synchronous checks run before anything is sent to the instrument.
//! A `Session` can only be drafted from a plan that passed both.

use std::collections::HashSet;

use crate::catalog::Catalog;
use crate::deck::{Layout, PositionStatus};
use crate::plan::{TransferPlan, TransferSpec};

// ============================================================================
// Validation Errors
// ============================================================================

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum LayoutError {
    #[error("Layout has no positions")]
    EmptyLayout,

    #[error("Duplicate position id: {0}")]
    DuplicatePosition(String),

    #[error("Invalid position id '{0}' (must be non-empty, without whitespace)")]
    InvalidPositionId(String),
}

impl LayoutError {
    pub fn code(&self) -> &'static str {
        match self {
            LayoutError::EmptyLayout => "EMPTY_LAYOUT",
            LayoutError::DuplicatePosition(_) => "DUPLICATE_POSITION",
            LayoutError::InvalidPositionId(_) => "INVALID_POSITION_ID",
        }
    }
}

/// Plan errors carry the zero-based index of the offending transfer
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum PlanError {
    #[error("Transfer plan has no transfers")]
    EmptyPlan,

    #[error("Transfer #{index}: unknown position {position}")]
    UnknownPosition { index: usize, position: String },

    #[error("Transfer #{index}: source and destination are both {position}")]
    SameSourceDestination { index: usize, position: String },

    #[error("Transfer #{index}: position {position} is empty")]
    EmptyPosition { index: usize, position: String },

    #[error("Transfer #{index}: volume must be greater than zero (got {volume_ul})")]
    NonPositiveVolume { index: usize, volume_ul: f64 },

    #[error("Transfer #{index}: volume {volume_ul} uL exceeds maximum {max_ul} uL")]
    VolumeExceedsMaximum {
        index: usize,
        volume_ul: f64,
        max_ul: f64,
    },

    #[error("Transfer #{index}: mix volume must be greater than zero when mix_cycles > 0")]
    InvalidMixSpec { index: usize },

    #[error("Transfer #{index}: {field} must be greater than zero (got {value})")]
    NonPositiveSpeed {
        index: usize,
        field: &'static str,
        value: f64,
    },

    #[error("Transfer #{index}: {field} must not be negative (got {value})")]
    NegativeParameter {
        index: usize,
        field: &'static str,
        value: f64,
    },

    #[error("Transfer #{index}: unknown liquid class {name}")]
    UnknownLiquidClass { index: usize, name: String },

    #[error("Transfer #{index}: unknown tip type {name}")]
    UnknownTipType { index: usize, name: String },
}

impl PlanError {
    pub fn code(&self) -> &'static str {
        match self {
            PlanError::EmptyPlan => "EMPTY_PLAN",
            PlanError::UnknownPosition { .. } => "UNKNOWN_POSITION",
            PlanError::SameSourceDestination { .. } => "SAME_SOURCE_DESTINATION",
            PlanError::EmptyPosition { .. } => "EMPTY_POSITION",
            PlanError::NonPositiveVolume { .. } => "NON_POSITIVE_VOLUME",
            PlanError::VolumeExceedsMaximum { .. } => "VOLUME_EXCEEDS_MAXIMUM",
            PlanError::InvalidMixSpec { .. } => "INVALID_MIX_SPEC",
            PlanError::NonPositiveSpeed { .. } => "NON_POSITIVE_SPEED",
            PlanError::NegativeParameter { .. } => "NEGATIVE_PARAMETER",
            PlanError::UnknownLiquidClass { .. } => "UNKNOWN_LIQUID_CLASS",
            PlanError::UnknownTipType { .. } => "UNKNOWN_TIP_TYPE",
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid layout: {0}")]
    Layout(#[from] LayoutError),

    #[error("Invalid plan: {0}")]
    Plan(#[from] PlanError),
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::Layout(e) => e.code(),
            ValidationError::Plan(e) => e.code(),
        }
    }
}

// ============================================================================
// Layout
// ============================================================================

pub fn validate_layout(layout: &Layout) -> Result<(), LayoutError> {
    if layout.is_empty() {
        return Err(LayoutError::EmptyLayout);
    }

    // Duplicates are reported before any malformed id
    let mut seen = HashSet::with_capacity(layout.len());
    for position in layout.positions() {
        if !seen.insert(position.position_id.as_str()) {
            return Err(LayoutError::DuplicatePosition(position.position_id.clone()));
        }
    }

    if let Some(bad) = layout
        .positions()
        .iter()
        .find(|p| !is_valid_position_id(&p.position_id))
    {
        return Err(LayoutError::InvalidPositionId(bad.position_id.clone()));
    }

    Ok(())
}

fn is_valid_position_id(id: &str) -> bool {
    !id.is_empty() && !id.chars().any(|c| c.is_whitespace() || c.is_control())
}

// ============================================================================
// Plan
// ============================================================================

/// Check every transfer against the layout and catalog, failing on the first
/// violation in plan order.
pub fn validate_plan(
    plan: &TransferPlan,
    layout: &Layout,
    catalog: &Catalog,
) -> Result<(), PlanError> {
    if plan.is_empty() {
        return Err(PlanError::EmptyPlan);
    }

    for (index, transfer) in plan.transfers().iter().enumerate() {
        validate_transfer(index, transfer, layout, catalog)?;
    }

    Ok(())
}

fn validate_transfer(
    index: usize,
    t: &TransferSpec,
    layout: &Layout,
    catalog: &Catalog,
) -> Result<(), PlanError> {
    let lookup = |id: &String| {
        layout.get(id).ok_or_else(|| PlanError::UnknownPosition {
            index,
            position: id.clone(),
        })
    };
    let source = lookup(&t.source_position)?;
    let destination = lookup(&t.destination_position)?;

    if t.source_position == t.destination_position {
        return Err(PlanError::SameSourceDestination {
            index,
            position: t.source_position.clone(),
        });
    }

    for position in [source, destination] {
        if position.status == PositionStatus::Empty {
            return Err(PlanError::EmptyPosition {
                index,
                position: position.position_id.clone(),
            });
        }
    }

    // NaN is rejected wherever a bound applies
    if t.volume_ul.is_nan() || t.volume_ul <= 0.0 {
        return Err(PlanError::NonPositiveVolume {
            index,
            volume_ul: t.volume_ul,
        });
    }

    if t.mix_cycles > 0 && !t.mix_volume.is_some_and(|v| v > 0.0) {
        return Err(PlanError::InvalidMixSpec { index });
    }

    for (field, value) in [
        ("aspiration_speed", t.aspiration_speed),
        ("dispense_speed", t.dispense_speed),
    ] {
        if let Some(value) = value {
            if value < 0.0 || value.is_nan() {
                return Err(PlanError::NegativeParameter { index, field, value });
            }
            if value == 0.0 {
                return Err(PlanError::NonPositiveSpeed { index, field, value });
            }
        }
    }

    for (field, value) in [
        ("air_gap", t.air_gap),
        ("retract_distance", t.retract_distance),
    ] {
        if let Some(value) = value
            && (value.is_nan() || value < 0.0)
        {
            return Err(PlanError::NegativeParameter { index, field, value });
        }
    }

    if !catalog.has_liquid_class(&t.liquid_class) {
        return Err(PlanError::UnknownLiquidClass {
            index,
            name: t.liquid_class.clone(),
        });
    }

    let max_ul = catalog
        .max_volume_ul(&t.tip_type, destination.labware_type)
        .ok_or_else(|| PlanError::UnknownTipType {
            index,
            name: t.tip_type.clone(),
        })?;
    if t.volume_ul > max_ul {
        return Err(PlanError::VolumeExceedsMaximum {
            index,
            volume_ul: t.volume_ul,
            max_ul,
        });
    }

    Ok(())
}

/// Validate both, layout first
pub fn validate(
    plan: &TransferPlan,
    layout: &Layout,
    catalog: &Catalog,
) -> Result<(), ValidationError> {
    validate_layout(layout)?;
    validate_plan(plan, layout, catalog)?;
    Ok(())
}
