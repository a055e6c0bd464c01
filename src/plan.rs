//! Transfer Plan Model
//!
//! A `TransferSpec` is one source -> destination liquid move; a `TransferPlan`
//! is the ordered list submitted atomically as one session.

use serde::{Deserialize, Serialize};

use crate::catalog::TransferProtocol;

/// One liquid transfer
///
/// Optional parameters are omitted from the request body and left to the
/// instrument's liquid-class defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferSpec {
    pub source_position: String,
    pub destination_position: String,
    pub volume_ul: f64,
    pub liquid_class: String,
    pub tip_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspiration_speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispense_speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub air_gap: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retract_distance: Option<f64>,
    #[serde(default)]
    pub touch_off: bool,
    #[serde(default)]
    pub blow_out: bool,
    #[serde(default)]
    pub mix_cycles: u32,
    /// Ignored when `mix_cycles == 0`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mix_volume: Option<f64>,
}

impl TransferSpec {
    pub fn new(
        source_position: impl Into<String>,
        destination_position: impl Into<String>,
        volume_ul: f64,
        liquid_class: impl Into<String>,
        tip_type: impl Into<String>,
    ) -> Self {
        Self {
            source_position: source_position.into(),
            destination_position: destination_position.into(),
            volume_ul,
            liquid_class: liquid_class.into(),
            tip_type: tip_type.into(),
            aspiration_speed: None,
            dispense_speed: None,
            air_gap: None,
            retract_distance: None,
            touch_off: false,
            blow_out: false,
            mix_cycles: 0,
            mix_volume: None,
        }
    }

    /// Transfer carrying every parameter of a named protocol
    pub fn from_protocol(
        source_position: impl Into<String>,
        destination_position: impl Into<String>,
        volume_ul: f64,
        protocol: &TransferProtocol,
    ) -> Self {
        Self {
            aspiration_speed: Some(protocol.aspiration_speed),
            dispense_speed: Some(protocol.dispense_speed),
            air_gap: Some(protocol.air_gap),
            retract_distance: Some(protocol.retract_distance),
            touch_off: protocol.touch_off,
            blow_out: protocol.blow_out,
            mix_cycles: protocol.mix_cycles,
            mix_volume: Some(protocol.mix_volume),
            ..Self::new(
                source_position,
                destination_position,
                volume_ul,
                protocol.liquid_class.clone(),
                protocol.tip_type.clone(),
            )
        }
    }

    pub fn with_speeds(mut self, aspiration: f64, dispense: f64) -> Self {
        self.aspiration_speed = Some(aspiration);
        self.dispense_speed = Some(dispense);
        self
    }

    pub fn with_air_gap(mut self, air_gap: f64) -> Self {
        self.air_gap = Some(air_gap);
        self
    }

    pub fn with_retract_distance(mut self, distance: f64) -> Self {
        self.retract_distance = Some(distance);
        self
    }

    pub fn with_mix(mut self, cycles: u32, volume_ul: f64) -> Self {
        self.mix_cycles = cycles;
        self.mix_volume = Some(volume_ul);
        self
    }

    pub fn with_touch_off(mut self, touch_off: bool) -> Self {
        self.touch_off = touch_off;
        self
    }

    pub fn with_blow_out(mut self, blow_out: bool) -> Self {
        self.blow_out = blow_out;
        self
    }
}

/// Ordered transfers submitted as one session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferPlan {
    transfers: Vec<TransferSpec>,
}

impl TransferPlan {
    pub fn new(transfers: Vec<TransferSpec>) -> Self {
        Self { transfers }
    }

    pub fn transfers(&self) -> &[TransferSpec] {
        &self.transfers
    }

    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    pub fn push(&mut self, transfer: TransferSpec) {
        self.transfers.push(transfer);
    }

    /// Total volume moved by the plan
    pub fn total_volume_ul(&self) -> f64 {
        self.transfers.iter().map(|t| t.volume_ul).sum()
    }
}

impl FromIterator<TransferSpec> for TransferPlan {
    fn from_iter<I: IntoIterator<Item = TransferSpec>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
