//! Planning checks through the public API only: presets, catalog, validation
//! and config files. Nothing here talks to an instrument.

use fluent_control::config::AppConfig;
use fluent_control::presets::{
    deck_preset, list_deck_presets, list_transfer_patterns, standard_deck, standard_transfer,
    transfer_pattern,
};
use fluent_control::validation::{validate, validate_layout, validate_plan};
use fluent_control::{
    Catalog, LabwareType, Layout, LayoutError, PlanError, Position, TransferPlan, TransferSpec,
    ValidationError,
};
use std::time::Duration;

const SITE_CATALOG: &str = r#"
liquid_classes: [Water, Serum]
tips:
  Standard_50uL: 50.0
  Wide_1000uL: 1000.0
labware:
  96-well microplate: 300.0
  reservoir: 200000.0
protocols:
  serum_transfer:
    name: Serum Transfer
    liquid_class: Serum
    tip_type: Wide_1000uL
    aspiration_speed: 20.0
    dispense_speed: 20.0
    air_gap: 10.0
    touch_off: false
    mix_cycles: 0
    mix_volume: 0.0
    blow_out: true
    retract_distance: 1.5
"#;

#[test]
fn qa_demo_session_plan_is_valid() {
    let plan = TransferPlan::new(vec![
        standard_transfer("A1", "A2", 50.0),
        standard_transfer("A1", "A2", 25.0),
        standard_transfer("B1", "A2", 100.0),
    ]);
    assert_eq!(plan.total_volume_ul(), 175.0);
    assert_eq!(validate(&plan, &standard_deck(), &Catalog::standard()), Ok(()));
}

#[test]
fn qa_every_protocol_works_with_multi_source_pattern() {
    let catalog = Catalog::standard();
    let layout = deck_preset("96_well_standard").unwrap();

    for name in catalog.protocol_names() {
        let protocol = catalog.protocol(name).unwrap();
        let plan = transfer_pattern("multi_source_transfer", protocol).unwrap();
        assert_eq!(validate_plan(&plan, &layout, &catalog), Ok(()), "{name}");
    }
}

#[test]
fn qa_presets_are_listed_and_resolvable() {
    let catalog = Catalog::standard();
    let protocol = catalog.protocol("standard_water").unwrap();

    for name in list_deck_presets() {
        assert!(validate_layout(&deck_preset(name).unwrap()).is_ok());
    }
    for name in list_transfer_patterns() {
        assert_eq!(transfer_pattern(name, protocol).unwrap().len(), 4);
    }
}

#[test]
fn qa_volume_limit_follows_destination_labware() {
    let catalog = Catalog::standard();
    let layout = deck_preset("384_well_standard").unwrap();

    // 200 uL tip, 384-well destination caps at the well volume
    let plan = TransferPlan::new(vec![standard_transfer("B1", "A2", 150.0)]);
    assert!(matches!(
        validate_plan(&plan, &layout, &catalog),
        Err(PlanError::VolumeExceedsMaximum { index: 0, max_ul, .. }) if max_ul == 110.0
    ));

    // The reservoir is bounded only by the tip
    let plan = TransferPlan::new(vec![standard_transfer("A1", "B2", 150.0)]);
    assert_eq!(validate_plan(&plan, &layout, &catalog), Ok(()));
}

#[test]
fn qa_first_violation_wins() {
    let plan = TransferPlan::new(vec![
        standard_transfer("A1", "A2", 50.0),
        standard_transfer("A1", "A2", -1.0),
        standard_transfer("A1", "A1", 10.0),
    ]);
    assert_eq!(
        validate_plan(&plan, &standard_deck(), &Catalog::standard()),
        Err(PlanError::NonPositiveVolume {
            index: 1,
            volume_ul: -1.0
        })
    );
}

#[test]
fn qa_layout_errors_take_precedence() {
    let layout = Layout::new(vec![
        Position::new("A1", LabwareType::Microplate96).occupied(),
        Position::new("A1", LabwareType::Microplate96).occupied(),
    ]);
    let plan = TransferPlan::new(vec![standard_transfer("A1", "C1", 50.0)]);
    assert_eq!(
        validate(&plan, &layout, &Catalog::standard()),
        Err(ValidationError::Layout(LayoutError::DuplicatePosition(
            "A1".into()
        )))
    );
}

#[test]
fn qa_site_catalog_replaces_defaults() {
    let catalog = Catalog::from_yaml_str(SITE_CATALOG).unwrap();
    let protocol = catalog.protocol("serum_transfer").unwrap();
    let layout = standard_deck();

    let plan = TransferPlan::new(vec![TransferSpec::from_protocol("B1", "A2", 250.0, protocol)]);
    assert_eq!(validate_plan(&plan, &layout, &catalog), Ok(()));

    let plan = TransferPlan::new(vec![TransferSpec::from_protocol("B1", "A2", 301.0, protocol)]);
    assert!(matches!(
        validate_plan(&plan, &layout, &catalog),
        Err(PlanError::VolumeExceedsMaximum { .. })
    ));

    // The instrument default liquid classes are gone
    let plan = TransferPlan::new(vec![standard_transfer("A1", "A2", 10.0)]);
    assert!(matches!(
        validate_plan(&plan, &layout, &catalog),
        Err(PlanError::UnknownLiquidClass { .. })
    ));
}

#[test]
fn qa_site_catalog_with_dangling_reference_is_rejected() {
    let yaml = SITE_CATALOG.replace("tip_type: Wide_1000uL", "tip_type: Missing_10uL");
    assert!(Catalog::from_yaml_str(&yaml).is_err());
}

#[test]
fn qa_shipped_config_files_parse() {
    for env in ["dev", "prod"] {
        let path = format!("{}/config/{}.yaml", env!("CARGO_MANIFEST_DIR"), env);
        let config = AppConfig::from_file(&path).unwrap();
        assert!(config.instrument.base_url.starts_with("http"));
        assert_eq!(config.monitor_config().poll_interval, Duration::from_secs(5));
    }
}
