use esh_core::HarmonyConfig;
use esh_model::{
    Bounds, Component, ConnectorParams, Directional, EdgeLabel, EnergySystem, FlowSpec, Profile,
    SystemBuilder, fixtures,
};
use esh_transform::*;

fn options(connector_policy: ConnectorPolicy, prune: PrunePolicy) -> AdapterOptions {
    AdapterOptions {
        connector_policy,
        prune,
    }
}

#[test]
fn minimal_example_is_exact_in_every_target() {
    let system = fixtures::minimal_example().unwrap();
    let config = HarmonyConfig::default();
    let opts = AdapterOptions::default();

    // adapters only borrow the model, so they can run side by side
    std::thread::scope(|s| {
        let oemof = s.spawn(|| OemofAdapter.transform(&system, &opts, &config).map(|t| t.deviations));
        let pypsa = s.spawn(|| PypsaAdapter.transform(&system, &opts, &config).map(|t| t.deviations));
        let fine = s.spawn(|| FineAdapter.transform(&system, &opts, &config).map(|t| t.deviations));
        let calliope =
            s.spawn(|| CalliopeAdapter.transform(&system, &opts, &config).map(|t| t.deviations));
        for handle in [oemof, pypsa, fine, calliope] {
            let deviations = handle.join().unwrap().unwrap();
            assert!(deviations.is_empty(), "{deviations:?}");
        }
    });
}

#[test]
fn connectors_are_never_dropped() {
    let system = fixtures::connector_example().unwrap();
    let config = HarmonyConfig::default();
    let reject = options(ConnectorPolicy::Reject, PrunePolicy::Auto);

    // native links are unaffected by the policy
    let oemof = OemofAdapter.transform(&system, &reject, &config).unwrap();
    assert_eq!(oemof.native.links.len(), 1);
    let pypsa = PypsaAdapter.transform(&system, &reject, &config).unwrap();
    assert_eq!(pypsa.native.links.len(), 2);

    for err in [
        FineAdapter.transform(&system, &reject, &config).unwrap_err(),
        CalliopeAdapter.transform(&system, &reject, &config).unwrap_err(),
    ] {
        match err {
            TransformError::UnsupportedComponent { uid, component, .. } => {
                assert_eq!(uid, "Tie");
                assert_eq!(component, "connector");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

#[test]
fn synthesized_connector_equals_explicit_conversions_in_fine() {
    let config = HarmonyConfig::default();
    let opts = AdapterOptions::default();
    let synthesized = FineAdapter
        .transform(&fixtures::connector_example().unwrap(), &opts, &config)
        .unwrap();
    let explicit = FineAdapter
        .transform(&fixtures::connector_explicit_example().unwrap(), &opts, &config)
        .unwrap();

    assert_eq!(synthesized.deviations.len(), 1);
    assert!(explicit.is_exact());
    for name in ["Tie (North to South)", "Tie (South to North)"] {
        let a = synthesized.native.conversion(name).unwrap();
        let b = explicit.native.conversion(name).unwrap();
        assert_eq!(a, b, "conversion '{name}' differs");
    }
}

#[test]
fn synthesized_connector_equals_explicit_conversions_in_calliope() {
    let config = HarmonyConfig::default();
    let opts = AdapterOptions::default();
    let synthesized = CalliopeAdapter
        .transform(&fixtures::connector_example().unwrap(), &opts, &config)
        .unwrap();
    let explicit = CalliopeAdapter
        .transform(&fixtures::connector_explicit_example().unwrap(), &opts, &config)
        .unwrap();
    assert_eq!(synthesized.native.techs, explicit.native.techs);
}

/// Two regions whose tie line can only carry power from South to North.
fn one_way_tie() -> EnergySystem {
    let timeframe = fixtures::connector_example().unwrap().timeframe().clone();
    let n = timeframe.len();
    let mut b = SystemBuilder::new("one_way_tie", timeframe);
    for bus in ["North", "South"] {
        b.add_node(Component::bus(bus)).unwrap();
    }
    b.add_node(Component::source("North Plant")).unwrap();
    b.add_node(Component::source("South Plant")).unwrap();
    b.add_node(Component::sink("North Demand").with_profile(Profile::fixed(vec![5.0; n]).unwrap()))
        .unwrap();
    let tie = ConnectorParams::new("North", "South", Directional::symmetric(0.9));
    b.add_node(Component::connector("Tie", tie)).unwrap();

    let cap = Bounds::up_to(20.0).unwrap();
    b.connect(FlowSpec::new("North Plant", "North").bounds(cap).costs(4.0)).unwrap();
    b.connect(FlowSpec::new("South Plant", "South").bounds(cap).costs(1.0)).unwrap();
    b.connect(FlowSpec::new("North", "North Demand")).unwrap();
    b.connect(FlowSpec::new("North", "Tie").bounds(Bounds::up_to(0.0).unwrap())).unwrap();
    b.connect(FlowSpec::new("Tie", "South").bounds(cap)).unwrap();
    b.connect(FlowSpec::new("South", "Tie").bounds(cap)).unwrap();
    b.connect(FlowSpec::new("Tie", "North").bounds(cap)).unwrap();
    b.build().unwrap()
}

#[test]
fn pruned_connector_directions_leave_the_native_model() {
    let system = one_way_tie();
    let config = HarmonyConfig::default();
    let opts = AdapterOptions::default();
    let dead = ["North->Tie", "Tie->South"].map(|l| l.parse::<EdgeLabel>().unwrap());

    let fine = FineAdapter.transform(&system, &opts, &config).unwrap();
    assert!(dead.iter().all(|l| fine.pruned.contains_edge(l)), "{:?}", fine.pruned);
    assert!(fine.native.conversion("Tie (North to South)").is_none());
    assert!(fine.native.conversion("Tie (South to North)").is_some());
    let synthesized: Vec<_> = fine.deviations_at("Tie").collect();
    assert_eq!(
        synthesized[0].cause,
        DeviationCause::ConnectorSynthesized {
            conversions: vec!["Tie (South to North)".to_string()],
        }
    );

    let calliope = CalliopeAdapter.transform(&system, &opts, &config).unwrap();
    assert!(dead.iter().all(|l| calliope.pruned.contains_edge(l)));
    assert!(calliope.native.tech("Tie (North to South)").is_none());
    assert!(calliope.native.tech("Tie (South to North)").is_some());

    let always = options(ConnectorPolicy::Synthesize, PrunePolicy::Always);
    let pypsa = PypsaAdapter.transform(&system, &always, &config).unwrap();
    assert!(pypsa.native.link("Tie (North to South)").is_none());
    assert!(pypsa.native.link("Tie (South to North)").is_some());

    let oemof = OemofAdapter.transform(&system, &always, &config).unwrap();
    let link = &oemof.native.links[0];
    assert_eq!(link.inputs.keys().collect::<Vec<_>>(), ["South"]);
    assert_eq!(link.conversion_factors.len(), 1);
    assert_eq!(link.conversion_factors[0].from, "South");
}

#[test]
fn prune_policy_overrides_framework_default() {
    let system = fixtures::redundant_chain_example().unwrap();
    let config = HarmonyConfig::default();

    let kept = FineAdapter
        .transform(&system, &options(ConnectorPolicy::Synthesize, PrunePolicy::Never), &config)
        .unwrap();
    assert!(kept.pruned.is_empty());
    assert!(kept.native.conversion("Coal Plant").is_some());

    let pruned = OemofAdapter
        .transform(&system, &options(ConnectorPolicy::Synthesize, PrunePolicy::Always), &config)
        .unwrap();
    assert!(pruned.native.converter("Coal Plant").is_none());
    assert_eq!(pruned.pruned, prune_redundant_chains(&system));
}

#[test]
fn chp_ratio_survives_every_target() {
    let system = fixtures::chp_example().unwrap();
    let config = HarmonyConfig::default();
    let opts = AdapterOptions::default();

    let oemof = OemofAdapter.transform(&system, &opts, &config).unwrap();
    let factors = &oemof.native.converter("CHP").unwrap().conversion_factors;
    assert_eq!(factors["Powerline"][0] / factors["Heatline"][0], 0.8 / 0.6);

    let pypsa = PypsaAdapter.transform(&system, &opts, &config).unwrap();
    assert!((pypsa.native.link_couplings[0].ratio - 0.8 / 0.6).abs() < 1e-12);

    let fine = FineAdapter.transform(&system, &opts, &config).unwrap();
    let factors = &fine.native.conversion("CHP").unwrap().commodity_conversion_factors;
    assert!((factors["Powerline"] / factors["Heatline"] - 0.8 / 0.6).abs() < 1e-12);

    let calliope = CalliopeAdapter.transform(&system, &opts, &config).unwrap();
    let ratio = calliope.native.tech("CHP").unwrap().constraints.carrier_ratio_out_2.unwrap();
    assert!((1.0 / ratio - 0.8 / 0.6).abs() < 1e-12);

    // the heat-side emissions need relocating everywhere but in oemof
    assert!(oemof.is_exact());
    for deviations in [&pypsa.deviations, &fine.deviations, &calliope.deviations] {
        assert!(deviations.iter().any(|d| d.uid == "CHP->Heatline"));
        assert!(deviations.iter().all(|d| d.cause.is_lossless()));
    }
}

#[test]
fn native_models_serialize_for_the_solver() {
    let system = fixtures::minimal_example().unwrap();
    let config = HarmonyConfig::default();
    let opts = AdapterOptions::default();
    let fine = FineAdapter.transform(&system, &opts, &config).unwrap();
    let json = serde_json::to_value(&fine).unwrap();
    assert_eq!(json["framework"], "fine");
    assert_eq!(json["native"]["cost_unit"], "1e6 EUR");

    let back: Transformation<FineModel> = serde_json::from_value(json).unwrap();
    assert_eq!(back, fine);
}
