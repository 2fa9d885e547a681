//! End-to-end scenarios over the "slippery road" network: five binary
//! variables (winter, rain, sprinkler, `wet_grass`, `slippery_road`) exercised
//! through both bucket variable elimination and the junction tree, checking
//! that the two engines agree and that priors/posteriors match known
//! closed-form values.

use bayeswork::algorithms::{bucket, naive, Evidence, EvidenceValue, JunctionTree};
use bayeswork::core::{Network, Variable};
use bayeswork::EngineConfig;

fn binary(name: &str) -> Variable {
    Variable::new(name, vec!["t".to_string(), "f".to_string()])
}

fn slippery_road() -> Network {
    let mut net = Network::new();
    for name in ["winter", "rain", "sprinkler", "wet_grass", "slippery_road"] {
        net.add_discrete(binary(name)).unwrap();
    }
    net.add_edge("winter", "rain").unwrap();
    net.add_edge("winter", "sprinkler").unwrap();
    net.add_edge("rain", "slippery_road").unwrap();
    net.add_edge("rain", "wet_grass").unwrap();
    net.add_edge("sprinkler", "wet_grass").unwrap();

    net.set_cpt("winter", vec![0.6, 0.4]).unwrap();
    net.set_cpt("rain", vec![0.8, 0.1, 0.2, 0.9]).unwrap();
    net.set_cpt("sprinkler", vec![0.2, 0.75, 0.8, 0.25]).unwrap();
    net.set_cpt("slippery_road", vec![0.7, 0.0, 0.3, 1.0]).unwrap();
    // axes (wet_grass, rain, sprinkler)
    net.set_cpt("wet_grass", vec![0.95, 0.8, 0.1, 0.0, 0.05, 0.2, 0.9, 1.0])
        .unwrap();
    net
}

fn approx(got: Vec<f64>, expected: &[f64]) {
    assert_eq!(got.len(), expected.len());
    for (a, b) in got.iter().zip(expected.iter()) {
        assert!((a - b).abs() < 1e-6, "{got:?} vs {expected:?}");
    }
}

#[test]
fn priors_match_the_canonical_network() {
    let net = slippery_road();
    let config = EngineConfig::default();
    approx(
        naive(&net, &["winter".to_string()], None, &config).unwrap().get_potential(None).unwrap(),
        &[0.6, 0.4],
    );
    approx(
        naive(&net, &["sprinkler".to_string()], None, &config).unwrap().get_potential(None).unwrap(),
        &[0.42, 0.58],
    );
    approx(
        naive(&net, &["slippery_road".to_string()], None, &config).unwrap().get_potential(None).unwrap(),
        &[0.364, 0.636],
    );
}

#[test]
fn hard_evidence_on_two_parents_pins_wet_grass() {
    let net = slippery_road();
    let config = EngineConfig::default();
    let mut evidence = Evidence::default();
    evidence.insert("winter".to_string(), EvidenceValue::Hard("t".to_string()));
    evidence.insert("rain".to_string(), EvidenceValue::Hard("f".to_string()));
    let result = naive(&net, &["wet_grass".to_string()], Some(&evidence), &config).unwrap();
    approx(result.get_potential(None).unwrap(), &[0.02, 0.98]);
}

#[test]
fn evidence_on_a_child_updates_an_upstream_ancestor() {
    let net = slippery_road();
    let config = EngineConfig::default();
    let mut evidence = Evidence::default();
    evidence.insert("wet_grass".to_string(), EvidenceValue::Hard("f".to_string()));
    let result = naive(&net, &["rain".to_string()], Some(&evidence), &config).unwrap();
    approx(result.get_potential(None).unwrap(), &[0.158858, 0.841142]);
}

#[test]
fn bucket_and_junction_tree_agree_under_evidence() {
    let net = slippery_road();
    let config = EngineConfig::default();
    let mut evidence = Evidence::default();
    evidence.insert("winter".to_string(), EvidenceValue::Hard("t".to_string()));

    let bucket_result = bucket(&net, &["wet_grass".to_string()], Some(&evidence), None, &config).unwrap();
    approx(bucket_result.get_potential(None).unwrap(), &[0.668, 0.332]);

    let mut tree = JunctionTree::build(&net, config).unwrap();
    tree.set_evidence(&evidence, false).unwrap();
    let tree_result = tree.marginals(&["wet_grass".to_string()]).unwrap();
    approx(tree_result.get_potential(None).unwrap(), &[0.668, 0.332]);
}

#[test]
fn bucket_and_junction_tree_agree_with_no_evidence_for_every_variable() {
    let net = slippery_road();
    let config = EngineConfig::default();
    let mut tree = JunctionTree::build(&net, config.clone()).unwrap();
    tree.propagate().unwrap();
    for var in ["winter", "rain", "sprinkler", "wet_grass", "slippery_road"] {
        let via_tree = tree.marginals(&[var.to_string()]).unwrap();
        let via_bucket = bucket(&net, &[var.to_string()], None, None, &config).unwrap();
        approx(
            via_tree.get_potential(None).unwrap(),
            &via_bucket.get_potential(None).unwrap(),
        );
    }
}

#[test]
fn soft_posterior_evidence_on_a_three_valued_cloth_network() {
    // Grounded on the soft-evidence worked example: a three-valued "cloth"
    // variable feeding a binary "sold" variable, queried before and after an
    // all-things-considered soft-posterior observation on cloth.
    let mut net = Network::new();
    net.add_discrete(Variable::new(
        "cloth",
        vec!["green".to_string(), "blue".to_string(), "red".to_string()],
    ))
    .unwrap();
    net.add_discrete(Variable::new("sold", vec!["True".to_string(), "False".to_string()]))
        .unwrap();
    net.add_edge("cloth", "sold").unwrap();
    net.set_cpt("cloth", vec![0.3, 0.3, 0.4]).unwrap();
    net.set_cpt("sold", vec![0.4, 0.4, 0.8, 0.6, 0.6, 0.2]).unwrap();

    let config = EngineConfig::default();
    let mut tree = JunctionTree::build(&net, config).unwrap();
    tree.propagate().unwrap();
    approx(
        tree.marginals(&["sold".to_string()]).unwrap().get_potential(None).unwrap(),
        &[0.56, 0.44],
    );

    let mut evidence = Evidence::default();
    evidence.insert("cloth".to_string(), EvidenceValue::Soft(vec![0.7, 0.25, 0.05]));
    tree.set_evidence(&evidence, true).unwrap();
    approx(
        tree.marginals(&["sold".to_string()]).unwrap().get_potential(None).unwrap(),
        &[0.42, 0.58],
    );
    approx(
        tree.marginals(&["cloth".to_string()]).unwrap().get_potential(None).unwrap(),
        &[0.7, 0.25, 0.05],
    );
}
