//! Integration tests for building and aggregating a domain hierarchy.

use rstest::rstest;

use schedtree::domain::{
    ChainLink, CpuLoadSample, CpuSet, DomainError, DomainKey, DomainNames, ErrorKind,
    HierarchyBuilder, HierarchyTree, LoadAggregator, PerCpuChain, Report,
};
use schedtree::infrastructure::procfs::parse_schedstat;
use schedtree::util::testing;

const FOUR_CPUS: &str = "\
version 15
timestamp 4295347154
cpu0 0 0 0 0 0 0 1286834498 43580620 9867
domain0 03 0 0 0 0 0 0 0
domain1 0f 0 0 0 0 0 0 0
cpu1 0 0 0 0 0 0 1286834498 43580620 9867
domain0 03 0 0 0 0 0 0 0
domain1 0f 0 0 0 0 0 0 0
cpu2 0 0 0 0 0 0 1286834498 43580620 9867
domain0 0c 0 0 0 0 0 0 0
domain1 0f 0 0 0 0 0 0 0
cpu3 0 0 0 0 0 0 1286834498 43580620 9867
domain0 0c 0 0 0 0 0 0 0
domain1 0f 0 0 0 0 0 0 0
";

fn smt_mc() -> DomainNames {
    DomainNames::from_levels([(1, "SMT"), (2, "MC")])
}

fn chain(cpu: usize, links: &[(usize, &[usize])]) -> PerCpuChain {
    PerCpuChain::new(
        cpu,
        links
            .iter()
            .map(|(level, cpus)| ChainLink::new(*level, CpuSet::from_cpus(cpus.iter().copied())))
            .collect(),
    )
}

fn load_of(tree: &HierarchyTree, level: usize, cpus: &[usize]) -> u64 {
    let key = DomainKey::new(level, CpuSet::from_cpus(cpus.iter().copied()));
    let idx = tree.find(&key).expect("node exists");
    tree.get_node(idx).expect("live index").load
}

fn four_cpu_tree() -> HierarchyTree {
    let (records, diags) = parse_schedstat(FOUR_CPUS);
    assert!(diags.is_empty());
    let names = smt_mc();
    let out = HierarchyBuilder::new(&names).build_records(&records, 8);
    assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
    out.tree
}

#[test]
fn given_four_cpu_topology_when_aggregating_then_matches_expected_loads() {
    testing::init_test_setup();
    // Arrange
    let mut tree = four_cpu_tree();
    let sample: CpuLoadSample = [(0, 10), (1, 20), (2, 5), (3, 5)].into_iter().collect();

    // Act
    let diags = LoadAggregator::new().apply(&mut tree, &sample);

    // Assert
    assert!(diags.is_empty());
    assert_eq!(load_of(&tree, 1, &[0, 1]), 30);
    assert_eq!(load_of(&tree, 1, &[2, 3]), 10);
    assert_eq!(load_of(&tree, 2, &[0, 1, 2, 3]), 40);
    assert_eq!(tree.root_load(), 40);

    let report = Report::new(&tree);
    let top: Vec<_> = report.top_level().collect();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].type_name(), "MC");
    assert_eq!(report.imbalance(1), Some(20));
}

#[test]
fn given_shared_descriptor_when_building_then_creates_one_node() {
    let tree = four_cpu_tree();

    let mc_nodes = tree.iter().filter(|(_, n)| n.level() == 2).count();
    let smt_nodes = tree.iter().filter(|(_, n)| n.level() == 1).count();

    assert_eq!(mc_nodes, 1);
    assert_eq!(smt_nodes, 2);
    // 1 MC + 2 SMT + 4 CPU leaves
    assert_eq!(tree.len(), 7);
}

#[rstest]
#[case(&[(0, 10), (1, 20), (2, 5), (3, 5)])]
#[case(&[(0, 0), (1, 0), (2, 0), (3, 0)])]
#[case(&[(3, 1_000_000)])]
#[case(&[(0, 7), (2, 9)])]
fn given_any_sample_when_aggregating_then_root_equals_sum(#[case] loads: &[(usize, u64)]) {
    let mut tree = four_cpu_tree();
    let sample: CpuLoadSample = loads.iter().copied().collect();

    LoadAggregator::new().apply(&mut tree, &sample);

    let expected: u64 = loads.iter().map(|(_, l)| l).sum();
    assert_eq!(tree.root_load(), expected);
    assert_eq!(load_of(&tree, 2, &[0, 1, 2, 3]), expected);
}

#[test]
fn given_overlapping_siblings_when_aggregating_then_reports_partition_violation() {
    // Arrange: {0,1} and {1,2} both end up at the top level
    let names = DomainNames::from_levels([(1, "MC")]);
    let chains = vec![chain(0, &[(1, &[0, 1])]), chain(1, &[(1, &[1, 2])])];
    let mut out = HierarchyBuilder::new(&names).build(&chains);
    let sample: CpuLoadSample = [(0, 4), (1, 6)].into_iter().collect();

    // Act
    let diags = LoadAggregator::new().apply(&mut out.tree, &sample);

    // Assert: cpu1 fails closed, cpu0 still counted
    assert!(matches!(
        diags.iter().next(),
        Some(DomainError::PartitionViolation { cpu: 1, level: 1, count: 2 })
    ));
    assert!(diags.has_kind(ErrorKind::Integrity));
    assert_eq!(load_of(&out.tree, 1, &[0, 1]), 4);
    assert_eq!(load_of(&out.tree, 1, &[1, 2]), 0);
    assert_eq!(out.tree.root_load(), 4);
}

#[test]
fn given_cpu_without_sample_when_aggregating_then_contributes_zero() {
    let mut tree = four_cpu_tree();
    let sample: CpuLoadSample = [(0, 10), (1, 20)].into_iter().collect();

    let diags = LoadAggregator::new().apply(&mut tree, &sample);

    assert!(diags.is_empty());
    assert_eq!(load_of(&tree, 1, &[2, 3]), 0);
    assert_eq!(load_of(&tree, 0, &[3]), 0);
    assert_eq!(tree.root_load(), 30);
}

#[test]
fn given_malformed_chain_when_building_then_skips_it_and_keeps_others() {
    // Arrange: cpu1 is not in its own level 1 domain
    let names = smt_mc();
    let chains = vec![
        chain(0, &[(2, &[0, 1, 2, 3]), (1, &[0, 1])]),
        chain(1, &[(2, &[0, 1, 2, 3]), (1, &[2, 3])]),
        chain(2, &[(2, &[0, 1, 2, 3]), (1, &[2, 3])]),
    ];

    // Act
    let out = HierarchyBuilder::new(&names).build(&chains);

    // Assert
    assert_eq!(out.diagnostics.len(), 1);
    assert!(matches!(
        out.diagnostics.iter().next(),
        Some(DomainError::CpuNotInDomain { cpu: 1, level: 1, .. })
    ));
    assert!(out.tree.find(&DomainKey::leaf(1)).is_none());
    assert!(out.tree.find(&DomainKey::leaf(2)).is_some());
}

#[test]
fn given_non_monotonic_levels_when_building_then_reports_parse_error() {
    let names = smt_mc();
    let chains = vec![chain(0, &[(1, &[0, 1]), (2, &[0, 1, 2, 3])])];

    let out = HierarchyBuilder::new(&names).build(&chains);

    assert!(out.tree.is_empty());
    assert!(out.diagnostics.has_kind(ErrorKind::Parse));
}

#[test]
fn given_conflicting_type_when_building_then_keeps_first_type() {
    // Arrange: cpu1 sees level 1 named differently
    let mut names = DomainNames::from_levels([(1, "SMT")]);
    names.insert_for_cpu(1, 1, "CLS");
    let chains = vec![chain(0, &[(1, &[0, 1])]), chain(1, &[(1, &[0, 1])])];

    // Act
    let out = HierarchyBuilder::new(&names).build(&chains);

    // Assert
    let idx = out.tree.find(&DomainKey::new(1, CpuSet::from_cpus([0, 1]))).unwrap();
    assert_eq!(out.tree.get_node(idx).unwrap().type_name, "SMT");
    assert!(matches!(
        out.diagnostics.iter().next(),
        Some(DomainError::TypeConflict { existing, found, .. }) if existing == "SMT" && found == "CLS"
    ));
    // cpu1's chain was skipped as a whole
    assert!(out.tree.find(&DomainKey::leaf(1)).is_none());
}

#[test]
fn given_missing_name_when_building_then_falls_back_once_per_level() {
    let names = DomainNames::from_levels([(1, "SMT")]);
    let chains = vec![
        chain(0, &[(2, &[0, 1, 2, 3]), (1, &[0, 1])]),
        chain(2, &[(2, &[0, 1, 2, 3]), (1, &[2, 3])]),
    ];

    let out = HierarchyBuilder::new(&names).build(&chains);

    let idx = out.tree.find(&DomainKey::new(2, CpuSet::from_cpus(0..4))).unwrap();
    assert_eq!(out.tree.get_node(idx).unwrap().type_name, "domain1");
    assert_eq!(out.diagnostics.len(), 1);
    assert!(matches!(
        out.diagnostics.iter().next(),
        Some(DomainError::MissingName { level: 2, fallback }) if fallback == "domain1"
    ));
}

#[test]
fn given_chains_in_cpu_order_when_building_then_children_keep_discovery_order() {
    let names = smt_mc();
    let chains = vec![
        chain(2, &[(2, &[0, 1, 2, 3]), (1, &[2, 3])]),
        chain(0, &[(2, &[0, 1, 2, 3]), (1, &[0, 1])]),
        chain(3, &[(2, &[0, 1, 2, 3]), (1, &[2, 3])]),
    ];

    let out = HierarchyBuilder::new(&names).build(&chains);
    let report = Report::new(&out.tree);

    let mc = report.top_level().next().unwrap();
    let smt: Vec<String> = mc.children().map(|c| c.members().to_string()).collect();
    assert_eq!(smt, vec!["2-3", "0-1"]);
    let cpus: Vec<_> = mc.children().next().unwrap().children().map(|c| c.cpu()).collect();
    assert_eq!(cpus, vec![Some(2), Some(3)]);
}
