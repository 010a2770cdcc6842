#[path = "support/mock_chain.rs"]
mod mock_chain;

use alloy::primitives::U256;
use mock_chain::{fixture_inputs, reserve_book, MockChain, DAI, WANT, WETH};
use vault_harness::adapter::{Artifact, ChainAdapter};
use vault_harness::contracts::{read, IStrategy, IVault};
use vault_harness::error::{AdapterError, SetupError};
use vault_harness::fixture::{FixtureGraph, FixtureNode};
use vault_harness::funding::ReserveBook;
use vault_harness::identity::{Authority, IdentityRegistry, Role};

fn units(whole: u64) -> U256 {
    U256::from(whole) * U256::from(10u64).pow(U256::from(18u64))
}

#[test]
fn test_build_deploys_and_wires_the_system_under_test() {
    let mut chain = MockChain::new();
    let mut registry = IdentityRegistry::new(chain.accounts().to_vec());
    let reserves = reserve_book();
    let inputs = fixture_inputs();
    let fixture = FixtureGraph::new(&mut chain, &mut registry, &reserves, &inputs)
        .build()
        .expect("fixture builds");

    assert_eq!(
        fixture.trace,
        vec![
            FixtureNode::Identities,
            FixtureNode::Assets,
            FixtureNode::Funding,
            FixtureNode::Vault,
            FixtureNode::Strategy,
        ]
    );
    assert_eq!(fixture.sut.want.address, WANT);
    assert_eq!(fixture.sut.want.symbol, "YFI");
    assert_eq!(fixture.wrapped_native.as_ref().map(|a| a.address), Some(WETH));
    assert_eq!(fixture.protected[0].address, DAI);

    let want = read(&mut chain, fixture.sut.strategy, &IStrategy::wantCall {})
        .expect("want")
        ._0;
    assert_eq!(want, WANT);
    let vault = read(&mut chain, fixture.sut.strategy, &IStrategy::vaultCall {})
        .expect("vault")
        ._0;
    assert_eq!(vault, fixture.sut.vault);
    let debt_ratio = read(&mut chain, fixture.sut.vault, &IVault::debtRatioCall {})
        .expect("debt ratio")
        ._0;
    assert_eq!(debt_ratio, U256::from(10_000u64));
}

#[test]
fn test_depositors_are_funded_from_the_reserve() {
    let mut chain = MockChain::new();
    let mut registry = IdentityRegistry::new(chain.accounts().to_vec());
    let reserves = reserve_book();
    let inputs = fixture_inputs();
    let fixture = FixtureGraph::new(&mut chain, &mut registry, &reserves, &inputs)
        .build()
        .expect("fixture builds");

    assert_eq!(fixture.funded(0), Some(units(1_000)));
    assert_eq!(fixture.funded(1), Some(units(2_170)));
    assert_eq!(fixture.funded(2), Some(units(2_170)));
    assert_eq!(fixture.funded_total(), units(5_340));

    let pool = chain.accounts().to_vec();
    let user = fixture.identity(Role::Depositor(0)).expect("user");
    let user217 = fixture.identity(Role::Depositor(1)).expect("user217");
    assert_eq!(user.address, pool[0]);
    assert_eq!(user217.address, pool[9]);
    assert_eq!(user217.authority, Authority::Pool(9));
    assert_eq!(chain.token_balance(WANT, user.address), units(1_000));
    assert_eq!(chain.token_balance(WANT, user217.address), units(2_170));
}

#[test]
fn test_nodes_are_memoized_within_a_graph() {
    let mut chain = MockChain::new();
    let mut registry = IdentityRegistry::new(chain.accounts().to_vec());
    let reserves = reserve_book();
    let inputs = fixture_inputs();
    let mut graph = FixtureGraph::new(&mut chain, &mut registry, &reserves, &inputs);

    let first = graph.vault().expect("vault");
    let again = graph.vault().expect("vault again");
    assert_eq!(first, again);
    let strategy = graph.strategy().expect("strategy");
    assert_eq!(graph.strategy().expect("strategy again"), strategy);
    assert_eq!(
        graph
            .trace()
            .iter()
            .filter(|node| **node == FixtureNode::Vault)
            .count(),
        1
    );
    drop(graph);
    assert_eq!(chain.deployed_vaults(), 1);
}

#[test]
fn test_missing_reserve_is_fatal() {
    let mut chain = MockChain::new();
    let mut registry = IdentityRegistry::new(chain.accounts().to_vec());
    let reserves = ReserveBook::default();
    let inputs = fixture_inputs();
    let err = FixtureGraph::new(&mut chain, &mut registry, &reserves, &inputs)
        .build()
        .expect_err("no reserve for want");
    assert!(matches!(err, SetupError::MissingReserve(asset) if asset == WANT));
}

#[test]
fn test_undeployable_vault_artifact_surfaces_as_setup_error() {
    let mut chain = MockChain::new();
    let mut registry = IdentityRegistry::new(chain.accounts().to_vec());
    let reserves = reserve_book();
    let mut inputs = fixture_inputs();
    inputs.vault_artifact = Artifact::new("BrokenVault", vec![0xfe]);
    let err = FixtureGraph::new(&mut chain, &mut registry, &reserves, &inputs)
        .build()
        .expect_err("deploy fails");
    match err {
        SetupError::Adapter { stage, source } => {
            assert_eq!(stage, "deploy vault");
            assert!(matches!(source, AdapterError::Deploy { .. }));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_too_many_depositors_exhaust_the_pool() {
    let mut chain = MockChain::new();
    let mut registry = IdentityRegistry::new(chain.accounts().to_vec());
    let reserves = reserve_book();
    let mut inputs = fixture_inputs();
    inputs.config.depositor_units = vec![1; 5];
    let err = FixtureGraph::new(&mut chain, &mut registry, &reserves, &inputs)
        .build()
        .expect_err("pool of 10 fits at most four depositors");
    assert!(matches!(err, SetupError::PoolExhausted { .. }));
}
