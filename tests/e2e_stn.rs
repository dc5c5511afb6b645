//! STN algorithms against each other on random networks.

use cstnu::stn::{NodeOrder, PathMode};
use cstnu::{NodeId, Stn, StnAlgorithm};
use proptest::prelude::*;

// =========================================================================
// Strategies
// =========================================================================

/// A consistent STN: every edge `u → v` has weight `p(v) − p(u) + slack`
/// for hidden potentials `p`, so `p` is a solution.
fn arb_consistent_stn() -> impl Strategy<Value = Stn> {
    (2usize..9).prop_flat_map(|n| {
        let potentials = prop::collection::vec(-50i64..50, n);
        let edges = prop::collection::vec((0..n, 0..n, 0i64..20), 0..n * 3);
        (potentials, edges).prop_map(move |(p, edges)| {
            let mut stn = Stn::new();
            for i in 0..n {
                stn.add_node(&format!("N{i}")).unwrap();
            }
            for (u, v, slack) in edges {
                stn.add_edge(NodeId(u as u32), NodeId(v as u32), p[v] - p[u] + slack);
            }
            stn
        })
    })
}

/// A ring of `n` nodes whose weights sum to a negative value.
fn arb_negative_ring() -> impl Strategy<Value = Stn> {
    prop::collection::vec(-10i64..10, 2..9).prop_map(|weights| {
        let n = weights.len();
        let mut stn = Stn::new();
        for i in 0..n {
            stn.add_node(&format!("R{i}")).unwrap();
        }
        let head: i64 = weights[..n - 1].iter().sum();
        for (i, w) in weights[..n - 1].iter().enumerate() {
            stn.add_edge(NodeId(i as u32), NodeId(i as u32 + 1), *w);
        }
        stn.add_edge(NodeId(n as u32 - 1), NodeId(0), -head - 1);
        stn
    })
}

// =========================================================================
// Properties
// =========================================================================

proptest! {
    #[test]
    fn prop_floyd_warshall_matches_single_source(mut stn in arb_consistent_stn()) {
        let fw = stn.floyd_warshall().expect("consistent by construction");
        let johnson = stn.johnson();
        prop_assert_eq!(Some(&fw), johnson.as_ref());
        for s in 0..stn.node_count() {
            let source = NodeId(s as u32);
            prop_assert!(stn.bellman_ford(Some(source), PathMode::FromSource));
            prop_assert_eq!(stn.potentials(), fw.row(source));
            prop_assert!(stn.bfct(Some(source), PathMode::FromSource));
            prop_assert_eq!(stn.potentials(), fw.row(source));
            prop_assert!(stn.yen(Some(source), PathMode::FromSource, NodeOrder::Random(s as u64)));
            prop_assert_eq!(stn.potentials(), fw.row(source));
        }
    }

    #[test]
    fn prop_to_sink_is_column_of_matrix(mut stn in arb_consistent_stn()) {
        let fw = stn.floyd_warshall().expect("consistent by construction");
        let sink = NodeId(0);
        prop_assert!(stn.bellman_ford(Some(sink), PathMode::ToSink));
        for u in 0..stn.node_count() {
            prop_assert_eq!(stn.potential(NodeId(u as u32)), fw.get(NodeId(u as u32), sink));
        }
    }

    #[test]
    fn prop_negative_ring_detected(mut stn in arb_negative_ring()) {
        prop_assert!(!stn.bellman_ford(None, PathMode::FromSource));
        prop_assert!(stn.floyd_warshall().is_none());
        prop_assert!(stn.johnson().is_none());
        for algorithm in [
            StnAlgorithm::Yen,
            StnAlgorithm::BannisterEppstein { seed: 11 },
            StnAlgorithm::Bfct,
        ] {
            prop_assert!(!stn.check(algorithm).unwrap());
        }
    }
}

#[test]
fn test_dijkstra_agrees_on_non_negative_network() {
    let mut stn = Stn::new();
    let ids: Vec<NodeId> = (0..4).map(|i| stn.add_node(&format!("D{i}")).unwrap()).collect();
    stn.add_edge(ids[0], ids[1], 4);
    stn.add_edge(ids[0], ids[2], 1);
    stn.add_edge(ids[2], ids[1], 2);
    stn.add_edge(ids[1], ids[3], 5);
    stn.set_z(ids[0]);

    assert!(stn.dijkstra(ids[0], PathMode::FromSource).unwrap());
    let dijkstra = stn.potentials().to_vec();
    assert!(stn.bellman_ford(Some(ids[0]), PathMode::FromSource));
    assert_eq!(dijkstra, stn.potentials());
    assert_eq!(dijkstra, vec![0, 3, 1, 8]);
    assert!(stn.check(StnAlgorithm::Dijkstra).unwrap());
}
