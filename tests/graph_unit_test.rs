//! Unit tests for the table dependency graph

use relsynth::graph::{DependencyGraph, GraphError};

fn graph(tables: &[&str], edges: &[(&str, &str)]) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    for table in tables {
        graph.add_table(table);
    }
    for (child, parent) in edges {
        graph.add_edge(child, parent).unwrap();
    }
    graph
}

fn position(order: &[&str], name: &str) -> usize {
    order.iter().position(|t| *t == name).unwrap()
}

#[test]
fn test_topological_sort_parents_first() {
    let g = graph(
        &["order_items", "orders", "users", "products"],
        &[
            ("orders", "users"),
            ("order_items", "orders"),
            ("order_items", "products"),
        ],
    );
    let order = g.topological_sort(false);
    assert_eq!(order.len(), 4);
    assert!(position(&order, "users") < position(&order, "orders"));
    assert!(position(&order, "orders") < position(&order, "order_items"));
    assert!(position(&order, "products") < position(&order, "order_items"));
}

#[test]
fn test_topological_sort_reverse() {
    let g = graph(&["a", "b", "c"], &[("b", "a"), ("c", "b")]);
    assert_eq!(g.topological_sort(false), vec!["a", "b", "c"]);
    assert_eq!(g.topological_sort(true), vec!["c", "b", "a"]);
}

#[test]
fn test_ties_keep_insertion_order() {
    let g = graph(&["x", "y", "z"], &[]);
    assert_eq!(g.topological_sort(false), vec!["x", "y", "z"]);
}

#[test]
fn test_cycle_rejected_and_graph_unchanged() {
    let mut g = graph(&["a", "b", "c"], &[("b", "a"), ("c", "b")]);

    let err = g.add_edge("a", "c").unwrap_err();
    assert_eq!(
        err,
        GraphError::Cycle {
            child: "a".to_string(),
            parent: "c".to_string()
        }
    );

    assert!(g.parents("a").is_empty());
    assert!(g.children("c").is_empty());
    assert_eq!(g.topological_sort(false), vec!["a", "b", "c"]);
}

#[test]
fn test_self_edge_is_cycle() {
    let mut g = graph(&["a"], &[]);
    assert!(matches!(g.add_edge("a", "a"), Err(GraphError::Cycle { .. })));
    assert!(g.parents("a").is_empty());
}

#[test]
fn test_unknown_table() {
    let mut g = graph(&["a"], &[]);
    assert_eq!(
        g.add_edge("a", "ghost"),
        Err(GraphError::UnknownTable("ghost".to_string()))
    );
}

#[test]
fn test_levels_and_neighbours() {
    let g = graph(
        &["users", "products", "orders", "items"],
        &[("orders", "users"), ("items", "orders"), ("items", "products")],
    );
    let levels = g.levels();
    assert_eq!(levels["users"], 0);
    assert_eq!(levels["products"], 0);
    assert_eq!(levels["orders"], 1);
    assert_eq!(levels["items"], 2);

    assert_eq!(g.parents("items"), vec!["orders", "products"]);
    assert_eq!(g.children("users"), vec!["orders"]);
    assert_eq!(g.len(), 4);
    assert!(!g.is_empty());
}
