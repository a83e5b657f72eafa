//! Set-operation tests for `mergedb-query`.
//!
//! These tests verify:
//! - UNION, INTERSECT and EXCEPT with set and bag semantics
//! - Traversal in both directions and turning around mid-stream
//! - Operand validation
//! - Materialization of intersect and except row sets

mod common;

use std::sync::Arc;

use common::{assert_reversible, collect, int, keys, table};
use mergedb_query::exec::{ExecutionConfig, ExecutionContext, RowSetArena, RowSetId};
use mergedb_query::plan::{Operand, SetOpDescriptor};
use mergedb_query::QueryError;

/// A = [1, 2, 2, 3], B = [2, 3, 3, 4].
fn merge(descriptor: SetOpDescriptor) -> (ExecutionContext, RowSetId) {
    let (arena, id) = merge_arena(descriptor);
    (ExecutionContext::new(Arc::new(arena)), id)
}

fn merge_arena(descriptor: SetOpDescriptor) -> (RowSetArena, RowSetId) {
    let mut arena = RowSetArena::new();
    let a = arena.add_source(keys("a", "a.k", &[1, 2, 2, 3])).unwrap();
    let b = arena.add_source(keys("b", "b.k", &[2, 3, 3, 4])).unwrap();
    let id = arena.add_merge(descriptor, a, b).unwrap();
    (arena, id)
}

fn ints(values: &[i64]) -> Vec<Vec<mergedb_core::Value>> {
    values.iter().map(|v| vec![int(*v)]).collect()
}

// ============================================================================
// Semantics
// ============================================================================

mod semantics {
    use super::*;

    #[test]
    fn union_distinct() {
        let (ctx, id) = merge(SetOpDescriptor::union());
        assert_eq!(collect(&ctx, id), ints(&[1, 2, 3, 4]));
        assert_reversible(&ctx, id);
    }

    #[test]
    fn union_all() {
        let (ctx, id) = merge(SetOpDescriptor::union_all());
        assert_eq!(collect(&ctx, id), ints(&[1, 2, 2, 2, 3, 3, 3, 4]));
        assert_reversible(&ctx, id);
    }

    #[test]
    fn intersect_distinct() {
        let (ctx, id) = merge(SetOpDescriptor::intersect());
        assert_eq!(collect(&ctx, id), ints(&[2, 3]));
        assert_reversible(&ctx, id);
    }

    #[test]
    fn intersect_all_pairs_duplicates() {
        let (ctx, id) = merge(SetOpDescriptor::intersect_all());
        assert_eq!(collect(&ctx, id), ints(&[2, 3]));
        assert_reversible(&ctx, id);
    }

    #[test]
    fn except_distinct() {
        let (ctx, id) = merge(SetOpDescriptor::except());
        assert_eq!(collect(&ctx, id), ints(&[1]));
        assert_reversible(&ctx, id);
    }

    #[test]
    fn except_all_subtracts_multiplicities() {
        let (ctx, id) = merge(SetOpDescriptor::except_all());
        assert_eq!(collect(&ctx, id), ints(&[1, 2]));
        assert_reversible(&ctx, id);
    }

    #[test]
    fn empty_operands() {
        let cases = [
            (SetOpDescriptor::union(), ints(&[1])),
            (SetOpDescriptor::union_all(), ints(&[1, 1])),
            (SetOpDescriptor::intersect(), ints(&[])),
            (SetOpDescriptor::except(), ints(&[1])),
            (SetOpDescriptor::except_all(), ints(&[1, 1])),
        ];
        for (descriptor, expected) in cases {
            let mut arena = RowSetArena::new();
            let a = arena.add_source(keys("a", "a.k", &[1, 1])).unwrap();
            let b = arena.add_source(keys("b", "b.k", &[])).unwrap();
            let id = arena.add_merge(descriptor.clone(), a, b).unwrap();
            let ctx = ExecutionContext::new(Arc::new(arena));
            assert_eq!(collect(&ctx, id), expected, "{descriptor}");
        }
    }

    #[test]
    fn multi_column_rows() {
        let mut arena = RowSetArena::new();
        let a = arena
            .add_source(table("a", &["x", "y"], &["x", "y"], vec![
                vec![int(1), int(1)],
                vec![int(1), int(2)],
            ]))
            .unwrap();
        let b = arena
            .add_source(table("b", &["p", "q"], &["p", "q"], vec![
                vec![int(1), int(2)],
                vec![int(2), int(0)],
            ]))
            .unwrap();
        let id = arena.add_merge(SetOpDescriptor::union(), a, b).unwrap();
        let ctx = ExecutionContext::new(Arc::new(arena));

        let result = mergedb_query::Executor::new(&ctx).collect(id).unwrap();
        assert_eq!(result.columns(), &["x", "y"]);
        assert_eq!(result.to_values(), vec![
            vec![int(1), int(1)],
            vec![int(1), int(2)],
            vec![int(2), int(0)],
        ]);
        assert_reversible(&ctx, id);
    }

    #[test]
    fn nested_operations() {
        let mut arena = RowSetArena::new();
        let a = arena.add_source(keys("a", "a.k", &[1, 2, 2, 3])).unwrap();
        let b = arena.add_source(keys("b", "b.k", &[2, 3, 3, 4])).unwrap();
        let c = arena.add_source(keys("c", "c.k", &[0, 2])).unwrap();
        let except = arena.add_merge(SetOpDescriptor::except_all(), a, b).unwrap();
        let union = arena.add_merge(SetOpDescriptor::union_all(), except, c).unwrap();
        let ctx = ExecutionContext::new(Arc::new(arena));

        assert_eq!(collect(&ctx, union), ints(&[0, 1, 2, 2]));
        assert_reversible(&ctx, union);
    }

    #[test]
    fn distinct_set_algebra() {
        let run = |descriptor: SetOpDescriptor, l: &[i64], r: &[i64]| {
            let mut arena = RowSetArena::new();
            let a = arena.add_source(keys("a", "a.k", l)).unwrap();
            let b = arena.add_source(keys("b", "b.k", r)).unwrap();
            let id = arena.add_merge(descriptor, a, b).unwrap();
            collect(&ExecutionContext::new(Arc::new(arena)), id)
        };
        let l = [1, 1, 2, 5];
        let r = [2, 3, 5, 5];

        assert_eq!(run(SetOpDescriptor::union(), &l, &r), run(SetOpDescriptor::union(), &r, &l));
        assert_eq!(run(SetOpDescriptor::union(), &l, &l), ints(&[1, 2, 5]));
        assert_eq!(
            run(SetOpDescriptor::intersect(), &l, &r),
            run(SetOpDescriptor::intersect(), &r, &l)
        );
        assert!(run(SetOpDescriptor::except(), &l, &l).is_empty());
        assert!(run(SetOpDescriptor::except_all(), &l, &l).is_empty());
        assert_eq!(run(SetOpDescriptor::union_all(), &l, &r).len(), l.len() + r.len());
    }

    #[test]
    fn residual_predicate() {
        let predicate = Operand::column("a.k").not_eq(Operand::literal(2i64)).into_predicate();
        let (ctx, id) = merge(SetOpDescriptor::union().with_predicate(predicate));
        assert_eq!(collect(&ctx, id), ints(&[1, 3, 4]));
        assert_reversible(&ctx, id);
    }
}

// ============================================================================
// Cursors
// ============================================================================

mod cursors {
    use super::*;

    #[test]
    fn records_name_the_contributing_operand() {
        let (ctx, id) = merge(SetOpDescriptor::union());
        let children = ctx.node(id).unwrap().children();

        let first = ctx.first(id).unwrap().unwrap();
        assert_eq!(first.rec().unwrap().rowset, children[0]);
        let last = ctx.last(id).unwrap().unwrap();
        assert_eq!(last.get("a.k"), Some(&int(4)));
        assert_eq!(last.rec().unwrap().rowset, children[1]);
    }

    #[test]
    fn turning_forward_from_the_end() {
        let walk_back_then_forward = |descriptor: SetOpDescriptor, back: usize| {
            let (ctx, id) = merge(descriptor);
            let mut cursor = ctx.last(id).unwrap().unwrap();
            for _ in 0..back {
                cursor = cursor.previous(&ctx).unwrap().unwrap();
            }
            let mut seen = vec![cursor.row().values().to_vec()];
            while let Some(next) = cursor.next(&ctx).unwrap() {
                seen.push(next.row().values().to_vec());
                cursor = next;
            }
            seen
        };

        assert_eq!(walk_back_then_forward(SetOpDescriptor::union_all(), 4), ints(&[2, 3, 3, 3, 4]));
        assert_eq!(walk_back_then_forward(SetOpDescriptor::union_all(), 6), ints(&[2, 2, 2, 3, 3, 3, 4]));
        assert_eq!(walk_back_then_forward(SetOpDescriptor::except_all(), 1), ints(&[1, 2]));
        assert_eq!(walk_back_then_forward(SetOpDescriptor::except(), 0), ints(&[1]));
        assert_eq!(walk_back_then_forward(SetOpDescriptor::intersect_all(), 1), ints(&[2, 3]));
    }

    #[test]
    fn turning_around_on_ties() {
        let (ctx, id) = merge(SetOpDescriptor::union_all());
        let mut cursor = ctx.first(id).unwrap().unwrap();
        for _ in 0..3 {
            cursor = cursor.next(&ctx).unwrap().unwrap();
        }
        assert_eq!(cursor.get("a.k"), Some(&int(2)));
        let back = cursor.previous(&ctx).unwrap().unwrap();
        assert_eq!(back.get("a.k"), Some(&int(2)));
        let forward = back.next(&ctx).unwrap().unwrap();
        assert_eq!(forward.rec(), cursor.rec());
    }
}

// ============================================================================
// Validation
// ============================================================================

mod validation {
    use super::*;

    #[test]
    fn rejects_different_arity() {
        let mut arena = RowSetArena::new();
        let a = arena.add_source(table("a", &["x", "y"], &["x", "y"], vec![])).unwrap();
        let b = arena.add_source(keys("b", "p", &[])).unwrap();
        let err = arena.add_merge(SetOpDescriptor::union(), a, b).unwrap_err();
        assert!(matches!(err, QueryError::InvalidPlan(_)));
    }

    #[test]
    fn rejects_partial_ordering() {
        let mut arena = RowSetArena::new();
        let a = arena.add_source(table("a", &["x", "y"], &["x"], vec![])).unwrap();
        let b = arena.add_source(table("b", &["p", "q"], &["p", "q"], vec![])).unwrap();
        let err = arena.add_merge(SetOpDescriptor::intersect(), a, b).unwrap_err();
        assert!(matches!(err, QueryError::InvalidPlan(_)));
    }

    #[test]
    fn rejects_operands_ordered_differently() {
        let mut arena = RowSetArena::new();
        let a = arena.add_source(table("a", &["x", "y"], &["x", "y"], vec![])).unwrap();
        let b = arena.add_source(table("b", &["p", "q"], &["q", "p"], vec![])).unwrap();
        let err = arena.add_merge(SetOpDescriptor::except(), a, b).unwrap_err();
        assert!(matches!(err, QueryError::InvalidPlan(_)));
    }

    #[test]
    fn unknown_set_operation_is_fatal() {
        let err = "SYMMETRIC".parse::<mergedb_query::SetOpKind>().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!("minus".parse::<mergedb_query::SetOpKind>().unwrap().code(), "EXCEPT");
    }
}

// ============================================================================
// Materialization
// ============================================================================

mod materialization {
    use super::*;

    #[test]
    fn built_rows_match_streaming() {
        for descriptor in [
            SetOpDescriptor::intersect(),
            SetOpDescriptor::intersect_all(),
            SetOpDescriptor::except(),
            SetOpDescriptor::except_all(),
        ] {
            let (mut arena, id) = merge_arena(descriptor);
            let built = arena.materialize(id, &ExecutionConfig::new()).unwrap();
            assert_ne!(built, id);
            assert_eq!(arena.len(), 4);

            let ctx = ExecutionContext::new(Arc::new(arena));
            assert_eq!(collect(&ctx, built), collect(&ctx, id));
            assert_reversible(&ctx, built);
            assert!(ctx.first(built).unwrap().unwrap().rec().is_none());
        }
    }

    #[test]
    fn strategy_shows_built_rows() {
        let (mut arena, id) = merge_arena(SetOpDescriptor::intersect());
        let built = arena.materialize(id, &ExecutionConfig::new()).unwrap();
        assert_eq!(
            arena.strategy(built).to_string(),
            "└── Merge INTERSECT DISTINCT (built: 2 rows) #3\n    \
             ├── Source a ORDER BY a.k #0\n    \
             └── Source b ORDER BY b.k #1\n"
        );
    }

    #[test]
    fn refuses_results_over_the_limit() {
        let (mut arena, id) = merge_arena(SetOpDescriptor::intersect());
        let config = ExecutionConfig::new().with_max_rows_in_memory(1);
        let err = arena.materialize(id, &config).unwrap_err();
        assert!(matches!(err, QueryError::QueryTooLarge { actual: 2, limit: 1 }));
        assert_eq!(arena.len(), 3);
    }

    #[test]
    fn skips_ineligible_row_sets() {
        let (mut arena, union) = merge_arena(SetOpDescriptor::union());
        assert_eq!(arena.materialize(union, &ExecutionConfig::new()).unwrap(), union);

        let predicate = Operand::column("a.k").gt(Operand::literal(1i64)).into_predicate();
        let (mut arena, filtered) =
            merge_arena(SetOpDescriptor::intersect().with_predicate(predicate));
        assert_eq!(arena.materialize(filtered, &ExecutionConfig::new()).unwrap(), filtered);

        let mut arena2 = RowSetArena::new();
        let a = arena2
            .add_filtered_source(
                keys("a", "a.k", &[1, 2]),
                Operand::column("a.k").gt(Operand::param(1)).into_predicate(),
            )
            .unwrap();
        let b = arena2.add_source(keys("b", "b.k", &[2])).unwrap();
        let bound = arena2.add_merge(SetOpDescriptor::except(), a, b).unwrap();
        assert_eq!(arena2.materialize(bound, &ExecutionConfig::new()).unwrap(), bound);
        assert_eq!(arena2.len(), 3);

        let source = RowSetId::new(0);
        assert_eq!(arena.materialize(source, &ExecutionConfig::new()).unwrap(), source);
    }
}
