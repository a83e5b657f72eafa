//! Property-based tests comparing merge algorithms with nested-loop models.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{assert_reversible, assert_zigzag, collect, collect_backward, int, keys, table};
use mergedb_core::Value;
use mergedb_query::exec::{ExecutionConfig, ExecutionContext, RowSetArena, RowSetId};
use mergedb_query::plan::{JoinDescriptor, JoinKind, JoinSide, Operand, SetOpDescriptor, SetOpKind};
use proptest::prelude::*;

/// Sorted join keys; each row carries its index as payload.
fn arb_keys() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(0i64..4, 0..8).prop_map(|mut keys| {
        keys.sort_unstable();
        keys
    })
}

fn rows(keys: &[i64]) -> Vec<Vec<Value>> {
    keys.iter().enumerate().map(|(i, k)| vec![int(*k), int(i as i64)]).collect()
}

fn join(descriptor: JoinDescriptor, left: &[i64], right: &[i64]) -> (ExecutionContext, RowSetId) {
    let mut arena = RowSetArena::new();
    let l = arena.add_source(table("l", &["l.k", "l.i"], &["l.k"], rows(left))).unwrap();
    let r = arena.add_source(table("r", &["r.k", "r.i"], &["r.k"], rows(right))).unwrap();
    let id = arena.add_join(descriptor.on("l.k", "r.k"), l, r).unwrap();
    (ExecutionContext::new(Arc::new(arena)), id)
}

/// The rows a join of `kind` produces, in the order its driving side
/// delivers them.
fn join_model(kind: JoinKind, left: &[i64], right: &[i64]) -> Vec<Vec<Value>> {
    join_rows_model(kind, &rows(left), &rows(right), 2, 2)
}

/// Like [`join_model`] over arbitrary rows keyed on their first column.
fn join_rows_model(
    kind: JoinKind,
    l: &[Vec<Value>],
    r: &[Vec<Value>],
    left_width: usize,
    right_width: usize,
) -> Vec<Vec<Value>> {
    let left_nulls = vec![Value::Null; left_width];
    let right_nulls = vec![Value::Null; right_width];
    let pair = |a: &[Value], b: &[Value]| [a, b].concat();
    let mut out = Vec::new();
    match kind {
        JoinKind::Right => {
            for rr in r {
                let matches: Vec<_> = l.iter().filter(|lr| lr[0] == rr[0]).collect();
                if matches.is_empty() {
                    out.push(pair(&left_nulls, rr));
                }
                out.extend(matches.into_iter().map(|lr| pair(lr, rr)));
            }
        }
        _ => {
            for lr in l {
                let matches: Vec<_> = r.iter().filter(|rr| rr[0] == lr[0]).collect();
                if matches.is_empty() && matches!(kind, JoinKind::Left | JoinKind::Full) {
                    out.push(pair(lr, &right_nulls));
                }
                out.extend(matches.into_iter().map(|rr| pair(lr, rr)));
            }
            if kind == JoinKind::Full {
                for rr in r.iter().filter(|rr| !l.iter().any(|lr| lr[0] == rr[0])) {
                    out.push(pair(&left_nulls, rr));
                }
            }
        }
    }
    out
}

/// `l JOIN (m JOIN r)`, where the nested join is inner or left.
fn nested_join(
    kind: JoinKind,
    nested: JoinKind,
    left: &[i64],
    mid: &[i64],
    right: &[i64],
) -> (ExecutionContext, RowSetId) {
    let mut arena = RowSetArena::new();
    let l = arena.add_source(table("l", &["l.k", "l.i"], &["l.k"], rows(left))).unwrap();
    let m = arena.add_source(table("m", &["m.k", "m.i"], &["m.k"], rows(mid))).unwrap();
    let r = arena.add_source(table("r", &["r.k", "r.i"], &["r.k"], rows(right))).unwrap();
    let mr = arena.add_join(JoinDescriptor::new(nested).on("m.k", "r.k"), m, r).unwrap();
    let id = arena.add_join(JoinDescriptor::new(kind).on("l.k", "m.k"), l, mr).unwrap();
    (ExecutionContext::new(Arc::new(arena)), id)
}

/// A join whose operands drop the row with payload `skip_left` and
/// `skip_right` through source predicates.
fn filtered_join(
    kind: JoinKind,
    left: &[i64],
    right: &[i64],
    skip_left: i64,
    skip_right: i64,
) -> (ExecutionContext, RowSetId) {
    let mut arena = RowSetArena::new();
    let l = arena
        .add_filtered_source(
            table("l", &["l.k", "l.i"], &["l.k"], rows(left)),
            Operand::column("l.i").not_eq(Operand::literal(skip_left)).into_predicate(),
        )
        .unwrap();
    let r = arena
        .add_filtered_source(
            table("r", &["r.k", "r.i"], &["r.k"], rows(right)),
            Operand::column("r.i").not_eq(Operand::literal(skip_right)).into_predicate(),
        )
        .unwrap();
    let id = arena.add_join(JoinDescriptor::new(kind).on("l.k", "r.k"), l, r).unwrap();
    (ExecutionContext::new(Arc::new(arena)), id)
}

fn without_payload(keys: &[i64], skip: i64) -> Vec<Vec<Value>> {
    rows(keys).into_iter().filter(|row| row[1] != int(skip)).collect()
}

fn counts(keys: &[i64]) -> BTreeMap<i64, usize> {
    let mut counts = BTreeMap::new();
    for k in keys {
        *counts.entry(*k).or_insert(0) += 1;
    }
    counts
}

/// The values a set operation produces, ascending.
fn set_keys(kind: SetOpKind, distinct: bool, a: &[i64], b: &[i64]) -> Vec<i64> {
    let (ca, cb) = (counts(a), counts(b));
    let mut all: Vec<i64> = ca.keys().chain(cb.keys()).copied().collect();
    all.sort_unstable();
    all.dedup();
    let mut out = Vec::new();
    for v in all {
        let (x, y) = (ca.get(&v).copied().unwrap_or(0), cb.get(&v).copied().unwrap_or(0));
        let n = match kind {
            SetOpKind::Union => x + y,
            SetOpKind::Intersect => x.min(y),
            SetOpKind::Except if distinct && y > 0 => 0,
            SetOpKind::Except => x.saturating_sub(y),
        };
        let n = if distinct { n.min(1) } else { n };
        out.extend(std::iter::repeat(v).take(n));
    }
    out
}

fn set_model(kind: SetOpKind, distinct: bool, a: &[i64], b: &[i64]) -> Vec<Vec<Value>> {
    set_keys(kind, distinct, a, b).into_iter().map(|v| vec![int(v)]).collect()
}

fn merge(descriptor: SetOpDescriptor, a: &[i64], b: &[i64]) -> (RowSetArena, RowSetId) {
    let mut arena = RowSetArena::new();
    let l = arena.add_source(keys("a", "a.k", a)).unwrap();
    let r = arena.add_source(keys("b", "b.k", b)).unwrap();
    let id = arena.add_merge(descriptor, l, r).unwrap();
    (arena, id)
}

fn sorted(mut rows: Vec<Vec<Value>>) -> Vec<Vec<Value>> {
    rows.sort_by(|a, b| {
        a.iter().zip(b).map(|(x, y)| x.total_cmp(y)).find(|o| o.is_ne()).unwrap_or(std::cmp::Ordering::Equal)
    });
    rows
}

fn arb_merge_join() -> impl Strategy<Value = JoinKind> {
    prop_oneof![
        Just(JoinKind::Inner),
        Just(JoinKind::Left),
        Just(JoinKind::Right),
        Just(JoinKind::Full),
    ]
}

fn arb_nested_join() -> impl Strategy<Value = JoinKind> {
    prop_oneof![Just(JoinKind::Inner), Just(JoinKind::Left)]
}

fn arb_set_op() -> impl Strategy<Value = (SetOpKind, bool)> {
    (
        prop_oneof![Just(SetOpKind::Union), Just(SetOpKind::Intersect), Just(SetOpKind::Except)],
        any::<bool>(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn merge_joins_match_nested_loops(kind in arb_merge_join(), left in arb_keys(), right in arb_keys()) {
        let (ctx, id) = join(JoinDescriptor::new(kind), &left, &right);
        let actual = collect(&ctx, id);
        let expected = join_model(kind, &left, &right);
        if kind == JoinKind::Full {
            prop_assert_eq!(sorted(actual), sorted(expected));
        } else {
            prop_assert_eq!(actual, expected);
        }
    }

    #[test]
    fn joins_turn_around_anywhere(kind in arb_merge_join(), left in arb_keys(), right in arb_keys()) {
        let (ctx, id) = join(JoinDescriptor::new(kind), &left, &right);
        assert_reversible(&ctx, id);
    }

    #[test]
    fn joins_over_nested_joins_match_nested_loops(
        kind in arb_merge_join(),
        nested in arb_nested_join(),
        left in arb_keys(),
        mid in arb_keys(),
        right in arb_keys(),
    ) {
        let (ctx, id) = nested_join(kind, nested, &left, &mid, &right);
        let inner = join_rows_model(nested, &rows(&mid), &rows(&right), 2, 2);
        let expected = join_rows_model(kind, &rows(&left), &inner, 2, 4);
        let actual = collect(&ctx, id);
        if kind == JoinKind::Full {
            prop_assert_eq!(sorted(actual), sorted(expected));
        } else {
            prop_assert_eq!(actual, expected);
        }
        assert_reversible(&ctx, id);
        assert_zigzag(&ctx, id);
    }

    #[test]
    fn joins_over_filtered_sources_match_nested_loops(
        kind in arb_merge_join(),
        left in arb_keys(),
        right in arb_keys(),
        skip_left in 0i64..8,
        skip_right in 0i64..8,
    ) {
        let (ctx, id) = filtered_join(kind, &left, &right, skip_left, skip_right);
        let expected = join_rows_model(
            kind,
            &without_payload(&left, skip_left),
            &without_payload(&right, skip_right),
            2,
            2,
        );
        let actual = collect(&ctx, id);
        if kind == JoinKind::Full {
            prop_assert_eq!(sorted(actual), sorted(expected));
        } else {
            prop_assert_eq!(actual, expected);
        }
        assert_reversible(&ctx, id);
    }

    #[test]
    fn cross_and_lookup_joins_turn_around_anywhere(
        determined in prop_oneof![Just(JoinSide::Left), Just(JoinSide::Right)],
        left in arb_keys(),
        mut right in arb_keys(),
    ) {
        let mut arena = RowSetArena::new();
        let l = arena.add_source(table("l", &["l.k", "l.i"], &["l.k"], rows(&left))).unwrap();
        let r = arena.add_source(table("r", &["r.k", "r.i"], &["r.k"], rows(&right))).unwrap();
        let cross = arena.add_join(JoinDescriptor::cross(), l, r).unwrap();
        let ctx = ExecutionContext::new(Arc::new(arena));
        prop_assert_eq!(collect(&ctx, cross).len(), left.len() * right.len());
        assert_reversible(&ctx, cross);

        right.dedup();
        let (lookup_left, lookup_right) = match determined {
            JoinSide::Right => (&left, &right),
            JoinSide::Left => (&right, &left),
        };
        let (ctx, id) = join(JoinDescriptor::functional(determined), lookup_left, lookup_right);
        assert_reversible(&ctx, id);
        assert_zigzag(&ctx, id);
    }

    #[test]
    fn functional_dependency_matches_inner(left in arb_keys(), mut right in arb_keys()) {
        right.dedup();
        let (fd, fd_id) = join(JoinDescriptor::functional(JoinSide::Right), &left, &right);
        let (inner, inner_id) = join(JoinDescriptor::inner(), &left, &right);
        prop_assert_eq!(collect(&fd, fd_id), collect(&inner, inner_id));
        prop_assert_eq!(collect_backward(&fd, fd_id), collect_backward(&inner, inner_id));
    }

    #[test]
    fn set_operations_match_counting((kind, distinct) in arb_set_op(), a in arb_keys(), b in arb_keys()) {
        let (arena, id) = merge(SetOpDescriptor::new(kind, distinct), &a, &b);
        let ctx = ExecutionContext::new(Arc::new(arena));
        prop_assert_eq!(collect(&ctx, id), set_model(kind, distinct, &a, &b));
        assert_reversible(&ctx, id);
    }

    #[test]
    fn nested_set_operations_match_counting(
        (kind, distinct) in arb_set_op(),
        (nested, nested_distinct) in arb_set_op(),
        a in arb_keys(),
        b in arb_keys(),
        c in arb_keys(),
    ) {
        let mut arena = RowSetArena::new();
        let x = arena.add_source(keys("a", "a.k", &a)).unwrap();
        let y = arena.add_source(keys("b", "b.k", &b)).unwrap();
        let z = arena.add_source(keys("c", "c.k", &c)).unwrap();
        let yz = arena.add_merge(SetOpDescriptor::new(nested, nested_distinct), y, z).unwrap();
        let id = arena.add_merge(SetOpDescriptor::new(kind, distinct), x, yz).unwrap();
        let ctx = ExecutionContext::new(Arc::new(arena));

        let inner = set_keys(nested, nested_distinct, &b, &c);
        prop_assert_eq!(collect(&ctx, id), set_model(kind, distinct, &a, &inner));
        assert_reversible(&ctx, id);
        assert_zigzag(&ctx, id);
    }

    #[test]
    fn set_operations_over_filtered_sources_match_counting(
        (kind, distinct) in arb_set_op(),
        a in arb_keys(),
        b in arb_keys(),
        skip in 0i64..4,
    ) {
        let mut arena = RowSetArena::new();
        let x = arena.add_source(keys("a", "a.k", &a)).unwrap();
        let y = arena
            .add_filtered_source(
                keys("b", "b.k", &b),
                Operand::column("b.k").not_eq(Operand::literal(skip)).into_predicate(),
            )
            .unwrap();
        let id = arena.add_merge(SetOpDescriptor::new(kind, distinct), x, y).unwrap();
        let ctx = ExecutionContext::new(Arc::new(arena));

        let kept: Vec<i64> = b.iter().copied().filter(|v| *v != skip).collect();
        prop_assert_eq!(collect(&ctx, id), set_model(kind, distinct, &a, &kept));
        assert_reversible(&ctx, id);
    }

    #[test]
    fn materialized_matches_streaming(
        kind in prop_oneof![Just(SetOpKind::Intersect), Just(SetOpKind::Except)],
        distinct in any::<bool>(),
        a in arb_keys(),
        b in arb_keys(),
    ) {
        let (mut arena, id) = merge(SetOpDescriptor::new(kind, distinct), &a, &b);
        let built = arena.materialize(id, &ExecutionConfig::new()).unwrap();
        let ctx = ExecutionContext::new(Arc::new(arena));
        prop_assert_eq!(collect(&ctx, built), collect(&ctx, id));
        prop_assert_eq!(collect_backward(&ctx, built), collect_backward(&ctx, id));
    }
}
