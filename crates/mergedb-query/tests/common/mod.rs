//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use mergedb_core::Value;
use mergedb_query::exec::{
    Cursor, Direction, ExecutionContext, Executor, MemoryRowSource, RowSetId, RowSource,
};

pub fn int(v: i64) -> Value {
    Value::Int(v)
}

pub fn text(v: &str) -> Value {
    Value::from(v)
}

/// Builds a sorted in-memory source.
pub fn table(
    name: &str,
    columns: &[&str],
    ordering: &[&str],
    rows: Vec<Vec<Value>>,
) -> Arc<dyn RowSource> {
    Arc::new(MemoryRowSource::from_values(name, columns, ordering, rows).unwrap())
}

/// A single-column source of integers ordered on that column.
pub fn keys(name: &str, column: &str, values: &[i64]) -> Arc<dyn RowSource> {
    table(name, &[column], &[column], values.iter().map(|v| vec![int(*v)]).collect())
}

pub fn collect(ctx: &ExecutionContext, id: RowSetId) -> Vec<Vec<Value>> {
    Executor::new(ctx).collect(id).unwrap().to_values()
}

pub fn collect_backward(ctx: &ExecutionContext, id: RowSetId) -> Vec<Vec<Value>> {
    Executor::new(ctx).collect_backward(id).unwrap().to_values()
}

/// Walks `dir` from the first row in that direction, collecting values.
pub fn walk(ctx: &ExecutionContext, id: RowSetId, dir: Direction) -> Vec<Vec<Value>> {
    match dir {
        Direction::Forward => collect(ctx, id),
        Direction::Backward => collect_backward(ctx, id),
    }
}

/// Checks that the row set reads the same in both directions and that a
/// traversal can turn around at every row, whichever end it started from.
pub fn assert_reversible(ctx: &ExecutionContext, id: RowSetId) {
    let forward = collect(ctx, id);
    let mut backward = collect_backward(ctx, id);
    backward.reverse();
    assert_eq!(forward, backward, "backward traversal is not the reverse of forward");

    let len = forward.len();
    for stop in 0..len {
        let cursor = ctx.first(id).unwrap().unwrap();
        let cursor = steps(ctx, cursor, stop, Direction::Forward);
        assert_eq!(cursor.row().values(), forward[stop].as_slice());
        let seen = rest(ctx, &cursor, Direction::Backward);
        let expected: Vec<_> = forward[..stop].iter().rev().cloned().collect();
        assert_eq!(seen, expected, "turning back after row {stop}");

        let cursor = ctx.last(id).unwrap().unwrap();
        let cursor = steps(ctx, cursor, stop, Direction::Backward);
        let at = len - 1 - stop;
        assert_eq!(cursor.row().values(), forward[at].as_slice());
        let seen = rest(ctx, &cursor, Direction::Forward);
        assert_eq!(seen, forward[at + 1..].to_vec(), "turning forward after {stop} rows from the end");
    }
}

/// Walks forward through the row set, stepping back and forth at every row.
pub fn assert_zigzag(ctx: &ExecutionContext, id: RowSetId) {
    let forward = collect(ctx, id);
    let Some(mut cursor) = ctx.first(id).unwrap() else {
        assert!(forward.is_empty());
        return;
    };
    for (i, expected) in forward.iter().enumerate() {
        assert_eq!(cursor.row().values(), expected.as_slice(), "row {i}");
        if let Some(back) = cursor.previous(ctx).unwrap() {
            assert!(i > 0, "row before the first row");
            assert_eq!(back.row().values(), forward[i - 1].as_slice(), "back from row {i}");
            let again = back.next(ctx).unwrap().unwrap();
            assert_eq!(again.row().values(), expected.as_slice(), "forward again to row {i}");
        }
        match cursor.next(ctx).unwrap() {
            Some(next) => cursor = next,
            None => assert_eq!(i + 1, forward.len()),
        }
    }
}

fn steps(ctx: &ExecutionContext, mut cursor: Cursor, count: usize, dir: Direction) -> Cursor {
    for _ in 0..count {
        cursor = cursor.advance(ctx, dir).unwrap().unwrap();
    }
    cursor
}

/// Collects the rows after `cursor` in `dir`.
fn rest(ctx: &ExecutionContext, cursor: &Cursor, dir: Direction) -> Vec<Vec<Value>> {
    let mut seen = Vec::new();
    let mut next = cursor.advance(ctx, dir).unwrap();
    while let Some(c) = next {
        seen.push(c.row().values().to_vec());
        next = c.advance(ctx, dir).unwrap();
    }
    seen
}
