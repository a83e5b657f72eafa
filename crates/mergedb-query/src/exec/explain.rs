//! Tree-style description of the algorithms a row set runs.

use std::fmt;

use super::arena::{RowSetArena, RowSetId, RowSetNode};
use crate::plan::JoinKind;

/// Helper for tree-style row set display.
///
/// Created by [`RowSetArena::strategy`].
pub struct Strategy<'a> {
    arena: &'a RowSetArena,
    root: RowSetId,
}

impl<'a> Strategy<'a> {
    pub(crate) const fn new(arena: &'a RowSetArena, root: RowSetId) -> Self {
        Self { arena, root }
    }
}

impl fmt::Display for Strategy<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_node(f, self.root, "", true)
    }
}

impl Strategy<'_> {
    fn fmt_node(
        &self,
        f: &mut fmt::Formatter<'_>,
        id: RowSetId,
        prefix: &str,
        is_last: bool,
    ) -> fmt::Result {
        let connector = if is_last { "└── " } else { "├── " };
        write!(f, "{prefix}{connector}")?;

        let Ok(node) = self.arena.node(id) else {
            return writeln!(f, "<missing {id}>");
        };
        fmt_node_content(f, node)?;
        writeln!(f)?;

        let children = node.children();
        let new_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        for (i, child) in children.iter().enumerate() {
            self.fmt_node(f, *child, &new_prefix, i == children.len() - 1)?;
        }
        Ok(())
    }
}

fn fmt_node_content(f: &mut fmt::Formatter<'_>, node: &RowSetNode) -> fmt::Result {
    match node {
        RowSetNode::Source(scan) => {
            write!(f, "Source {}", scan.source().name())?;
            let ordering = node.ordering();
            if !ordering.is_empty() {
                write!(f, " ORDER BY {}", ordering.join(", "))?;
            }
        }
        RowSetNode::Join(join) => {
            write!(f, "Join {}", join.kind())?;
            if join.kind() == JoinKind::FunctionalDependency {
                if let Some(side) = join.determined() {
                    write!(f, " lookup {side}")?;
                }
            }
            if !join.condition().is_empty() {
                write!(f, " ON {}", join.condition())?;
            }
        }
        RowSetNode::Merge(merge) => {
            write!(f, "Merge {}", merge.descriptor())?;
            if let Some(rows) = merge.built_len() {
                write!(f, " (built: {rows} rows)")?;
            }
        }
    }
    if let Some(predicate) = node.base().predicate() {
        write!(f, " [filter: {predicate}]")?;
    }
    write!(f, " {}", node.id())
}
