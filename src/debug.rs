extern crate std;

use std::{collections::VecDeque, fmt, prelude::v1::*};

use crate::{AvlTree, Links, NodeRef, TreeNode};

impl<T> AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
    T::Key: fmt::Display,
{
    /// Writes a Graphviz digraph of the tree to `w`, one row per rank level.
    ///
    /// Each node is labelled `key:height/size`; missing children are drawn as points.
    pub fn dotgraph<W>(&self, name: &str, mut w: W) -> fmt::Result
    where
        W: fmt::Write,
    {
        let Some(root) = self.root() else {
            return write!(w, "digraph \"graph-{name}\" {{}}");
        };

        enum Item<'tree, T: TreeNode<Links<T>> + ?Sized> {
            Node(NodeRef<'tree, T>),
            Missing(u32),
        }

        let mut queue = VecDeque::new();
        queue.push_back(Item::Node(root));

        write!(
            w,
            "digraph \"graph-{name}\" {{\n subgraph \"subgraph-{name}\" {{"
        )?;

        let mut missing = 0;
        let mut edges = String::new();

        while !queue.is_empty() {
            use fmt::Write;

            write!(w, "{{rank=same; ")?;

            for _ in 0..queue.len() {
                let node = match queue.pop_front() {
                    Some(Item::Node(node)) => node,
                    Some(Item::Missing(id)) => {
                        write!(w, "\"graph{name}-missing{id}\" [shape=point]; ")?;
                        continue;
                    }
                    None => break,
                };

                let key = node.key();
                write!(
                    w,
                    "\"graph{name}-{key}\" [label=\"{key}:{}/{}\"]; ",
                    node.height(),
                    node.size()
                )?;

                for child in [node.left(), node.right()] {
                    match child {
                        Some(child) => {
                            writeln!(
                                edges,
                                "\"graph{name}-{key}\" -> \"graph{name}-{}\";",
                                child.key()
                            )?;
                            queue.push_back(Item::Node(child));
                        }
                        None => {
                            writeln!(
                                edges,
                                "\"graph{name}-{key}\" -> \"graph{name}-missing{missing}\";"
                            )?;
                            queue.push_back(Item::Missing(missing));
                            missing += 1;
                        }
                    }
                }
            }

            writeln!(w, "}}")?;
        }

        w.write_str(&edges)?;

        w.write_str(" }\n}")
    }
}

#[cfg(test)]
mod tests {
    use crate::AvlMap;

    #[test]
    fn empty_graph() {
        let map: AvlMap<()> = AvlMap::new();
        let mut out = String::new();

        map.dotgraph("empty", &mut out).unwrap();
        assert_eq!(out, "digraph \"graph-empty\" {}");
    }

    #[test]
    fn labels_and_edges() {
        let map: AvlMap<()> = [(2, ()), (1, ()), (3, ())].into_iter().collect();
        let mut out = String::new();

        map.dotgraph("t", &mut out).unwrap();

        assert!(out.contains("\"grapht-2\" [label=\"2:1/3\"];"));
        assert!(out.contains("\"grapht-1\" [label=\"1:0/1\"];"));
        assert!(out.contains("\"grapht-2\" -> \"grapht-1\";"));
        assert!(out.contains("\"grapht-2\" -> \"grapht-3\";"));
        assert!(out.contains("\"grapht-3\" -> \"grapht-missing3\";"));
        assert!(out.ends_with(" }\n}"));
    }
}
