//! Graphviz export of a task graph.

use std::fmt::Write;

use super::TaskGraph;

impl TaskGraph {
    /// Render the graph in Graphviz DOT format.
    ///
    /// Nodes are labelled with their priority once built; edges follow the
    /// registered successor edges. Input bindings are drawn as dashed edges
    /// from the producing node.
    pub fn to_dot(&self) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail.
        let _ = self.write_dot(&mut out);
        out
    }

    fn write_dot(&self, w: &mut impl Write) -> std::fmt::Result {
        writeln!(w, "digraph tasks {{")?;
        writeln!(
            w,
            r#"node[shape=box; fontname="Helvetica,Arial,sans-serif"];"#
        )?;

        for (index, node) in self.nodes().iter().enumerate() {
            match node.priority() {
                Some(priority) => writeln!(
                    w,
                    r#"n{index}[label="{}\n#{priority}"];"#,
                    escape(node.name())
                )?,
                None => writeln!(w, r#"n{index}[label="{}"];"#, escape(node.name()))?,
            }
        }

        for (index, node) in self.nodes().iter().enumerate() {
            for succ in node.successors() {
                writeln!(w, "n{index} -> n{};", succ.index())?;
            }
        }

        for (consumer, node) in self.nodes().iter().enumerate() {
            let mut bindings: Vec<_> = node.bindings().iter().collect();
            bindings.sort();
            for (local, output) in bindings {
                let producers = self
                    .nodes()
                    .iter()
                    .enumerate()
                    .filter(|(_, n)| n.outputs().iter().any(|o| o == output));
                for (producer, _) in producers {
                    writeln!(
                        w,
                        r#"n{producer} -> n{consumer}[style=dashed; label="{}"];"#,
                        escape(local)
                    )?;
                }
            }
        }

        writeln!(w, "}}")
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
