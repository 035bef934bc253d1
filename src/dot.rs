//! DOT emission for graph visualization.

use std::io::{self, Write};

use crate::field::FieldShape;
use crate::graph::Graph;

impl Graph {
    /// Emit the graph in DOT format: one dotted cluster per domain, one
    /// node per field (computed fields as boxes), one edge per dependency
    /// from dependency to computed field.
    pub fn to_dot<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let domains = self.core().domains();

        writeln!(out, "digraph {{")?;
        for domain in &domains {
            writeln!(out, "  subgraph cluster_{} {{", domain.domain_name())?;
            writeln!(out, "    label={};", domain.domain_name())?;
            writeln!(out, "    graph [style=dotted];")?;
            for field in domain.erased_fields() {
                write!(out, "    \"{}\"", field.field_name())?;
                if field.shape() == FieldShape::Computed {
                    write!(out, " [shape=box]")?;
                }
                writeln!(out, ";")?;
            }
            writeln!(out, "  }}")?;
        }
        for domain in &domains {
            for field in domain.erased_fields() {
                for dependency in field.dependency_fields() {
                    writeln!(
                        out,
                        "  \"{}\" -> \"{}\";",
                        dependency.field_name(),
                        field.field_name()
                    )?;
                }
            }
        }
        writeln!(out, "}}")
    }
}
