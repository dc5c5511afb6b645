//! JSON export of a checked network.
//!
//! A report bundles the network name, the run status and the graph (the
//! cleaned copy when `output_cleaned` is set), so downstream tools get the
//! verdict and the minimized constraints in one document.
//!
//! ```text
//! Cstn / Cstnu ──► CheckReport::from_cstn() / from_cstnu() ──► to_json() / write_json()
//!                                                                    │
//! read_report() / read_graph() ◄─────────────────────────────────────┘
//! ```

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::cstn::Cstn;
use crate::cstnu::Cstnu;
use crate::graph::TNGraph;
use crate::status::CheckStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReport {
    pub network: String,
    pub status: CheckStatus,
    pub graph: TNGraph,
}

impl CheckReport {
    pub fn new(status: CheckStatus, graph: TNGraph) -> Self {
        Self { network: graph.name().to_string(), status, graph }
    }

    /// Report for a CSTN checker, honouring `output_cleaned`.
    pub fn from_cstn(checker: &Cstn) -> Self {
        let graph = if checker.config().output_cleaned {
            checker.cleaned_graph()
        } else {
            checker.graph().clone()
        };
        Self::new(checker.status().clone(), graph)
    }

    /// Report for a CSTNU checker, honouring `output_cleaned`.
    pub fn from_cstnu(checker: &Cstnu) -> Self {
        let graph = if checker.config().output_cleaned {
            checker.cleaned_graph()
        } else {
            checker.graph().clone()
        };
        Self::new(checker.status().clone(), graph)
    }
}

pub fn to_json(report: &CheckReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

pub fn write_json(writer: &mut dyn Write, report: &CheckReport) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, report)?;
    writeln!(writer)?;
    Ok(())
}

pub fn read_report(reader: impl Read) -> Result<CheckReport> {
    Ok(serde_json::from_reader(reader)?)
}

/// Load a bare graph (no status).
pub fn read_graph(reader: impl Read) -> Result<TNGraph> {
    Ok(serde_json::from_reader(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CheckConfig;
    use crate::model::Label;

    #[test]
    fn test_report_carries_verdict_and_graph() {
        let mut g = TNGraph::new("pair");
        let z = g.add_node("Z", Label::EMPTY).unwrap();
        let x = g.add_node("X", Label::EMPTY).unwrap();
        g.set_z(z);
        g.merge_value(x, z, Label::EMPTY, -3);
        let mut cstn = Cstn::new(g, CheckConfig::default().with_output_cleaned(true));
        cstn.check().unwrap();

        let report = CheckReport::from_cstn(&cstn);
        let mut buf = Vec::new();
        write_json(&mut buf, &report).unwrap();
        let back = read_report(buf.as_slice()).unwrap();
        assert_eq!(back.network, "pair");
        assert!(back.status.consistency);
        assert_eq!(back.graph.edge_between(x, z).unwrap().values.get(&Label::EMPTY), Some(-3));
        assert!(back.graph.edge_between(z, x).is_none());
    }
}
