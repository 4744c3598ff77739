use crate::parser::manifest::Manifest;
use petgraph::graph::{NodeIndex, UnGraph};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A service as seen by the reachability graph.
#[derive(Debug, Clone)]
pub struct ServiceNode {
    pub name: String,
    pub networks: Vec<String>,
    pub published_ports: Vec<String>,
}

/// Undirected service reachability graph.
///
/// Two services are connected iff their declared network memberships
/// intersect. Whether a network is `internal` plays no part: internal
/// networks still carry traffic between their members.
#[derive(Debug, Clone)]
pub struct TopologyGraph {
    pub graph: UnGraph<ServiceNode, Vec<String>>,
    pub node_map: HashMap<String, NodeIndex>,
}

impl TopologyGraph {
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let mut graph: UnGraph<ServiceNode, Vec<String>> = UnGraph::new_undirected();
        let mut node_map = HashMap::new();

        for service in &manifest.services {
            let idx = graph.add_node(ServiceNode {
                name: service.name.clone(),
                networks: service.networks.clone(),
                published_ports: service.ports.clone(),
            });
            node_map.insert(service.name.clone(), idx);
        }

        let indices: Vec<NodeIndex> = graph.node_indices().collect();
        for (i, &a) in indices.iter().enumerate() {
            for &b in &indices[i + 1..] {
                let shared: Vec<String> = graph[a]
                    .networks
                    .iter()
                    .filter(|n| graph[b].networks.contains(*n))
                    .cloned()
                    .collect();
                if !shared.is_empty() {
                    graph.add_edge(a, b, shared);
                }
            }
        }

        Self { graph, node_map }
    }

    /// Services reachable in one hop, in manifest order.
    pub fn can_reach(&self, service: &str) -> Vec<String> {
        let Some(&idx) = self.node_map.get(service) else {
            return Vec::new();
        };
        let mut neighbors: Vec<NodeIndex> = self.graph.neighbors(idx).collect();
        neighbors.sort();
        neighbors.dedup();
        neighbors.into_iter().map(|n| self.graph[n].name.clone()).collect()
    }

    /// Networks two services have in common, if they are connected.
    pub fn shared_networks(&self, a: &str, b: &str) -> Option<&[String]> {
        let a = *self.node_map.get(a)?;
        let b = *self.node_map.get(b)?;
        let edge = self.graph.find_edge(a, b)?;
        Some(self.graph[edge].as_slice())
    }

    /// Services that publish at least one port to the host.
    pub fn external_access_points(&self) -> Vec<String> {
        self.graph
            .node_weights()
            .filter(|node| !node.published_ports.is_empty())
            .map(|node| node.name.clone())
            .collect()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Serializable snapshot for reports.
    pub fn to_view(&self) -> Topology {
        let nodes = self
            .graph
            .node_indices()
            .map(|idx| {
                let node = &self.graph[idx];
                TopologyNode {
                    name: node.name.clone(),
                    networks: node.networks.clone(),
                    can_reach: self.can_reach(&node.name),
                    external: !node.published_ports.is_empty(),
                }
            })
            .collect();

        let edges = self
            .graph
            .edge_indices()
            .filter_map(|edge| {
                let (a, b) = self.graph.edge_endpoints(edge)?;
                Some(TopologyEdge {
                    from: self.graph[a].name.clone(),
                    to: self.graph[b].name.clone(),
                    networks: self.graph[edge].clone(),
                })
            })
            .collect();

        Topology {
            nodes,
            edges,
            external_access_points: self.external_access_points(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyNode {
    pub name: String,
    pub networks: Vec<String>,
    pub can_reach: Vec<String>,
    pub external: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyEdge {
    pub from: String,
    pub to: String,
    pub networks: Vec<String>,
}

/// Reachability between services, as attached to a report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub nodes: Vec<TopologyNode>,
    pub edges: Vec<TopologyEdge>,
    pub external_access_points: Vec<String>,
}

impl Topology {
    pub fn node(&self, name: &str) -> Option<&TopologyNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Mermaid flowchart: edges labeled with shared networks, services that
    /// publish ports highlighted.
    pub fn to_mermaid(&self) -> String {
        let mut lines = vec!["graph LR".to_string()];

        for node in &self.nodes {
            lines.push(format!("    {}[\"{}\"]", mermaid_id(&node.name), node.name));
        }
        for edge in &self.edges {
            lines.push(format!(
                "    {} ---|{}| {}",
                mermaid_id(&edge.from),
                edge.networks.join(", "),
                mermaid_id(&edge.to)
            ));
        }
        if !self.external_access_points.is_empty() {
            let ids: Vec<String> = self.external_access_points.iter().map(|n| mermaid_id(n)).collect();
            lines.push(format!("    style {} fill:#ef4444,color:#fff", ids.join(",")));
        }

        lines.join("\n")
    }
}

fn mermaid_id(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::compose::ComposeParser;

    fn three_tier() -> Manifest {
        ComposeParser::parse(
            r#"
services:
  a:
    networks: [web]
    ports: ["80:80"]
  b:
    networks: [web, data]
  c:
    networks: [data]
networks:
  web:
  data:
    internal: true
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_reachability_through_shared_networks() {
        let topo = TopologyGraph::from_manifest(&three_tier());
        assert_eq!(topo.can_reach("a"), vec!["b"]);
        assert_eq!(topo.can_reach("c"), vec!["b"]);
        assert_eq!(topo.can_reach("b"), vec!["a", "c"]);
        assert_eq!(topo.edge_count(), 2);
    }

    #[test]
    fn test_internal_networks_still_connect() {
        let topo = TopologyGraph::from_manifest(&three_tier());
        assert_eq!(topo.shared_networks("b", "c"), Some(&["data".to_string()][..]));
        assert_eq!(topo.shared_networks("a", "c"), None);
    }

    #[test]
    fn test_external_access_points() {
        let topo = TopologyGraph::from_manifest(&three_tier());
        assert_eq!(topo.external_access_points(), vec!["a"]);
        let view = topo.to_view();
        assert!(view.node("a").unwrap().external);
        assert!(!view.node("b").unwrap().external);
    }

    #[test]
    fn test_services_without_networks_are_unconnected() {
        let manifest = ComposeParser::parse(
            "services:\n  x:\n    image: a\n  y:\n    networks: []\n  z:\n    network_mode: host\n",
        )
        .unwrap();
        let topo = TopologyGraph::from_manifest(&manifest);
        assert_eq!(topo.edge_count(), 0);
        assert!(topo.can_reach("x").is_empty());
        assert!(topo.can_reach("y").is_empty());
        assert!(topo.can_reach("z").is_empty());
        assert!(topo.can_reach("missing").is_empty());
    }

    #[test]
    fn test_mermaid_output() {
        let mermaid = TopologyGraph::from_manifest(&three_tier()).to_view().to_mermaid();
        assert!(mermaid.starts_with("graph LR"));
        assert!(mermaid.contains("a ---|web| b"));
        assert!(mermaid.contains("b ---|data| c"));
        assert!(mermaid.contains("style a fill"));
    }
}
