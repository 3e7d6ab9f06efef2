//! Relays consumer-authored content into a component's template.

use crate::host::{NodeId, ScopeRef, Unbind};
use crate::runtime::Runtime;

/// Moves the children of a component placeholder to where the component's
/// template asks for them, bound to the scope that declared the component
/// rather than the component itself.
pub struct TranscludeBinding {
    runtime: Runtime,
    nodes: Vec<NodeId>,
    unbinds: Vec<Unbind>,
}

impl TranscludeBinding {
    /// Replace `element` with the children of `placeholder` and bind each
    /// of them against `outer`.
    pub fn init(runtime: &Runtime, element: NodeId, outer: &ScopeRef, placeholder: NodeId) -> Self {
        let dom = runtime.dom();
        let nodes = dom.child_nodes(placeholder);
        let fragment = dom.create_fragment();

        for &node in &nodes {
            dom.append_child(fragment, node);
        }
        dom.replace(fragment, element);

        let compiler = runtime.compiler();
        let unbinds = nodes
            .iter()
            .map(|&node| (compiler.compile(node))(outer, node))
            .collect();

        Self {
            runtime: runtime.clone(),
            nodes,
            unbinds,
        }
    }

    /// The relocated nodes, in document order.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Unbind and detach every relocated node. Later calls do nothing.
    pub fn release(&mut self) {
        for unbind in self.unbinds.drain(..) {
            unbind();
        }

        let dom = self.runtime.dom();
        for node in self.nodes.drain(..) {
            dom.remove(node);
        }
    }
}
