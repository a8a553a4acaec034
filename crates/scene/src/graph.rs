use deferlight_common::Material;
use glam::Mat4;
use serde::{Deserialize, Serialize};

use crate::error::SceneError;
use crate::light::LightList;
use crate::mesh::MeshHandle;

/// Index of a node in the scene arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// One node of the hierarchy.
///
/// `visible` is a layer toggle: it hides this node's own mesh but never
/// stops traversal into its children.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub mesh: Option<MeshHandle>,
    pub material: Material,
    pub children: Vec<(NodeId, Mat4)>,
    pub visible: bool,
    /// Externally driven animation, identity unless set.
    pub animation: Mat4,
}

impl SceneNode {
    /// Node that draws `mesh` with `material`.
    pub fn mesh(mesh: MeshHandle, material: Material) -> Self {
        Self {
            mesh: Some(mesh),
            material,
            ..Self::group()
        }
    }

    /// Pure grouping node: recurses but draws nothing itself.
    pub fn group() -> Self {
        Self {
            mesh: None,
            material: Material::default(),
            children: Vec::new(),
            visible: true,
            animation: Mat4::IDENTITY,
        }
    }
}

/// Receives the per-node draws of a traversal. Implemented by whatever
/// wraps the bound program: it uploads the world transform and material,
/// then issues the draw.
pub trait DrawSink {
    fn draw(&mut self, world: &Mat4, mesh: &MeshHandle, material: &Material);
}

/// Arena-backed scene hierarchy plus the ordered light list.
#[derive(Debug, Clone, Default)]
pub struct SceneGraph {
    nodes: Vec<SceneNode>,
    parents: Vec<Option<NodeId>>,
    roots: Vec<(NodeId, Mat4)>,
    lights: LightList,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Move a node into the arena. It is unattached until passed to
    /// [`add`](Self::add) or [`add_root`](Self::add_root).
    pub fn create_node(&mut self, node: SceneNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        self.parents.push(None);
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id.index())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id.index())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents.get(id.index()).copied().flatten()
    }

    pub fn roots(&self) -> &[(NodeId, Mat4)] {
        &self.roots
    }

    pub fn lights(&self) -> &LightList {
        &self.lights
    }

    pub fn lights_mut(&mut self) -> &mut LightList {
        &mut self.lights
    }

    /// Register `node` as a root placed at `local`.
    pub fn add_root(&mut self, node: NodeId, local: Mat4) -> Result<(), SceneError> {
        self.check(node)?;
        if self.is_attached(node) {
            return Err(SceneError::AlreadyParented(node));
        }
        self.roots.push((node, local));
        Ok(())
    }

    /// Append `child` to `parent` with its placement `local`.
    pub fn add(&mut self, parent: NodeId, child: NodeId, local: Mat4) -> Result<(), SceneError> {
        self.check(parent)?;
        self.check(child)?;
        if self.is_attached(child) {
            return Err(SceneError::AlreadyParented(child));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(SceneError::Cycle { parent, child });
        }
        self.parents[child.index()] = Some(parent);
        self.nodes[parent.index()].children.push((child, local));
        Ok(())
    }

    pub fn set_visible(&mut self, id: NodeId, visible: bool) -> Result<(), SceneError> {
        self.node_mut(id)
            .ok_or(SceneError::NodeNotFound(id))?
            .visible = visible;
        Ok(())
    }

    /// Apply a visibility toggle to `id` and every descendant.
    pub fn set_subtree_visible(&mut self, id: NodeId, visible: bool) -> Result<(), SceneError> {
        self.check(id)?;
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            let node = &mut self.nodes[n.index()];
            node.visible = visible;
            stack.extend(node.children.iter().map(|(c, _)| *c));
        }
        Ok(())
    }

    pub fn set_animation(&mut self, id: NodeId, animation: Mat4) -> Result<(), SceneError> {
        self.node_mut(id)
            .ok_or(SceneError::NodeNotFound(id))?
            .animation = animation;
        Ok(())
    }

    /// Traverse every root pre-order, depth-first, children in insertion
    /// order, sending each visible mesh node to `sink` with its world
    /// transform.
    pub fn draw(&self, sink: &mut dyn DrawSink, accumulated: Mat4) {
        for (root, local) in &self.roots {
            self.draw_node(*root, accumulated * *local, sink);
        }
    }

    fn draw_node(&self, id: NodeId, accumulated: Mat4, sink: &mut dyn DrawSink) {
        let node = &self.nodes[id.index()];
        let world = accumulated * node.animation;
        if let (Some(mesh), true) = (&node.mesh, node.visible) {
            sink.draw(&world, mesh, &node.material);
        }
        for (child, local) in &node.children {
            self.draw_node(*child, world * *local, sink);
        }
    }

    /// Every reachable node with its world transform, in traversal order,
    /// regardless of mesh or visibility.
    pub fn world_transforms(&self, accumulated: Mat4) -> Vec<(NodeId, Mat4)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(NodeId, Mat4)> = self
            .roots
            .iter()
            .rev()
            .map(|(id, local)| (*id, accumulated * *local))
            .collect();
        while let Some((id, acc)) = stack.pop() {
            let node = &self.nodes[id.index()];
            let world = acc * node.animation;
            out.push((id, world));
            for (child, local) in node.children.iter().rev() {
                stack.push((*child, world * *local));
            }
        }
        out
    }

    fn check(&self, id: NodeId) -> Result<(), SceneError> {
        if id.index() < self.nodes.len() {
            Ok(())
        } else {
            Err(SceneError::NodeNotFound(id))
        }
    }

    fn is_attached(&self, id: NodeId) -> bool {
        self.parents[id.index()].is_some() || self.roots.iter().any(|(r, _)| *r == id)
    }

    fn is_ancestor_or_self(&self, candidate: NodeId, of: NodeId) -> bool {
        let mut cursor = Some(of);
        while let Some(n) = cursor {
            if n == candidate {
                return true;
            }
            cursor = self.parents[n.index()];
        }
        false
    }
}
