//! Scene graph and hierarchical scene organization.
//!
//! A [`Scene`] is the root ownership container of [`Node`]s. Every node is
//! owned by exactly one parent (another node or the scene itself); removing a
//! node hands ownership back to the caller and the scene keeps no reference.
//! Background, fog and the environment map are scene-level state, not
//! per-node properties; so is ambient light.

use std::sync::Arc;

use log::warn;

use crate::data_structures::{
    color::Color,
    mesh::{EnvironmentMap, Light, Mapping, Mesh},
    transform::Transform,
};

/// Scene-assigned node identity. Nodes that were never added to a scene have
/// id `0`.
pub type NodeId = u32;

#[derive(Clone, Debug)]
pub enum NodeKind {
    Group,
    Mesh(Mesh),
    Light(Light),
}

#[derive(Clone, Debug)]
pub struct Node {
    id: NodeId,
    pub name: Option<String>,
    pub transform: Transform,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
    pub kind: NodeKind,
    children: Vec<Node>,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            id: 0,
            name: None,
            transform: Transform::new(),
            cast_shadow: false,
            receive_shadow: false,
            kind,
            children: Vec::new(),
        }
    }

    pub fn group() -> Self {
        Self::new(NodeKind::Group)
    }

    pub fn mesh(mesh: Mesh) -> Self {
        Self::new(NodeKind::Mesh(mesh))
    }

    pub fn light(light: Light) -> Self {
        Self::new(NodeKind::Light(light))
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn is_mesh(&self) -> bool {
        matches!(self.kind, NodeKind::Mesh(_))
    }

    pub fn is_light(&self) -> bool {
        matches!(self.kind, NodeKind::Light(_))
    }

    pub fn add_child(&mut self, child: Node) {
        self.children.push(child);
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut Vec<Node> {
        &mut self.children
    }

    /// Number of nodes in this subtree, `self` included.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(Node::subtree_len).sum::<usize>()
    }

    /// Pre-order walk of this subtree, children in insertion order.
    pub fn traverse(&mut self, visitor: &mut dyn FnMut(&mut Node)) {
        visitor(self);
        for child in self.children.iter_mut() {
            child.traverse(visitor);
        }
    }

    pub fn traverse_ref(&self, visitor: &mut dyn FnMut(&Node)) {
        visitor(self);
        for child in &self.children {
            child.traverse_ref(visitor);
        }
    }

    fn visit_world(&self, parent: &Transform, visitor: &mut dyn FnMut(&Node, &Transform)) {
        let world = parent * &self.transform;
        visitor(self, &world);
        for child in &self.children {
            child.visit_world(&world, visitor);
        }
    }

    fn assign_ids(&mut self, next_id: &mut NodeId) {
        self.traverse(&mut |node| {
            if node.id != 0 {
                warn!("node {} is being added a second time and gets a new id", node.id);
            }
            node.id = *next_id;
            *next_id += 1;
        });
    }

    fn find(&self, id: NodeId) -> Option<&Node> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    fn find_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|child| child.find_mut(id))
    }

    fn take_descendant(&mut self, id: NodeId) -> Option<Node> {
        if let Some(idx) = self.children.iter().position(|child| child.id == id) {
            return Some(self.children.remove(idx));
        }
        self.children
            .iter_mut()
            .find_map(|child| child.take_descendant(id))
    }
}

/// Uniform light applied to every surface regardless of position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AmbientLight {
    pub color: Color,
    pub intensity: f32,
}

/// Linear distance fog.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fog {
    pub color: Color,
    pub near: f32,
    pub far: f32,
}

#[derive(Clone, Debug)]
pub struct SceneEnvironment {
    pub background: Color,
    pub ambient: Option<AmbientLight>,
    pub fog: Option<Fog>,
    reflection: Option<Arc<EnvironmentMap>>,
}

impl Default for SceneEnvironment {
    fn default() -> Self {
        Self {
            background: Color::BLACK,
            ambient: None,
            fog: None,
            reflection: None,
        }
    }
}

impl SceneEnvironment {
    pub fn reflection(&self) -> Option<&Arc<EnvironmentMap>> {
        self.reflection.as_ref()
    }
}

#[derive(Debug)]
pub struct Scene {
    roots: Vec<Node>,
    environment: SceneEnvironment,
    next_id: NodeId,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            roots: Vec::new(),
            environment: SceneEnvironment::default(),
            next_id: 1,
        }
    }

    /// Takes ownership of `node` and its subtree. Returns the id of `node`;
    /// descendants get ids too.
    pub fn add_node(&mut self, mut node: Node) -> NodeId {
        node.assign_ids(&mut self.next_id);
        let id = node.id;
        self.roots.push(node);
        id
    }

    /// Detaches the node (wherever it sits in the tree) and gives it back.
    pub fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        if let Some(idx) = self.roots.iter().position(|node| node.id == id) {
            return Some(self.roots.remove(idx));
        }
        self.roots
            .iter_mut()
            .find_map(|root| root.take_descendant(id))
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.roots.iter().find_map(|root| root.find(id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.roots.iter_mut().find_map(|root| root.find_mut(id))
    }

    pub fn roots(&self) -> &[Node] {
        &self.roots
    }

    /// Total number of nodes owned by the scene.
    pub fn len(&self) -> usize {
        self.roots.iter().map(Node::subtree_len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Visits every node exactly once, depth first, in insertion order.
    pub fn traverse(&mut self, visitor: &mut dyn FnMut(&mut Node)) {
        for root in self.roots.iter_mut() {
            root.traverse(visitor);
        }
    }

    pub fn traverse_ref(&self, visitor: &mut dyn FnMut(&Node)) {
        for root in &self.roots {
            root.traverse_ref(visitor);
        }
    }

    /// Like [`Scene::traverse_ref`] but also hands out each node's world
    /// transform.
    pub fn visit_world(&self, visitor: &mut dyn FnMut(&Node, &Transform)) {
        let identity = Transform::new();
        for root in &self.roots {
            root.visit_world(&identity, visitor);
        }
    }

    pub fn environment(&self) -> &SceneEnvironment {
        &self.environment
    }

    pub fn set_background(&mut self, color: Color) {
        self.environment.background = color;
    }

    pub fn set_ambient(&mut self, ambient: Option<AmbientLight>) {
        self.environment.ambient = ambient;
    }

    pub fn set_fog(&mut self, fog: Option<Fog>) {
        self.environment.fog = fog;
    }

    /// Installs a resolved environment image as the scene's reflection
    /// source, projected equirectangularly.
    pub fn set_environment(&mut self, mut map: EnvironmentMap) {
        map.mapping = Mapping::EquirectangularReflection;
        self.environment.reflection = Some(Arc::new(map));
    }
}
