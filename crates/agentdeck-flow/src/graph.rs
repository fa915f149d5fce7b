//! Graph schema: supervisor, agent and tool nodes plus their connections.
//!
//! Documents use the editor's wire shape: every node is
//! `{id, type, position?, data}` and every edge is `{source, target}`.
//! Node types this crate does not know are kept verbatim so a document
//! round-trips without loss.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Id of the node every new document starts with.
pub const SUPERVISOR_ID: &str = "supervisor";

const NEW_NODE_PREFIX: &str = "dndnode_";

/// Editor-assigned node identifier. Never reaches compiled output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canvas position. Carried for round-tripping only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Routing root of the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorData {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub system_message: String,
    /// Overrides the compiled profile's name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
}

impl Default for SupervisorData {
    fn default() -> Self {
        Self {
            label: "Supervisor".into(),
            system_message: "You are a helpful supervisor.".into(),
            name: None,
            model: None,
            persona: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub system_message: String,
}

impl Default for AgentData {
    fn default() -> Self {
        Self {
            name: "New Agent".into(),
            system_message: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub params_schema: ParamsSchema,
}

impl Default for ToolData {
    fn default() -> Self {
        Self {
            name: "New Tool".into(),
            description: String::new(),
            endpoint: String::new(),
            params_schema: ParamsSchema::default(),
        }
    }
}

/// A tool's parameter schema as edited: raw text or an already-parsed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamsSchema {
    Text(String),
    Structured(Value),
}

impl Default for ParamsSchema {
    fn default() -> Self {
        Self::Structured(json!({}))
    }
}

impl ParamsSchema {
    /// Structured form of the schema. Blank text counts as an empty object.
    ///
    /// # Errors
    /// Returns the parser's message if the text is not valid JSON.
    pub fn normalize(&self) -> Result<Value, String> {
        match self {
            Self::Structured(value) => Ok(value.clone()),
            Self::Text(text) if text.trim().is_empty() => Ok(json!({})),
            Self::Text(text) => serde_json::from_str(text).map_err(|e| e.to_string()),
        }
    }
}

/// Node kind with its kind-specific fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Supervisor(SupervisorData),
    Agent(AgentData),
    Tool(ToolData),
    /// Any other `type`; ignored by the compiler.
    Other { kind: String, data: Value },
}

impl NodeKind {
    /// The wire `type` tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            Self::Supervisor(_) => "supervisor",
            Self::Agent(_) => "agent",
            Self::Tool(_) => "tool",
            Self::Other { kind, .. } => kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNode", into = "RawNode")]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub position: Option<Position>,
}

impl Node {
    #[must_use]
    pub const fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            position: None,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RawNode {
    id: NodeId,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    position: Option<Position>,
    #[serde(default)]
    data: Value,
}

impl TryFrom<RawNode> for Node {
    type Error = serde_json::Error;

    fn try_from(raw: RawNode) -> Result<Self, Self::Error> {
        let data = if raw.data.is_null() {
            Value::Object(Map::new())
        } else {
            raw.data
        };
        let kind = match raw.kind.as_str() {
            "supervisor" => NodeKind::Supervisor(serde_json::from_value(data)?),
            "agent" => NodeKind::Agent(serde_json::from_value(data)?),
            "tool" => NodeKind::Tool(serde_json::from_value(data)?),
            _ => NodeKind::Other {
                kind: raw.kind,
                data,
            },
        };
        Ok(Self {
            id: raw.id,
            kind,
            position: raw.position,
        })
    }
}

impl From<Node> for RawNode {
    fn from(node: Node) -> Self {
        let kind = node.kind.tag().to_string();
        // Plain field structs always serialize.
        let data = match node.kind {
            NodeKind::Supervisor(d) => serde_json::to_value(d).unwrap_or_default(),
            NodeKind::Agent(d) => serde_json::to_value(d).unwrap_or_default(),
            NodeKind::Tool(d) => serde_json::to_value(d).unwrap_or_default(),
            NodeKind::Other { data, .. } => data,
        };
        Self {
            id: node.id,
            kind,
            position: node.position,
            data,
        }
    }
}

/// Directed connection. Only Agent to Tool edges mean anything to the
/// compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
}

/// Graph editing error.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),
    #[error("Node id already in use: {0}")]
    DuplicateNode(NodeId),
    #[error("Node {0} cannot connect to itself")]
    SelfLoop(NodeId),
    #[error("Invalid graph document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Editable supervisor/agent/tool graph.
///
/// Nodes keep insertion order, which is the order assistants compile in.
/// Ids for new nodes come from a counter owned by this document, so
/// separate documents never share id state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    nodes: Vec<Node>,
    #[serde(default)]
    edges: Vec<Edge>,
    #[serde(skip)]
    next_id: u64,
}

impl Default for GraphDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphDocument {
    /// A document holding only the default supervisor.
    #[must_use]
    pub fn new() -> Self {
        let mut doc = Self::empty();
        doc.nodes.push(Node {
            id: NodeId::from(SUPERVISOR_ID),
            kind: NodeKind::Supervisor(SupervisorData::default()),
            position: Some(Position { x: 400.0, y: 50.0 }),
        });
        doc
    }

    /// A document with no nodes at all.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            next_id: 0,
        }
    }

    /// Parse a saved document.
    ///
    /// # Errors
    /// Returns error if the text is not a graph document.
    pub fn from_json(text: &str) -> Result<Self, GraphError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize for saving.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, GraphError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| &n.id == id)
    }

    /// Add an agent with default fields; returns its id.
    pub fn add_agent(&mut self, position: Option<Position>) -> NodeId {
        self.add(NodeKind::Agent(AgentData::default()), position)
    }

    /// Add a tool with default fields; returns its id.
    pub fn add_tool(&mut self, position: Option<Position>) -> NodeId {
        self.add(NodeKind::Tool(ToolData::default()), position)
    }

    fn add(&mut self, kind: NodeKind, position: Option<Position>) -> NodeId {
        let id = self.fresh_id();
        self.nodes.push(Node {
            id: id.clone(),
            kind,
            position,
        });
        id
    }

    fn fresh_id(&mut self) -> NodeId {
        loop {
            let id = NodeId(format!("{NEW_NODE_PREFIX}{}", self.next_id));
            self.next_id += 1;
            if self.node(&id).is_none() {
                return id;
            }
        }
    }

    /// Insert a fully-formed node.
    ///
    /// # Errors
    /// Returns error if the id is already in use.
    pub fn insert_node(&mut self, node: Node) -> Result<(), GraphError> {
        if self.node(&node.id).is_some() {
            return Err(GraphError::DuplicateNode(node.id));
        }
        self.nodes.push(node);
        Ok(())
    }

    /// Connect `source` to `target`. Returns `false` if the edge already
    /// existed.
    ///
    /// # Errors
    /// Returns error if either endpoint is unknown or both are the same node.
    pub fn connect(&mut self, source: &NodeId, target: &NodeId) -> Result<bool, GraphError> {
        for id in [source, target] {
            if self.node(id).is_none() {
                return Err(GraphError::UnknownNode(id.clone()));
            }
        }
        if source == target {
            return Err(GraphError::SelfLoop(source.clone()));
        }
        if self
            .edges
            .iter()
            .any(|e| &e.source == source && &e.target == target)
        {
            return Ok(false);
        }
        self.edges.push(Edge {
            source: source.clone(),
            target: target.clone(),
        });
        Ok(true)
    }

    /// Remove the edge from `source` to `target`, if present.
    pub fn disconnect(&mut self, source: &NodeId, target: &NodeId) -> bool {
        let before = self.edges.len();
        self.edges
            .retain(|e| !(&e.source == source && &e.target == target));
        self.edges.len() != before
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&mut self, id: &NodeId) -> Option<Node> {
        let index = self.nodes.iter().position(|n| &n.id == id)?;
        self.edges.retain(|e| &e.source != id && &e.target != id);
        Some(self.nodes.remove(index))
    }
}
