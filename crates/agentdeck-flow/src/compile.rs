//! Graph to configuration compiler.
//!
//! A pure function of the document: the same document always compiles to
//! the same output. Editor node ids are erased here; the compiled documents
//! address everything by name.

use std::collections::{HashMap, HashSet};

use agentdeck_core::{AssistantConfig, AssistantsConfig, SupervisorProfile, ToolSpec};
use serde::Serialize;

use crate::graph::{AgentData, GraphDocument, Node, NodeId, NodeKind, SupervisorData, ToolData};

/// Profile metadata the graph itself does not carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    pub name: String,
    pub model: String,
    pub persona: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            name: "Supervisor".into(),
            model: "gpt-4o-2024-05-13".into(),
            persona: "Supervisor".into(),
        }
    }
}

/// Structural failure; nothing was compiled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Exactly one supervisor node is required, found {found}")]
    MissingOrAmbiguousSupervisor { found: usize },
    #[error("Node id {0} is used more than once")]
    DuplicateNodeId(NodeId),
}

/// A tool left out of its assistant because its schema did not parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("Tool '{tool}' of assistant '{assistant}' has an invalid parameter schema: {reason}")]
pub struct InvalidSchema {
    pub assistant: String,
    pub tool: String,
    pub reason: String,
}

/// The two backend documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledConfig {
    pub supervisor_profile: SupervisorProfile,
    pub assistants: AssistantsConfig,
}

/// Compiled documents plus the tools that had to be left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Compilation {
    pub config: CompiledConfig,
    pub issues: Vec<InvalidSchema>,
}

impl Compilation {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Compile with default profile metadata.
///
/// # Errors
/// Returns error if the document does not have exactly one supervisor or
/// reuses a node id.
pub fn compile(doc: &GraphDocument) -> Result<Compilation, ValidationError> {
    compile_with(doc, &CompileOptions::default())
}

/// Compile a document.
///
/// Assistants follow node order; each assistant's tools follow edge order.
/// Edges to anything other than a tool, and edges to missing nodes, are
/// skipped. A tool whose schema text does not parse is left out and
/// reported in [`Compilation::issues`]; everything else still compiles.
///
/// # Errors
/// Returns error if the document does not have exactly one supervisor or
/// reuses a node id.
pub fn compile_with(
    doc: &GraphDocument,
    options: &CompileOptions,
) -> Result<Compilation, ValidationError> {
    let supervisor = single_supervisor(doc)?;

    let mut by_id: HashMap<&NodeId, &Node> = HashMap::with_capacity(doc.nodes().len());
    for node in doc.nodes() {
        if by_id.insert(&node.id, node).is_some() {
            return Err(ValidationError::DuplicateNodeId(node.id.clone()));
        }
    }

    let mut issues = Vec::new();
    let assistants = doc
        .nodes()
        .iter()
        .filter_map(|node| match &node.kind {
            NodeKind::Agent(agent) => Some((&node.id, agent)),
            _ => None,
        })
        .map(|(id, agent)| assistant(doc, &by_id, id, agent, &mut issues))
        .collect();

    Ok(Compilation {
        config: CompiledConfig {
            supervisor_profile: profile(supervisor, options),
            assistants: AssistantsConfig { assistants },
        },
        issues,
    })
}

fn single_supervisor(doc: &GraphDocument) -> Result<&SupervisorData, ValidationError> {
    let mut supervisors = doc.nodes().iter().filter_map(|node| match &node.kind {
        NodeKind::Supervisor(data) => Some(data),
        _ => None,
    });
    match (supervisors.next(), supervisors.next()) {
        (Some(data), None) => Ok(data),
        (None, _) => Err(ValidationError::MissingOrAmbiguousSupervisor { found: 0 }),
        (Some(_), Some(_)) => Err(ValidationError::MissingOrAmbiguousSupervisor {
            found: 2 + supervisors.count(),
        }),
    }
}

fn profile(data: &SupervisorData, options: &CompileOptions) -> SupervisorProfile {
    SupervisorProfile {
        name: data.name.clone().unwrap_or_else(|| options.name.clone()),
        model: data.model.clone().unwrap_or_else(|| options.model.clone()),
        persona: data.persona.clone().unwrap_or_else(|| options.persona.clone()),
        system_message: data.system_message.clone(),
    }
}

fn assistant(
    doc: &GraphDocument,
    by_id: &HashMap<&NodeId, &Node>,
    agent_id: &NodeId,
    agent: &AgentData,
    issues: &mut Vec<InvalidSchema>,
) -> AssistantConfig {
    let mut bound: HashSet<&NodeId> = HashSet::new();
    let mut tasks = Vec::new();

    for edge in doc.edges().iter().filter(|e| &e.source == agent_id) {
        let Some(NodeKind::Tool(tool)) = by_id.get(&edge.target).map(|n| &n.kind) else {
            continue;
        };
        // A repeated edge binds the tool once.
        if !bound.insert(&edge.target) {
            continue;
        }
        match tool_spec(tool) {
            Ok(spec) => tasks.push(spec),
            Err(reason) => issues.push(InvalidSchema {
                assistant: agent.name.clone(),
                tool: tool.name.clone(),
                reason,
            }),
        }
    }

    AssistantConfig {
        name: agent.name.clone(),
        system_message: agent.system_message.clone(),
        tasks,
    }
}

fn tool_spec(tool: &ToolData) -> Result<ToolSpec, String> {
    Ok(ToolSpec {
        name: tool.name.clone(),
        description: tool.description.clone(),
        endpoint: tool.endpoint.clone(),
        params_schema: tool.params_schema.normalize()?,
    })
}
