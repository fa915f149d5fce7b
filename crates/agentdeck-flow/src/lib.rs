//! Flow graph editing model and configuration compiler.
//!
//! Provides:
//! - `GraphDocument` - Supervisor/agent/tool nodes and their connections
//! - `compile` - Turn a document into a supervisor profile and assistant roster
//! - `deploy` - Compile and persist both documents through a `ConfigGateway`

pub mod compile;
pub mod deploy;
pub mod graph;

pub use compile::{
    Compilation, CompileOptions, CompiledConfig, InvalidSchema, ValidationError, compile,
    compile_with,
};
pub use deploy::{ConfigDocument, DeployError, Deployment, SchemaPolicy, deploy};
pub use graph::{
    AgentData, Edge, GraphDocument, GraphError, Node, NodeId, NodeKind, ParamsSchema, Position,
    SupervisorData, ToolData,
};
