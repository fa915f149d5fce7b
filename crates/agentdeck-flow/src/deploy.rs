//! Compile-and-save.

use std::fmt;

use agentdeck_core::{ClientError, ConfigGateway};

use crate::{
    compile::{CompileOptions, CompiledConfig, InvalidSchema, ValidationError, compile_with},
    graph::GraphDocument,
};

/// What to do when some tools have schemas that do not parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SchemaPolicy {
    /// Save nothing.
    #[default]
    Block,
    /// Save everything else and report what was left out.
    PersistPartial,
}

/// One of the two saved documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigDocument {
    SupervisorProfile,
    AssistantsConfig,
}

impl fmt::Display for ConfigDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SupervisorProfile => f.write_str("supervisor profile"),
            Self::AssistantsConfig => f.write_str("assistants config"),
        }
    }
}

/// Both documents were saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub config: CompiledConfig,
    /// Tools left out under [`SchemaPolicy::PersistPartial`].
    pub skipped: Vec<InvalidSchema>,
}

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("{} tool(s) have invalid parameter schemas", .0.len())]
    InvalidSchemas(Vec<InvalidSchema>),
    #[error("Saved the {saved} but not the {failed}: {source}")]
    PartiallySaved {
        saved: ConfigDocument,
        failed: ConfigDocument,
        source: ClientError,
    },
    #[error("Saving failed. Supervisor profile: {profile}. Assistants config: {assistants}")]
    Failed {
        profile: ClientError,
        assistants: ClientError,
    },
}

/// Compile `doc` and save both documents.
///
/// Structural errors stop before any I/O. Both saves are always attempted,
/// and a half-saved configuration is reported as
/// [`DeployError::PartiallySaved`].
///
/// # Errors
/// Returns error if compilation fails, schemas are invalid under
/// [`SchemaPolicy::Block`], or either save fails.
pub async fn deploy<G>(
    gateway: &G,
    doc: &GraphDocument,
    options: &CompileOptions,
    policy: SchemaPolicy,
) -> Result<Deployment, DeployError>
where
    G: ConfigGateway + ?Sized,
{
    let compilation = compile_with(doc, options)?;
    if !compilation.is_clean() && policy == SchemaPolicy::Block {
        tracing::warn!(count = compilation.issues.len(), "Not saving: invalid tool schemas");
        return Err(DeployError::InvalidSchemas(compilation.issues));
    }

    let config = compilation.config;
    let (profile, assistants) = tokio::join!(
        gateway.save_supervisor_profile(&config.supervisor_profile),
        gateway.save_assistants_config(&config.assistants),
    );

    match (profile, assistants) {
        (Ok(()), Ok(())) => {
            tracing::info!(
                assistants = config.assistants.assistants.len(),
                skipped = compilation.issues.len(),
                "Flow deployed"
            );
            Ok(Deployment {
                config,
                skipped: compilation.issues,
            })
        }
        (Ok(()), Err(source)) => {
            tracing::warn!("Assistants config not saved: {source}");
            Err(DeployError::PartiallySaved {
                saved: ConfigDocument::SupervisorProfile,
                failed: ConfigDocument::AssistantsConfig,
                source,
            })
        }
        (Err(source), Ok(())) => {
            tracing::warn!("Supervisor profile not saved: {source}");
            Err(DeployError::PartiallySaved {
                saved: ConfigDocument::AssistantsConfig,
                failed: ConfigDocument::SupervisorProfile,
                source,
            })
        }
        (Err(profile), Err(assistants)) => Err(DeployError::Failed {
            profile,
            assistants,
        }),
    }
}
