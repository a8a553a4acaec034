use crate::graph::NodeId;
use crate::light::Attenuation;

/// Errors from scene construction and light list edits.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("node {0:?} not found")]
    NodeNotFound(NodeId),
    #[error("node {0:?} already has a parent")]
    AlreadyParented(NodeId),
    #[error("attaching {child:?} under {parent:?} would create a cycle")]
    Cycle { parent: NodeId, child: NodeId },
    #[error("light list is full ({max} lights)")]
    TooManyLights { max: usize },
    #[error("attenuation coefficients must be finite and non-negative: {0:?}")]
    InvalidAttenuation(Attenuation),
    #[error("invalid scene config: {0}")]
    Config(#[from] serde_yaml::Error),
}
