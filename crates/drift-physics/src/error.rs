use crate::ActorId;

/// Errors that can occur in the physics layer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PhysicsError {
    #[error("unknown actor {0}")]
    UnknownActor(ActorId),

    #[error("body is not known to the physics backend")]
    UnknownBody,

    #[error("body is already registered as actor {0}")]
    AlreadyRegistered(ActorId),

    #[error("invalid query input: {what}")]
    InvalidQuery { what: &'static str },

    #[error("material limit of {0} reached")]
    MaterialLimit(usize),
}

/// Result type for physics operations
pub type PhysicsResult<T> = Result<T, PhysicsError>;
