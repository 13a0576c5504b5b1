use thiserror::Error;

/// Errors that can occur while adding a system to the ECS.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SystemRegistrationError {
    #[error("system '{name}' is already registered")]
    DuplicateName { name: String },

    #[error("system '{name}' targets an empty component group; register it as a general system instead")]
    EmptyTarget { name: String },
}
