/// Errors raised by route registration and command dispatch.
#[derive(thiserror::Error, Debug)]
pub enum RouterError {
    #[error("command `{0}` already has a registered route")]
    DuplicateRoute(String),

    #[error("command `{0}` does not exist")]
    CommandNotFound(String),

    #[error("command handler failed: {0}")]
    Handler(String),

    #[error(transparent)]
    Protocol(#[from] relaymux_command::CommandError),
}
