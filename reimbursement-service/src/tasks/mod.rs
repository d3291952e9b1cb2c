pub mod action_agent;
pub mod documentation_agent;
pub mod supervisor;
pub mod utils;

pub use action_agent::ActionAgentTask;
pub use documentation_agent::DocumentationAgentTask;
pub use supervisor::{Route, SupervisorTask};

/// Context keys shared by the handler and the tasks.
pub mod session_keys {
    pub const USER_INPUT: &str = "user_input";
    pub const USER_ROLE: &str = "user_role";
    pub const USER_LOGIN: &str = "user_login";
    pub const DISPLAY_NAME: &str = "display_name";
    pub const ROUTE: &str = "route";
}
