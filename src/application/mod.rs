pub mod coordinator;

pub use coordinator::{build_fleet, Collaborators, Coordinator};
