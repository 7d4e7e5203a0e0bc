//! Version-control plumbing: local repository operations and the hosting
//! provider's pull request API.

pub mod hosting;
pub mod repo;

pub use hosting::{GitHubClient, HostingClient, ProposalInfo, ProposalState};
pub use repo::GitRepo;
