//! ARM Portal GitOps
//!
//! Git host access for the provisioning workflows:
//! - `GitHost`: the seam, with a GitHub REST client and an in-memory fake
//! - branch/file helpers with blob-SHA optimistic concurrency
//! - the pull request body grammar and the parsers that read state back
//! - job projection and module → pull request resolution

pub mod body;
pub mod branch;
pub mod error;
pub mod fakes;
pub mod github;
pub mod host;
pub mod jobs;
pub mod module_index;
pub mod parse;

pub use body::{render_pr_body, PrMetadata, PromotionBody, ProvisionDescription};
pub use branch::{commit_file, ensure_branch, existing_sha, file_exists, find_iac_file};
pub use error::{GitHostError, Result};
pub use fakes::MemoryGitHost;
pub use github::{GitHubClient, GitHubConfig};
pub use host::{
    Comment, CommitResult, FileContent, FileDelete, FileWrite, GitHost, NewPullRequest, PrSort,
    PrState, PullRequest,
};
pub use jobs::JobRepository;
pub use module_index::{request_ref, ModuleIndex, RequestRef};
