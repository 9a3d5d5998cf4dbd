/// A pull request opened for a version bump.
#[derive(Debug, Clone)]
pub struct PullRequest {
    pub number: u64,
    pub url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreatePullRequest {
    pub title: String,
    pub body: String,
    pub head_branch: String,
    pub base_branch: String,
}
