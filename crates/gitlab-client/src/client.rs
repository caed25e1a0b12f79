//! HTTP client for the GitLab v4 REST API.

use crate::error::GitlabError;
use crate::types::{Commit, MergeRequest, Note, NoteBody, Pipeline, User};
use async_trait::async_trait;
use preview_core::source::{CommentStore, DesiredStateSource, PipelineStatusSource};
use preview_core::types::{self as model, PipelineRun, ReviewRequest, ReviewRequestId};
use preview_core::ReconcileError;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

const TOKEN_HEADER: &str = "PRIVATE-TOKEN";
const NEXT_PAGE_HEADER: &str = "x-next-page";
const PER_PAGE: &str = "100";

type Result<T> = std::result::Result<T, GitlabError>;

/// API client bound to one project.
#[derive(Debug, Clone)]
pub struct GitlabClient {
    http: Client,
    base: Url,
    token: String,
    project: String,
}

impl GitlabClient {
    /// Creates a client for `project` (numeric id or `group/name` path).
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not an absolute http(s) URL or the
    /// HTTP client cannot be constructed.
    pub fn new(
        base_url: &str,
        token: impl Into<String>,
        project: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let base = Url::parse(base_url).map_err(|e| GitlabError::Url(format!("{base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(GitlabError::Url(base_url.to_string()));
        }
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mr-controller/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base,
            token: token.into(),
            project: project.into(),
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    // ---------------------------------------------------------------------
    // Endpoints
    // ---------------------------------------------------------------------

    /// The account the token belongs to.
    pub async fn current_user(&self) -> Result<User> {
        let url = self.api_url(&["user"])?;
        self.send(self.request(Method::GET, url)).await
    }

    /// Open merge requests targeting `target_branch`.
    pub async fn open_merge_requests(&self, target_branch: &str) -> Result<Vec<MergeRequest>> {
        let mut url = self.url(&["merge_requests"])?;
        url.query_pairs_mut()
            .append_pair("state", "opened")
            .append_pair("target_branch", target_branch);
        self.get_all(url).await
    }

    pub async fn commit(&self, sha: &str) -> Result<Commit> {
        let url = self.url(&["repository", "commits", sha])?;
        self.send(self.request(Method::GET, url)).await
    }

    pub async fn merge_request_pipelines(&self, iid: u64) -> Result<Vec<Pipeline>> {
        let iid = iid.to_string();
        let url = self.url(&["merge_requests", &iid, "pipelines"])?;
        self.get_all(url).await
    }

    /// Notes of a merge request, oldest first.
    pub async fn notes(&self, iid: u64) -> Result<Vec<Note>> {
        let iid = iid.to_string();
        let mut url = self.url(&["merge_requests", &iid, "notes"])?;
        url.query_pairs_mut()
            .append_pair("sort", "asc")
            .append_pair("order_by", "created_at");
        self.get_all(url).await
    }

    pub async fn create_note(&self, iid: u64, body: &str) -> Result<Note> {
        let iid = iid.to_string();
        let url = self.url(&["merge_requests", &iid, "notes"])?;
        self.send(self.request(Method::POST, url).json(&NoteBody { body }))
            .await
    }

    pub async fn update_note(&self, iid: u64, note_id: u64, body: &str) -> Result<Note> {
        let (iid, note_id) = (iid.to_string(), note_id.to_string());
        let url = self.url(&["merge_requests", &iid, "notes", &note_id])?;
        self.send(self.request(Method::PUT, url).json(&NoteBody { body }))
            .await
    }

    // ---------------------------------------------------------------------
    // Plumbing
    // ---------------------------------------------------------------------

    /// `<base>/api/v4/projects/<project>/<tail...>` with every segment
    /// percent-encoded, so `group/name` project paths become `group%2Fname`.
    pub(crate) fn url(&self, tail: &[&str]) -> Result<Url> {
        let mut url = self.api_url(&["projects", self.project.as_str()])?;
        url.path_segments_mut()
            .map_err(|()| GitlabError::Url(self.base.to_string()))?
            .extend(tail);
        Ok(url)
    }

    fn api_url(&self, tail: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| GitlabError::Url(self.base.to_string()))?
            .pop_if_empty()
            .extend(["api", "v4"])
            .extend(tail);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(%method, path = url.path(), "GitLab request");
        self.http
            .request(method, url)
            .header(TOKEN_HEADER, self.token.as_str())
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T> {
        let response = req.send().await?;
        Ok(check(response).await?.json().await?)
    }

    /// Follow `x-next-page` until the last page.
    async fn get_all<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page = String::from("1");
        loop {
            let mut page_url = url.clone();
            page_url
                .query_pairs_mut()
                .append_pair("per_page", PER_PAGE)
                .append_pair("page", &page);
            let response = check(self.request(Method::GET, page_url).send().await?).await?;
            let next = response
                .headers()
                .get(NEXT_PAGE_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string);
            let batch: Vec<T> = response.json().await?;
            items.extend(batch);
            match next {
                Some(n) if n != page => page = n,
                _ => return Ok(items),
            }
        }
    }
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let path = response.url().path().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(GitlabError::Api {
        status: status.as_u16(),
        path,
        body,
    })
}

// ---------------------------------------------------------------------------
// Reconciler capabilities
// ---------------------------------------------------------------------------

#[async_trait]
impl DesiredStateSource for GitlabClient {
    async fn list_open_review_requests(
        &self,
        project_id: &str,
        target_branch: &str,
    ) -> preview_core::Result<Vec<ReviewRequest>> {
        // Pipelines and notes are always read from the bound project.
        if project_id != self.project {
            return Err(ReconcileError::InvalidConfig(format!(
                "GitLab client is bound to project '{}', not '{project_id}'",
                self.project
            )));
        }
        let mrs = self.open_merge_requests(target_branch).await?;
        let mut requests = Vec::with_capacity(mrs.len());
        for mr in mrs {
            // A skipped merge request would have its environment reaped.
            let Some(sha) = mr.sha.as_deref() else {
                warn!(iid = mr.iid, "merge request has no head commit yet");
                return Err(ReconcileError::Remote(format!(
                    "merge request !{} has no head commit",
                    mr.iid
                )));
            };
            let commit = self.commit(sha).await?;
            requests.push(ReviewRequest {
                id: mr.iid,
                title: mr.title,
                source_branch: mr.source_branch,
                web_url: mr.web_url,
                latest_commit: commit.into(),
            });
        }
        Ok(requests)
    }
}

#[async_trait]
impl PipelineStatusSource for GitlabClient {
    async fn latest_pipeline(
        &self,
        request: &ReviewRequest,
    ) -> preview_core::Result<Option<PipelineRun>> {
        let runs: Vec<PipelineRun> = self
            .merge_request_pipelines(request.id)
            .await?
            .into_iter()
            .map(PipelineRun::from)
            .collect();
        let Some(mut run) = model::latest_run(runs) else {
            return Ok(None);
        };
        run.commit = if run.sha == request.latest_commit.sha {
            Some(request.latest_commit.clone())
        } else {
            Some(self.commit(&run.sha).await?.into())
        };
        Ok(Some(run))
    }
}

#[async_trait]
impl CommentStore for GitlabClient {
    async fn list(&self, id: ReviewRequestId) -> preview_core::Result<Vec<model::Comment>> {
        Ok(self
            .notes(id)
            .await?
            .into_iter()
            .filter(|n| !n.system)
            .map(model::Comment::from)
            .collect())
    }

    async fn create(&self, id: ReviewRequestId, body: &str) -> preview_core::Result<()> {
        self.create_note(id, body).await?;
        Ok(())
    }

    async fn update(
        &self,
        id: ReviewRequestId,
        comment_id: u64,
        body: &str,
    ) -> preview_core::Result<()> {
        self.update_note(id, comment_id, body).await?;
        Ok(())
    }
}
