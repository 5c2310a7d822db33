//! Client boundary for the remote catalog (Pulp) service.
//!
//! [`CatalogClient`] is the narrow interface every workflow talks through:
//! search content/repositories by criteria, mutate content membership,
//! publish a repository and upload bytes. Every operation is asynchronous
//! and may be awaited at a phase boundary; implementors are shared by all
//! pipeline phases and must be safe to call concurrently.
//!
//! The trait is annotated for `mockall` so tests can generate deterministic
//! mocks; a stateful in-memory catalog also implements it in the test suite.

use std::path::Path;

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde::Serialize;

use crate::criteria::Criteria;
use crate::error::{CourierError, Result};
use crate::unit::{
    ErratumUnit, PublishOptions, Repository, TaskRecord, Unit, UploadReport,
};

/// Type-specific metadata accompanying a file (ISO) upload.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FileUploadSpec {
    pub relative_url: String,
    pub description: Option<String>,
    pub version: Option<String>,
    pub display_order: Option<f64>,
    pub cdn_path: Option<String>,
    pub cdn_published: Option<chrono::DateTime<chrono::Utc>>,
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Search stored content units by criteria.
    async fn search_content(&self, criteria: Criteria) -> Result<Vec<Unit>>;

    /// Search content units within one repository.
    async fn search_repo_content(&self, repo_id: &str, criteria: Criteria) -> Result<Vec<Unit>>;

    /// Search repositories by criteria.
    async fn search_repository(&self, criteria: Criteria) -> Result<Vec<Repository>>;

    /// Remove all content matching `criteria` from one repository,
    /// returning the completed removal task.
    async fn remove_content(&self, repo_id: &str, criteria: Criteria) -> Result<TaskRecord>;

    /// Associate content matching `criteria` from one repository into
    /// another. Used to satisfy destination-repo membership without
    /// re-uploading bytes.
    async fn copy_content(
        &self,
        from_repo_id: &str,
        to_repo_id: &str,
        criteria: Criteria,
    ) -> Result<TaskRecord>;

    /// Publish one repository.
    async fn publish(&self, repo_id: &str, options: PublishOptions) -> Result<Repository>;

    /// Upload an RPM into a repository.
    async fn upload_rpm(&self, repo_id: &str, src: &Path, cdn_path: &str)
        -> Result<UploadReport>;

    /// Upload a generic file (ISO) into a repository.
    async fn upload_file(
        &self,
        repo_id: &str,
        src: &Path,
        spec: FileUploadSpec,
    ) -> Result<UploadReport>;

    /// Upload a modulemd YAML stream into a repository. The server parses
    /// the stream and works out the contained module units itself.
    async fn upload_modulemd(&self, repo_id: &str, src: &Path) -> Result<UploadReport>;

    /// Upload an advisory into a repository.
    async fn upload_erratum(&self, repo_id: &str, erratum: &ErratumUnit)
        -> Result<UploadReport>;

    /// Update mutable fields of an existing unit to the values carried by
    /// `unit`, returning the stored result.
    async fn update_content(&self, unit: Unit) -> Result<Unit>;
}

/// HTTP implementation of [`CatalogClient`].
///
/// Transport and authentication details beyond a base URL are intentionally
/// thin here; the server is expected to evaluate criteria expressions posted
/// as JSON and to answer with the unit/repository representations from
/// [`crate::unit`].
pub struct HttpCatalogClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpCatalogClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| CourierError::Remote(format!("building http client: {e}")))?;
        Ok(HttpCatalogClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post_json<B: Serialize + Sync, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| CourierError::Remote(format!("{path}: {e}")))?;
        let response = response
            .error_for_status()
            .map_err(|e| CourierError::Remote(format!("{path}: {e}")))?;
        response
            .json()
            .await
            .map_err(|e| CourierError::Remote(format!("{path}: decoding response: {e}")))
    }

    async fn upload(&self, path: &str, src: &Path, fields: serde_json::Value) -> Result<UploadReport> {
        let bytes = tokio::fs::read(src).await?;
        let response = self
            .http
            .post(self.url(path))
            .header("x-courier-fields", fields.to_string())
            .body(bytes)
            .send()
            .await
            .map_err(|e| CourierError::Remote(format!("{path}: {e}")))?;
        let response = response
            .error_for_status()
            .map_err(|e| CourierError::Remote(format!("{path}: {e}")))?;
        response
            .json()
            .await
            .map_err(|e| CourierError::Remote(format!("{path}: decoding response: {e}")))
    }
}

#[derive(Serialize)]
struct RemoveBody<'a> {
    criteria: &'a Criteria,
}

#[derive(Serialize)]
struct CopyBody<'a> {
    from: &'a str,
    criteria: &'a Criteria,
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn search_content(&self, criteria: Criteria) -> Result<Vec<Unit>> {
        self.post_json("search/units", &criteria).await
    }

    async fn search_repo_content(&self, repo_id: &str, criteria: Criteria) -> Result<Vec<Unit>> {
        self.post_json(&format!("repositories/{repo_id}/search/units"), &criteria)
            .await
    }

    async fn search_repository(&self, criteria: Criteria) -> Result<Vec<Repository>> {
        self.post_json("search/repositories", &criteria).await
    }

    async fn remove_content(&self, repo_id: &str, criteria: Criteria) -> Result<TaskRecord> {
        self.post_json(
            &format!("repositories/{repo_id}/remove"),
            &RemoveBody {
                criteria: &criteria,
            },
        )
        .await
    }

    async fn copy_content(
        &self,
        from_repo_id: &str,
        to_repo_id: &str,
        criteria: Criteria,
    ) -> Result<TaskRecord> {
        self.post_json(
            &format!("repositories/{to_repo_id}/copy"),
            &CopyBody {
                from: from_repo_id,
                criteria: &criteria,
            },
        )
        .await
    }

    async fn publish(&self, repo_id: &str, options: PublishOptions) -> Result<Repository> {
        self.post_json(&format!("repositories/{repo_id}/publish"), &options)
            .await
    }

    async fn upload_rpm(
        &self,
        repo_id: &str,
        src: &Path,
        cdn_path: &str,
    ) -> Result<UploadReport> {
        self.upload(
            &format!("repositories/{repo_id}/upload/rpm"),
            src,
            serde_json::json!({ "cdn_path": cdn_path }),
        )
        .await
    }

    async fn upload_file(
        &self,
        repo_id: &str,
        src: &Path,
        spec: FileUploadSpec,
    ) -> Result<UploadReport> {
        self.upload(
            &format!("repositories/{repo_id}/upload/file"),
            src,
            serde_json::to_value(&spec)
                .map_err(|e| CourierError::Remote(format!("encoding upload spec: {e}")))?,
        )
        .await
    }

    async fn upload_modulemd(&self, repo_id: &str, src: &Path) -> Result<UploadReport> {
        self.upload(
            &format!("repositories/{repo_id}/upload/modulemd"),
            src,
            serde_json::json!({}),
        )
        .await
    }

    async fn upload_erratum(
        &self,
        repo_id: &str,
        erratum: &ErratumUnit,
    ) -> Result<UploadReport> {
        self.post_json(&format!("repositories/{repo_id}/upload/erratum"), erratum)
            .await
    }

    async fn update_content(&self, unit: Unit) -> Result<Unit> {
        self.post_json("units/update", &unit).await
    }
}
