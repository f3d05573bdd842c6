//! Dropbox-backed object store
//!
//! Speaks the Dropbox HTTP API v2 directly: content uploads, paginated
//! folder listing and deletion, plus an account lookup used as the startup
//! credential check.

use crate::error::{Error, Result};
use crate::store::{ListPage, ObjectEntry, ObjectStore};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Dropbox API v2 endpoints
mod endpoints {
    pub const UPLOAD: &str = "https://content.dropboxapi.com/2/files/upload";
    pub const LIST_FOLDER: &str = "https://api.dropboxapi.com/2/files/list_folder";
    pub const LIST_FOLDER_CONTINUE: &str =
        "https://api.dropboxapi.com/2/files/list_folder_continue";
    pub const DELETE: &str = "https://api.dropboxapi.com/2/files/delete_v2";
    pub const CURRENT_ACCOUNT: &str = "https://api.dropboxapi.com/2/users/get_current_account";
}

/// Store rooted at the app folder of one Dropbox account
#[derive(Clone)]
pub struct DropboxStore {
    http: Client,
    access_token: String,
}

impl DropboxStore {
    /// Create a store for the given OAuth access token
    pub fn new(access_token: String) -> Self {
        // Generous timeout: archive uploads can carry many frames.
        // Redirects are refused so a redirected POST never degrades to GET.
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("Failed to build HTTP client");

        Self { http, access_token }
    }

    /// Look up the account behind the access token.
    ///
    /// Run once at startup so a bad token fails the process immediately
    /// instead of on the first upload.
    pub async fn current_account(&self) -> Result<AccountInfo> {
        let response = self
            .http
            .post(endpoints::CURRENT_ACCOUNT)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Store(format!(
                "account lookup returned HTTP {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        let account = response.json::<AccountInfo>().await?;
        Ok(account)
    }

    /// Names live at the namespace root; the API wants a leading slash
    fn root_path(name: &str) -> String {
        format!("/{name}")
    }

    async fn list_folder_page(&self, cursor: Option<&str>) -> Result<ListFolderResponse> {
        let request = match cursor {
            None => self
                .http
                .post(endpoints::LIST_FOLDER)
                .bearer_auth(&self.access_token)
                .json(&json!({ "path": "" })),
            Some(cursor) => self
                .http
                .post(endpoints::LIST_FOLDER_CONTINUE)
                .bearer_auth(&self.access_token)
                .json(&json!({ "cursor": cursor })),
        };

        let response = request
            .send()
            .await
            .map_err(|e| Error::Listing(format!("list_folder request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Listing(format!(
                "list_folder returned HTTP {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        response
            .json::<ListFolderResponse>()
            .await
            .map_err(|e| Error::Listing(format!("list_folder parse error: {e}")))
    }
}

#[async_trait]
impl ObjectStore for DropboxStore {
    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        let arg = json!({
            "path": Self::root_path(name),
            "mode": "add",
            "autorename": false,
            "mute": false,
        });

        let size = bytes.len();
        let response = self
            .http
            .post(endpoints::UPLOAD)
            .bearer_auth(&self.access_token)
            .header("Dropbox-API-Arg", arg.to_string())
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| Error::Store(format!("upload request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Store(format!(
                "upload of {name} returned HTTP {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        tracing::debug!(name = %name, size = size, "Uploaded object");
        Ok(())
    }

    async fn list_page(&self, cursor: Option<&str>) -> Result<ListPage> {
        let page = self.list_folder_page(cursor).await?;

        let entries = page
            .entries
            .into_iter()
            .map(|e| ObjectEntry {
                name: e.name,
                is_folder: e.tag == "folder",
            })
            .collect();

        Ok(ListPage {
            entries,
            cursor: page.has_more.then_some(page.cursor),
        })
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let response = self
            .http
            .post(endpoints::DELETE)
            .bearer_auth(&self.access_token)
            .json(&json!({ "path": Self::root_path(name) }))
            .send()
            .await
            .map_err(|e| Error::Delete {
                name: name.to_string(),
                message: format!("delete request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Delete {
                name: name.to_string(),
                message: format!("HTTP {}: {}", status.as_u16(), body.trim()),
            });
        }

        tracing::debug!(name = %name, "Deleted object");
        Ok(())
    }
}

/// Account identity returned by `users/get_current_account`
#[derive(Debug, Clone, Deserialize)]
pub struct AccountInfo {
    pub account_id: String,
    pub email: String,
    pub name: AccountName,
}

/// Name block of an account
#[derive(Debug, Clone, Deserialize)]
pub struct AccountName {
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
struct ListFolderResponse {
    entries: Vec<ListFolderEntry>,
    cursor: String,
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct ListFolderEntry {
    #[serde(rename = ".tag")]
    tag: String,
    name: String,
}
