//! Storage tools

use super::schema::{choice, object, string, tool};
use super::{parse_args, segment, volume_path, Context, ToolDefinition, ToolError, ToolOutput};
use crate::proxmox::{Params, ProxmoxApi};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::info;

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        tool(
            "get_storage",
            "List storage pools defined in the cluster with their type and content types.",
            super::schema::empty(),
        ),
        tool(
            "get_storage_content",
            "List the volumes on a storage (disk images, ISO images, templates, backups).",
            object(
                vec![
                    ("node", super::schema::node()),
                    ("storage", string("Storage id (e.g. 'local')")),
                    ("content", string("Only list this content type (e.g. 'iso', 'backup')")),
                ],
                &["node", "storage"],
            ),
        ),
        tool(
            "delete_storage_content",
            "Delete a volume from a storage.",
            object(
                vec![
                    ("node", super::schema::node()),
                    ("storage", string("Storage id")),
                    ("volume", string("Volume id (e.g. 'local:iso/debian.iso')")),
                ],
                &["node", "storage", "volume"],
            ),
        ),
        tool(
            "upload_storage_content",
            "Upload a local file (ISO image or container template) to a storage.",
            object(
                vec![
                    ("node", super::schema::node()),
                    ("storage", string("Storage id")),
                    ("content", choice("Content type", &["iso", "vztmpl"], "iso")),
                    ("file_path", string("Path of the file on this machine")),
                    ("filename", string("Target file name (defaults to the local name)")),
                ],
                &["node", "storage", "content", "file_path"],
            ),
        ),
    ]
}

pub async fn call(
    api: &dyn ProxmoxApi,
    name: &str,
    args: &Value,
) -> Option<Result<ToolOutput, ToolError>> {
    let result = match name {
        "get_storage" => get_storage(api).await,
        "get_storage_content" => get_content(api, args).await,
        "delete_storage_content" => delete_content(api, args).await,
        "upload_storage_content" => upload_content(api, args).await,
        _ => return None,
    };
    Some(result)
}

async fn get_storage(api: &dyn ProxmoxApi) -> Result<ToolOutput, ToolError> {
    let storage = api.get("storage").await.context("get storage")?;
    Ok(ToolOutput::json(storage))
}

#[derive(Deserialize)]
struct ContentArgs {
    node: String,
    storage: String,
    content: Option<String>,
}

async fn get_content(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: ContentArgs = parse_args(args)?;
    let node = segment("node", &args.node)?;
    let storage = segment("storage", &args.storage)?;

    let mut params = Params::new();
    if let Some(content) = args.content.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        params.insert("content".to_string(), json!(content));
    }

    let volumes = api
        .get_with(&format!("nodes/{}/storage/{}/content", node, storage), params)
        .await
        .context(format!("get storage content for {} on node {}", storage, node))?;
    Ok(ToolOutput::json(volumes))
}

#[derive(Deserialize)]
struct VolumeArgs {
    node: String,
    storage: String,
    volume: String,
}

async fn delete_content(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: VolumeArgs = parse_args(args)?;
    let node = segment("node", &args.node)?;
    let storage = segment("storage", &args.storage)?;
    let volume = volume_path("volume", &args.volume)?;

    let upid = api
        .delete(
            &format!("nodes/{}/storage/{}/content/{}", node, storage, volume),
            Params::new(),
        )
        .await
        .context(format!("delete {} on {}@{}", volume, storage, node))?;

    info!(node = %node, storage = %storage, volume = %volume, "Storage volume deleted");
    Ok(ToolOutput::task(upid))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum UploadContent {
    Iso,
    Vztmpl,
}

impl UploadContent {
    fn as_str(self) -> &'static str {
        match self {
            UploadContent::Iso => "iso",
            UploadContent::Vztmpl => "vztmpl",
        }
    }
}

#[derive(Deserialize)]
struct UploadArgs {
    node: String,
    storage: String,
    content: UploadContent,
    file_path: PathBuf,
    filename: Option<String>,
}

async fn upload_content(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: UploadArgs = parse_args(args)?;
    let node = segment("node", &args.node)?;
    let storage = segment("storage", &args.storage)?;

    let file_name = match args.filename.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
        Some(name) => name.to_string(),
        None => args
            .file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                ToolError::InvalidArguments(format!(
                    "file_path '{}' has no file name",
                    args.file_path.display()
                ))
            })?,
    };
    let file_name = segment("filename", &file_name)?.to_string();

    let bytes = tokio::fs::read(&args.file_path).await?;
    let size = bytes.len();

    let mut fields = Params::new();
    fields.insert("content".to_string(), json!(args.content.as_str()));

    let upid = api
        .upload(
            &format!("nodes/{}/storage/{}/upload", node, storage),
            fields,
            &file_name,
            bytes,
        )
        .await
        .context(format!("upload {} to {}@{}", file_name, storage, node))?;

    info!(node = %node, storage = %storage, file = %file_name, size, "Upload accepted");
    Ok(ToolOutput::task(upid))
}
