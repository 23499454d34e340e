//! Raw Proxmox API access for endpoints without a dedicated tool

use super::schema::{dict, object, string, tool};
use super::{parse_args, ToolDefinition, ToolError, ToolOutput};
use crate::proxmox::{normalize_path, ApiMethod, Params, ProxmoxApi};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

pub fn definitions() -> Vec<ToolDefinition> {
    vec![tool(
        "proxmox_request",
        "Call any Proxmox API endpoint. Use this for operations that have no dedicated tool. \
         GET and DELETE send `params` as the query string; POST and PUT send `params` merged \
         with `data` as the body.",
        object(
            vec![
                (
                    "method",
                    json!({
                        "type": "string",
                        "description": "HTTP method",
                        "enum": ["GET", "POST", "PUT", "DELETE"],
                    }),
                ),
                ("path", string("API path such as 'nodes/pve/qemu/100/status/current'")),
                ("params", dict("Query or body parameters")),
                ("data", dict("Extra body parameters for POST/PUT; these win over params")),
            ],
            &["method", "path"],
        ),
    )]
}

pub async fn call(
    api: &dyn ProxmoxApi,
    name: &str,
    args: &Value,
) -> Option<Result<ToolOutput, ToolError>> {
    match name {
        "proxmox_request" => Some(request(api, args).await),
        _ => None,
    }
}

#[derive(Deserialize)]
struct RequestArgs {
    method: String,
    path: String,
    #[serde(default)]
    params: Option<Params>,
    #[serde(default)]
    data: Option<Params>,
}

async fn request(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: RequestArgs = parse_args(args)?;
    let method: ApiMethod = args
        .method
        .parse()
        .map_err(|_| ToolError::InvalidArguments(format!(
            "unsupported method '{}', use GET, POST, PUT or DELETE",
            args.method
        )))?;
    let path = normalize_path(&args.path)
        .map_err(|e| ToolError::InvalidArguments(e.to_string()))?
        .join("/");

    let mut params = args.params.unwrap_or_default();
    if method.has_body() {
        params.extend(args.data.unwrap_or_default());
    }

    info!(method = %method, path = %path, "Generic API request");
    let result = api
        .request(method, &path, params)
        .await
        .map_err(|source| ToolError::Api {
            action: format!("{} {}", method, path),
            source,
        })?;
    Ok(ToolOutput::json(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxmox::fake::FakeApi;

    async fn run(api: &FakeApi, args: Value) -> Result<ToolOutput, ToolError> {
        call(api, "proxmox_request", &args).await.unwrap()
    }

    #[tokio::test]
    async fn test_get_ignores_data() {
        let api = FakeApi::new();
        api.on_get("cluster/resources", json!([]));

        run(
            &api,
            json!({"method": "get", "path": "/api2/json/cluster/resources",
                   "params": {"type": "vm"}, "data": {"ignored": 1}}),
        )
        .await
        .unwrap();

        let call = &api.calls()[0];
        assert_eq!(call.method, ApiMethod::Get);
        assert_eq!(call.path, "cluster/resources");
        assert_eq!(call.params.len(), 1);
    }

    #[tokio::test]
    async fn test_write_merges_data_over_params() {
        let api = FakeApi::new();
        run(
            &api,
            json!({"method": "PUT", "path": "nodes/pve/qemu/100/config",
                   "params": {"memory": 1024, "cores": 2}, "data": {"memory": 4096}}),
        )
        .await
        .unwrap();

        let write = &api.writes()[0];
        assert_eq!(write.params["memory"], 4096);
        assert_eq!(write.params["cores"], 2);
    }

    #[tokio::test]
    async fn test_rejects_bad_method_and_path() {
        let api = FakeApi::new();
        for args in [
            json!({"method": "PATCH", "path": "nodes"}),
            json!({"method": "GET", "path": ""}),
            json!({"method": "GET", "path": "nodes/../access"}),
        ] {
            let err = run(&api, args).await.unwrap_err();
            assert!(matches!(err, ToolError::InvalidArguments(_)));
        }
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_error_keeps_context() {
        let api = FakeApi::new();
        let err = run(&api, json!({"method": "GET", "path": "nodes/ghost/status"}))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Failed to GET nodes/ghost/status"));
    }
}
