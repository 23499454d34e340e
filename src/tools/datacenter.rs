//! Datacenter tools: firewall, pools, HA, replication, SDN

use super::schema::{dict, integer, object, string, tool};
use super::{insert_opt, parse_args, segment, Context, ToolDefinition, ToolError, ToolOutput};
use crate::proxmox::{Params, ProxmoxApi};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

pub fn definitions() -> Vec<ToolDefinition> {
    let empty = super::schema::empty;

    vec![
        tool("list_dc_firewall_rules", "List datacenter firewall rules.", empty()),
        tool(
            "add_dc_firewall_rule",
            "Add a datacenter firewall rule (e.g. {\"type\": \"in\", \"action\": \"ACCEPT\", \
             \"proto\": \"tcp\", \"dport\": \"22\"}).",
            object(vec![("rule", dict("Rule parameters"))], &["rule"]),
        ),
        tool(
            "delete_dc_firewall_rule",
            "Delete a datacenter firewall rule by position.",
            object(vec![("pos", integer("Rule position"))], &["pos"]),
        ),
        tool("list_pools", "List resource pools.", empty()),
        tool(
            "create_pool",
            "Create a resource pool.",
            object(
                vec![("poolid", string("Pool id")), ("comment", string("Comment"))],
                &["poolid"],
            ),
        ),
        tool(
            "delete_pool",
            "Delete a resource pool.",
            object(vec![("poolid", string("Pool id"))], &["poolid"]),
        ),
        tool("ha_list_groups", "List HA groups.", empty()),
        tool(
            "ha_create_group",
            "Create an HA group.",
            object(
                vec![
                    ("group", string("Group id")),
                    ("nodes", string("Node list with optional priorities (e.g. 'pve1:2,pve2:1')")),
                    ("comment", string("Comment")),
                ],
                &["group", "nodes"],
            ),
        ),
        tool("ha_list_resources", "List HA-managed resources.", empty()),
        tool(
            "ha_add_resource",
            "Put a guest under HA management.",
            object(
                vec![
                    ("sid", string("Resource id (e.g. 'vm:100', 'ct:101')")),
                    ("group", string("HA group")),
                ],
                &["sid"],
            ),
        ),
        tool(
            "ha_delete_resource",
            "Remove a guest from HA management.",
            object(vec![("sid", string("Resource id (e.g. 'vm:100')"))], &["sid"]),
        ),
        tool("replication_list_jobs", "List storage replication jobs.", empty()),
        tool(
            "replication_create_job",
            "Create a storage replication job (e.g. {\"id\": \"100-0\", \"target\": \"pve2\", \
             \"type\": \"local\", \"schedule\": \"*/15\"}).",
            object(vec![("job", dict("Job parameters"))], &["job"]),
        ),
        tool(
            "replication_delete_job",
            "Delete a storage replication job.",
            object(vec![("jobid", string("Job id (e.g. '100-0')"))], &["jobid"]),
        ),
        tool("sdn_list_zones", "List SDN zones.", empty()),
        tool("sdn_list_vnets", "List SDN virtual networks.", empty()),
    ]
}

pub async fn call(
    api: &dyn ProxmoxApi,
    name: &str,
    args: &Value,
) -> Option<Result<ToolOutput, ToolError>> {
    let result = match name {
        "list_dc_firewall_rules" => list(api, "cluster/firewall/rules").await,
        "add_dc_firewall_rule" => create_from(api, args, "rule", "cluster/firewall/rules").await,
        "delete_dc_firewall_rule" => delete_rule(api, args).await,
        "list_pools" => list(api, "pools").await,
        "create_pool" => create_pool(api, args).await,
        "delete_pool" => delete_by(api, args, "poolid", "pools").await,
        "ha_list_groups" => list(api, "cluster/ha/groups").await,
        "ha_create_group" => ha_create_group(api, args).await,
        "ha_list_resources" => list(api, "cluster/ha/resources").await,
        "ha_add_resource" => ha_add_resource(api, args).await,
        "ha_delete_resource" => delete_by(api, args, "sid", "cluster/ha/resources").await,
        "replication_list_jobs" => list(api, "cluster/replication").await,
        "replication_create_job" => create_from(api, args, "job", "cluster/replication").await,
        "replication_delete_job" => delete_by(api, args, "jobid", "cluster/replication").await,
        "sdn_list_zones" => list(api, "cluster/sdn/zones").await,
        "sdn_list_vnets" => list(api, "cluster/sdn/vnets").await,
        _ => return None,
    };
    Some(result)
}

async fn list(api: &dyn ProxmoxApi, path: &str) -> Result<ToolOutput, ToolError> {
    let entries = api.get(path).await.context(format!("list {}", path))?;
    Ok(ToolOutput::json(entries))
}

/// POST the object held in `field` to `path`
async fn create_from(
    api: &dyn ProxmoxApi,
    args: &Value,
    field: &str,
    path: &str,
) -> Result<ToolOutput, ToolError> {
    let params = match args.get(field) {
        Some(Value::Object(params)) if !params.is_empty() => params.clone(),
        Some(Value::Object(_)) => {
            return Err(ToolError::InvalidArguments(format!("`{}` must not be empty", field)))
        }
        _ => {
            return Err(ToolError::InvalidArguments(format!(
                "`{}` must be an object",
                field
            )))
        }
    };

    let result = api.post(path, params).await.context(format!("create entry in {}", path))?;
    info!(path = %path, "Datacenter entry created");
    Ok(ToolOutput::json(result))
}

/// DELETE `{collection}/{id}` where `id` comes from `field`
async fn delete_by(
    api: &dyn ProxmoxApi,
    args: &Value,
    field: &str,
    collection: &str,
) -> Result<ToolOutput, ToolError> {
    let id = super::text(args.get(field))
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing field `{}`", field)))?;
    let id = segment(field, &id)?;

    let result = api
        .delete(&format!("{}/{}", collection, id), Params::new())
        .await
        .context(format!("delete {} from {}", id, collection))?;
    info!(collection = %collection, id = %id, "Datacenter entry deleted");
    Ok(ToolOutput::json(result))
}

#[derive(Deserialize)]
struct RuleArgs {
    pos: u32,
}

async fn delete_rule(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: RuleArgs = parse_args(args)?;
    let result = api
        .delete(&format!("cluster/firewall/rules/{}", args.pos), Params::new())
        .await
        .context(format!("delete firewall rule {}", args.pos))?;
    Ok(ToolOutput::json(result))
}

#[derive(Deserialize)]
struct PoolArgs {
    poolid: String,
    comment: Option<String>,
}

async fn create_pool(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: PoolArgs = parse_args(args)?;
    let pool = segment("poolid", &args.poolid)?;

    let mut params = Params::new();
    params.insert("poolid".to_string(), json!(pool));
    insert_opt(&mut params, "comment", args.comment.filter(|c| !c.is_empty()));

    let result = api.post("pools", params).await.context(format!("create pool {}", pool))?;
    Ok(ToolOutput::json(result))
}

#[derive(Deserialize)]
struct HaGroupArgs {
    group: String,
    nodes: String,
    comment: Option<String>,
}

async fn ha_create_group(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: HaGroupArgs = parse_args(args)?;
    let group = segment("group", &args.group)?;
    if args.nodes.trim().is_empty() {
        return Err(ToolError::InvalidArguments("nodes must not be empty".to_string()));
    }

    let mut params = Params::new();
    params.insert("group".to_string(), json!(group));
    params.insert("nodes".to_string(), json!(args.nodes.trim()));
    insert_opt(&mut params, "comment", args.comment.filter(|c| !c.is_empty()));

    let result = api
        .post("cluster/ha/groups", params)
        .await
        .context(format!("create HA group {}", group))?;
    Ok(ToolOutput::json(result))
}

#[derive(Deserialize)]
struct HaResourceArgs {
    sid: String,
    group: Option<String>,
}

async fn ha_add_resource(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: HaResourceArgs = parse_args(args)?;
    let sid = segment("sid", &args.sid)?;

    let mut params = Params::new();
    params.insert("sid".to_string(), json!(sid));
    insert_opt(&mut params, "group", args.group.filter(|g| !g.is_empty()));

    let result = api
        .post("cluster/ha/resources", params)
        .await
        .context(format!("add HA resource {}", sid))?;
    info!(sid = %sid, "HA resource added");
    Ok(ToolOutput::json(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxmox::fake::FakeApi;
    use crate::proxmox::ApiMethod;

    async fn run(api: &FakeApi, name: &str, args: Value) -> Result<ToolOutput, ToolError> {
        call(api, name, &args).await.unwrap()
    }

    #[tokio::test]
    async fn test_firewall_rule_lifecycle() {
        let api = FakeApi::new();
        run(
            &api,
            "add_dc_firewall_rule",
            json!({"rule": {"type": "in", "action": "ACCEPT", "dport": "22", "enable": true}}),
        )
        .await
        .unwrap();
        run(&api, "delete_dc_firewall_rule", json!({"pos": 3})).await.unwrap();

        let writes = api.writes();
        assert_eq!(writes[0].path, "cluster/firewall/rules");
        assert_eq!(writes[0].params["action"], "ACCEPT");
        assert_eq!(writes[1].method, ApiMethod::Delete);
        assert_eq!(writes[1].path, "cluster/firewall/rules/3");
    }

    #[tokio::test]
    async fn test_create_requires_object() {
        let api = FakeApi::new();
        for args in [json!({}), json!({"job": "100-0"}), json!({"job": {}})] {
            let err = run(&api, "replication_create_job", args).await.unwrap_err();
            assert!(matches!(err, ToolError::InvalidArguments(_)));
        }
        assert!(api.writes().is_empty());
    }

    #[tokio::test]
    async fn test_ha_resource() {
        let api = FakeApi::new();
        run(&api, "ha_add_resource", json!({"sid": "vm:100", "group": "prod"})).await.unwrap();
        run(&api, "ha_delete_resource", json!({"sid": "vm:100"})).await.unwrap();

        let writes = api.writes();
        assert_eq!(writes[0].params["sid"], "vm:100");
        assert_eq!(writes[1].path, "cluster/ha/resources/vm:100");
    }

    #[tokio::test]
    async fn test_pool_and_sdn() {
        let api = FakeApi::new();
        api.on_get("cluster/sdn/zones", json!([{"zone": "lan", "type": "simple"}]));

        run(&api, "create_pool", json!({"poolid": "lab", "comment": ""})).await.unwrap();
        assert!(api.writes()[0].params.get("comment").is_none());

        let zones = run(&api, "sdn_list_zones", json!({})).await.unwrap();
        assert_eq!(zones.data.unwrap()[0]["zone"], "lan");
    }
}
