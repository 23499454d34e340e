//! Users, groups, roles and ACL tools

use super::schema::{boolean, dict, integer, object, string, tool};
use super::{insert_opt, parse_args, segment, Context, ToolDefinition, ToolError, ToolOutput};
use crate::proxmox::{Params, ProxmoxApi};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

pub fn definitions() -> Vec<ToolDefinition> {
    let id = |field: &str, description: &str| object(vec![(field, string(description))], &[field]);

    vec![
        tool("list_users", "List users.", super::schema::empty()),
        tool(
            "create_user",
            "Create a user.",
            object(
                vec![
                    ("user", string("User id in name@realm form (e.g. 'alice@pve')")),
                    ("password", string("Initial password (pve realm only)")),
                    ("comment", string("Comment")),
                    ("expire", integer("Expiry as a Unix timestamp, 0 for never")),
                    ("enable", boolean("Enable the account", Some(true))),
                ],
                &["user"],
            ),
        ),
        tool(
            "update_user",
            "Change user attributes (e.g. {\"comment\": \"ops\", \"enable\": false}).",
            object(
                vec![
                    ("user", string("User id in name@realm form")),
                    ("changes", dict("Attributes to change")),
                ],
                &["user", "changes"],
            ),
        ),
        tool("delete_user", "Delete a user.", id("user", "User id in name@realm form")),
        tool("list_groups", "List groups.", super::schema::empty()),
        tool(
            "create_group",
            "Create a group.",
            object(
                vec![("groupid", string("Group id")), ("comment", string("Comment"))],
                &["groupid"],
            ),
        ),
        tool("delete_group", "Delete a group.", id("groupid", "Group id")),
        tool("list_roles", "List roles and their privileges.", super::schema::empty()),
        tool(
            "create_role",
            "Create a role with a set of privileges.",
            object(
                vec![
                    ("roleid", string("Role id")),
                    (
                        "privs",
                        json!({
                            "type": ["string", "array"],
                            "items": { "type": "string" },
                            "description": "Privileges, comma-separated or as a list (e.g. 'VM.PowerMgmt,VM.Audit')",
                        }),
                    ),
                ],
                &["roleid", "privs"],
            ),
        ),
        tool("delete_role", "Delete a role.", id("roleid", "Role id")),
        tool("get_acl", "List access control entries.", super::schema::empty()),
        tool(
            "set_acl",
            "Grant or revoke roles on a path for users and/or groups.",
            object(
                vec![
                    ("path", string("ACL path (e.g. '/vms/100', '/storage/local')")),
                    ("roles", string("Comma-separated role ids")),
                    ("users", string("Comma-separated user ids")),
                    ("groups", string("Comma-separated group ids")),
                    ("propagate", boolean("Apply to child paths", Some(true))),
                    ("delete", boolean("Remove the entries instead of adding them", None)),
                ],
                &["path", "roles"],
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
        "list_users" => list(api, "access/users", "list users").await,
        "create_user" => create_user(api, args).await,
        "update_user" => update_user(api, args).await,
        "delete_user" => delete_user(api, args).await,
        "list_groups" => list(api, "access/groups", "list groups").await,
        "create_group" => create_group(api, args).await,
        "delete_group" => delete_by_id(api, args, "groupid", "access/groups").await,
        "list_roles" => list(api, "access/roles", "list roles").await,
        "create_role" => create_role(api, args).await,
        "delete_role" => delete_by_id(api, args, "roleid", "access/roles").await,
        "get_acl" => list(api, "access/acl", "get ACL").await,
        "set_acl" => set_acl(api, args).await,
        _ => return None,
    };
    Some(result)
}

async fn list(api: &dyn ProxmoxApi, path: &str, action: &str) -> Result<ToolOutput, ToolError> {
    let entries = api.get(path).await.context(action)?;
    Ok(ToolOutput::json(entries))
}

/// Check a `name@realm` user id
fn userid(value: &str) -> Result<&str, ToolError> {
    let value = segment("user", value)?;
    match value.split_once('@') {
        Some((name, realm)) if !name.is_empty() && !realm.is_empty() => Ok(value),
        _ => Err(ToolError::InvalidArguments(format!(
            "user '{}' must be in name@realm form",
            value
        ))),
    }
}

#[derive(Deserialize)]
struct CreateUserArgs {
    user: String,
    password: Option<String>,
    comment: Option<String>,
    expire: Option<u64>,
    #[serde(default = "enabled")]
    enable: bool,
}

fn enabled() -> bool {
    true
}

async fn create_user(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: CreateUserArgs = parse_args(args)?;
    let user = userid(&args.user)?;

    let mut params = Params::new();
    params.insert("userid".to_string(), json!(user));
    insert_opt(&mut params, "password", args.password);
    insert_opt(&mut params, "comment", args.comment);
    insert_opt(&mut params, "expire", args.expire);
    params.insert("enable".to_string(), json!(args.enable));

    let result = api.post("access/users", params).await.context(format!("create user {}", user))?;
    info!(user = %user, "User created");
    Ok(ToolOutput::json(result))
}

#[derive(Deserialize)]
struct UpdateUserArgs {
    user: String,
    changes: Params,
}

async fn update_user(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: UpdateUserArgs = parse_args(args)?;
    let user = userid(&args.user)?;
    if args.changes.is_empty() {
        return Err(ToolError::InvalidArguments("changes must not be empty".to_string()));
    }

    let result = api
        .put(&format!("access/users/{}", user), args.changes)
        .await
        .context(format!("update user {}", user))?;
    Ok(ToolOutput::json(result))
}

#[derive(Deserialize)]
struct UserArgs {
    user: String,
}

async fn delete_user(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: UserArgs = parse_args(args)?;
    let user = userid(&args.user)?;

    let result = api
        .delete(&format!("access/users/{}", user), Params::new())
        .await
        .context(format!("delete user {}", user))?;
    info!(user = %user, "User deleted");
    Ok(ToolOutput::json(result))
}

#[derive(Deserialize)]
struct GroupArgs {
    groupid: String,
    comment: Option<String>,
}

async fn create_group(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: GroupArgs = parse_args(args)?;
    let group = segment("groupid", &args.groupid)?;

    let mut params = Params::new();
    params.insert("groupid".to_string(), json!(group));
    insert_opt(&mut params, "comment", args.comment);

    let result = api
        .post("access/groups", params)
        .await
        .context(format!("create group {}", group))?;
    Ok(ToolOutput::json(result))
}

/// DELETE `{collection}/{id}` where `id` comes from `field`
async fn delete_by_id(
    api: &dyn ProxmoxApi,
    args: &Value,
    field: &str,
    collection: &str,
) -> Result<ToolOutput, ToolError> {
    let id = args
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing field `{}`", field)))?;
    let id = segment(field, id)?;

    let result = api
        .delete(&format!("{}/{}", collection, id), Params::new())
        .await
        .context(format!("delete {} {}", field, id))?;
    Ok(ToolOutput::json(result))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Privileges {
    List(Vec<String>),
    Joined(String),
}

impl Privileges {
    fn joined(&self) -> String {
        let parts: Vec<&str> = match self {
            Privileges::List(list) => list.iter().map(|p| p.trim()).collect(),
            Privileges::Joined(joined) => joined.split(',').map(str::trim).collect(),
        };
        parts.into_iter().filter(|p| !p.is_empty()).collect::<Vec<_>>().join(",")
    }
}

#[derive(Deserialize)]
struct RoleArgs {
    roleid: String,
    privs: Privileges,
}

async fn create_role(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: RoleArgs = parse_args(args)?;
    let role = segment("roleid", &args.roleid)?;
    let privs = args.privs.joined();
    if privs.is_empty() {
        return Err(ToolError::InvalidArguments("privs must name at least one privilege".to_string()));
    }

    let mut params = Params::new();
    params.insert("roleid".to_string(), json!(role));
    params.insert("privs".to_string(), json!(privs));

    let result = api
        .post("access/roles", params)
        .await
        .context(format!("create role {}", role))?;
    Ok(ToolOutput::json(result))
}

#[derive(Deserialize)]
struct AclArgs {
    path: String,
    roles: String,
    users: Option<String>,
    groups: Option<String>,
    #[serde(default = "enabled")]
    propagate: bool,
    delete: Option<bool>,
}

async fn set_acl(api: &dyn ProxmoxApi, args: &Value) -> Result<ToolOutput, ToolError> {
    let args: AclArgs = parse_args(args)?;
    let path = args.path.trim();
    if !path.starts_with('/') {
        return Err(ToolError::InvalidArguments(format!(
            "ACL path '{}' must start with '/'",
            path
        )));
    }
    if args.users.is_none() && args.groups.is_none() {
        return Err(ToolError::InvalidArguments(
            "set_acl needs users or groups".to_string(),
        ));
    }

    let mut params = Params::new();
    params.insert("path".to_string(), json!(path));
    params.insert("roles".to_string(), json!(args.roles.trim()));
    insert_opt(&mut params, "users", args.users);
    insert_opt(&mut params, "groups", args.groups);
    params.insert("propagate".to_string(), json!(args.propagate));
    insert_opt(&mut params, "delete", args.delete);

    let result = api.put("access/acl", params).await.context(format!("update ACL on {}", path))?;
    info!(path = %path, roles = %args.roles, "ACL updated");
    Ok(ToolOutput::json(result))
}
