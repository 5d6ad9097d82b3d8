//! Service accounts and RBAC

use std::collections::BTreeSet;

use k8s_openapi::api::rbac::v1::{PolicyRule, RoleRef, Subject};
use kubundle_core::{RegistryV1, StrategyDeploymentPermissions};

use crate::error::Result;
use crate::object::Object;
use crate::options::RenderOptions;
use crate::resources::{
    ResourceOption, create_cluster_role, create_cluster_role_binding, create_role,
    create_role_binding, create_service_account,
};

const DEFAULT_SERVICE_ACCOUNT: &str = "default";

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

fn service_account_name(permission: &StrategyDeploymentPermissions) -> &str {
    match permission.service_account_name.as_str() {
        "" => DEFAULT_SERVICE_ACCOUNT,
        name => name,
    }
}

/// One ServiceAccount per account referenced by any permission, sorted by name
///
/// The namespace's `default` account already exists and is never emitted.
pub fn service_account_generator(bundle: &RegistryV1, options: &RenderOptions) -> Result<Vec<Object>> {
    let names: BTreeSet<&str> = bundle
        .permissions()
        .iter()
        .chain(bundle.cluster_permissions())
        .map(service_account_name)
        .filter(|name| *name != DEFAULT_SERVICE_ACCOUNT)
        .collect();

    names
        .into_iter()
        .map(|name| create_service_account(name, &options.install_namespace, []))
        .collect()
}

/// A Role and RoleBinding per target namespace and permission
///
/// Nothing is generated in AllNamespaces mode; those permissions are promoted
/// by [`cluster_permissions_generator`].
pub fn permissions_generator(bundle: &RegistryV1, options: &RenderOptions) -> Result<Vec<Object>> {
    if options.is_all_namespaces() {
        return Ok(Vec::new());
    }

    let mut objects = Vec::with_capacity(2 * options.target_namespaces().len() * bundle.permissions().len());
    for namespace in options.target_namespaces() {
        for permission in bundle.permissions() {
            let sa = service_account_name(permission);
            let name = role_name(bundle, permission, options)?;

            objects.push(create_role(
                &name,
                namespace,
                [ResourceOption::Rules(permission.rules.clone())],
            )?);
            objects.push(create_role_binding(
                &name,
                namespace,
                [
                    ResourceOption::Subjects(vec![subject(sa, options)]),
                    ResourceOption::RoleRef(role_ref("Role", &name)),
                ],
            )?);
        }
    }
    Ok(objects)
}

/// A ClusterRole and ClusterRoleBinding per cluster permission
///
/// In AllNamespaces mode namespaced permissions are promoted too, each with an
/// extra rule to read namespaces.
pub fn cluster_permissions_generator(bundle: &RegistryV1, options: &RenderOptions) -> Result<Vec<Object>> {
    let mut permissions = bundle.cluster_permissions().to_vec();

    if options.is_all_namespaces() {
        permissions.extend(bundle.permissions().iter().cloned().map(|mut permission| {
            permission.rules.push(namespace_read_rule());
            permission
        }));
    }

    let mut objects = Vec::with_capacity(2 * permissions.len());
    for permission in &permissions {
        let sa = service_account_name(permission);
        let name = role_name(bundle, permission, options)?;

        objects.push(create_cluster_role(
            &name,
            [ResourceOption::Rules(permission.rules.clone())],
        )?);
        objects.push(create_cluster_role_binding(
            &name,
            [
                ResourceOption::Subjects(vec![subject(sa, options)]),
                ResourceOption::RoleRef(role_ref("ClusterRole", &name)),
            ],
        )?);
    }
    Ok(objects)
}

fn role_name(
    bundle: &RegistryV1,
    permission: &StrategyDeploymentPermissions,
    options: &RenderOptions,
) -> Result<String> {
    let base = format!("{}-{}", bundle.csv_name(), service_account_name(permission));
    options.unique_name(&base, &serde_json::to_value(permission)?)
}

fn subject(service_account: &str, options: &RenderOptions) -> Subject {
    Subject {
        kind: "ServiceAccount".to_string(),
        name: service_account.to_string(),
        namespace: Some(options.install_namespace.clone()),
        ..Default::default()
    }
}

fn role_ref(kind: &str, name: &str) -> RoleRef {
    RoleRef {
        api_group: RBAC_API_GROUP.to_string(),
        kind: kind.to_string(),
        name: name.to_string(),
    }
}

fn namespace_read_rule() -> PolicyRule {
    PolicyRule {
        verbs: vec!["get".into(), "list".into(), "watch".into()],
        api_groups: Some(vec![String::new()]),
        resources: Some(vec!["namespaces".into()]),
        ..Default::default()
    }
}
