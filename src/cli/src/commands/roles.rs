//! Role listing.

use anyhow::Result;
use saas_core::rbac::{Role, RolePermissionTable};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};

#[derive(Debug, Serialize, Tabled)]
struct RoleRow {
    #[tabled(rename = "Role")]
    role: Role,
    #[tabled(rename = "Enabled")]
    enabled: bool,
    #[tabled(rename = "Description")]
    description: &'static str,
}

pub fn execute(table: &RolePermissionTable, format: OutputFormat) -> Result<()> {
    let rows: Vec<RoleRow> = Role::all()
        .into_iter()
        .map(|role| RoleRow {
            role,
            enabled: table.is_configured(role),
            description: role.description(),
        })
        .collect();

    output::print_list(&rows, format)
}
