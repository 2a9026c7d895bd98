//! Policy commands.
//!
//! Prints the compiled rules of each role, validates the configured policy
//! and evaluates single authorization queries.

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Subcommand};
use saas_core::config::SaasConfig;
use saas_core::rbac::{Action, Role, RolePermissionTable, SubjectType, User};
use serde::Serialize;
use serde_json::Value;
use tabled::Tabled;

use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum PolicyCommands {
    /// Print the rules each enabled role compiles to, in declaration order
    Table {
        /// Only print this role
        #[arg(short, long)]
        role: Option<Role>,
    },

    /// Check that the configured policy builds for every enabled role
    Validate,

    /// Decide whether a principal may perform an action on a subject
    #[command(group(
        ArgGroup::new("target")
            .required(true)
            .args(["subject_json", "subject_type"])
    ))]
    Check {
        /// Role name as carried in the session claims
        #[arg(short, long)]
        role: String,

        /// Principal id
        #[arg(short, long, default_value = "cli-user")]
        user_id: String,

        /// Action (manage, get, create, update, delete, transfer_ownership, export)
        #[arg(short, long)]
        action: String,

        /// Subject instance as JSON, or @path to read it from a file
        #[arg(long)]
        subject_json: Option<String>,

        /// Subject type, for type-level queries
        #[arg(long)]
        subject_type: Option<String>,
    },
}

// ── Output types ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Tabled)]
struct RuleRow {
    #[tabled(rename = "Role")]
    role: Role,
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Effect")]
    effect: String,
    #[tabled(rename = "Action")]
    action: Action,
    #[tabled(rename = "Subject")]
    subject: SubjectType,
    #[tabled(rename = "Condition")]
    condition: String,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    principal: String,
    role: Role,
    action: Action,
    subject: String,
    decision: &'static str,
    reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    rule: Option<String>,
}

pub fn execute(
    cmd: PolicyCommands,
    config: &SaasConfig,
    table: &RolePermissionTable,
    format: OutputFormat,
) -> Result<()> {
    match cmd {
        PolicyCommands::Table { role } => print_rules(table, role, format),
        PolicyCommands::Validate => validate(config, table, format),
        PolicyCommands::Check {
            role,
            user_id,
            action,
            subject_json,
            subject_type,
        } => check(
            table,
            &role,
            &user_id,
            &action,
            subject_json.as_deref(),
            subject_type.as_deref(),
            format,
        ),
    }
}

fn print_rules(table: &RolePermissionTable, only: Option<Role>, format: OutputFormat) -> Result<()> {
    let roles: Vec<Role> = match only {
        Some(role) => vec![role],
        None => table.roles().collect(),
    };

    let mut rows = Vec::new();
    for role in roles {
        let ability = table.define_ability_for(&User::new("principal", role))?;
        rows.extend(ability.rules().iter().enumerate().map(|(index, rule)| RuleRow {
            role,
            index,
            effect: rule.effect.to_string(),
            action: rule.action,
            subject: rule.subject,
            condition: rule
                .condition
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "-".to_string()),
        }));
    }

    output::print_list(&rows, format)
}

fn validate(config: &SaasConfig, table: &RolePermissionTable, format: OutputFormat) -> Result<()> {
    config.validate()?;

    let mut rules = 0;
    let mut failures = 0;
    for role in table.roles() {
        match table.define_ability_for(&User::new("principal", role)) {
            Ok(ability) => rules += ability.rules().len(),
            Err(e) => {
                output::print_error(&format!("Role {} does not build: {}", role, e));
                failures += 1;
            }
        }
    }
    if failures > 0 {
        bail!("{} role(s) failed to build", failures);
    }

    let roles: Vec<Role> = table.roles().collect();
    match format {
        OutputFormat::Table => output::print_success(&format!(
            "Policy is valid: {} roles, {} rules",
            roles.len(),
            rules
        )),
        _ => output::print_item(
            &serde_json::json!({ "valid": true, "roles": roles, "rules": rules }),
            format,
        )?,
    }
    Ok(())
}

fn read_subject(raw: &str) -> Result<Value> {
    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path))?,
        None => raw.to_string(),
    };
    serde_json::from_str(&text).context("Subject is not valid JSON")
}

fn check(
    table: &RolePermissionTable,
    role: &str,
    user_id: &str,
    action: &str,
    subject_json: Option<&str>,
    subject_type: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let ability = table.define_ability_for_claims(user_id, role)?;
    let action: Action = action.parse()?;

    let (subject, decision) = match (subject_json, subject_type) {
        (Some(raw), _) => {
            let value = read_subject(raw)?;
            let decision = ability.evaluate(action, &value)?;
            (value.to_string(), decision)
        }
        (None, Some(name)) => {
            let subject: SubjectType = name.parse()?;
            (subject.to_string(), ability.evaluate(action, subject)?)
        }
        (None, None) => bail!("Either --subject-json or --subject-type is required"),
    };

    let result = CheckResult {
        principal: user_id.to_string(),
        role: ability.principal().role,
        action,
        subject,
        decision: decision.label(),
        reason: decision.to_string(),
        rule: decision
            .rule_index()
            .and_then(|index| ability.rule(index))
            .map(ToString::to_string),
    };

    match format {
        OutputFormat::Table => {
            let summary = format!("{} {} {}", result.role, result.action, result.subject);
            if decision.is_allowed() {
                output::print_success(&summary);
            } else {
                output::print_denied(&summary);
            }
            output::print_detail("Reason", &result.reason);
            if let Some(rule) = &result.rule {
                output::print_detail("Rule", rule);
            }
        }
        _ => output::print_item(&result, format)?,
    }
    Ok(())
}
