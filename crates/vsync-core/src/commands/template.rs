//! `{{ .Name }}` templates for command steps
//!
//! Templates are parsed once when the configuration loads. Every placeholder
//! must name a known [`TemplateField`], so an unknown field surfaces before
//! the first attempt instead of at render time.

use std::fmt;

use crate::client::{Client, Cluster};
use crate::role::Role;

/// Fields a command template may reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateField {
    CommandIndex,
    CommandsCount,
    ValidatorClient,
    ValidatorRpcUrl,
    ValidatorRole,
    ValidatorRoleIsActive,
    ValidatorRoleIsPassive,
    ValidatorIdentityPublicKey,
    ClusterName,
    Hostname,
    VersionFrom,
    VersionTo,
    SyncIsSfdpComplianceEnabled,
}

impl TemplateField {
    pub const ALL: [TemplateField; 13] = [
        Self::CommandIndex,
        Self::CommandsCount,
        Self::ValidatorClient,
        Self::ValidatorRpcUrl,
        Self::ValidatorRole,
        Self::ValidatorRoleIsActive,
        Self::ValidatorRoleIsPassive,
        Self::ValidatorIdentityPublicKey,
        Self::ClusterName,
        Self::Hostname,
        Self::VersionFrom,
        Self::VersionTo,
        Self::SyncIsSfdpComplianceEnabled,
    ];

    /// Name as written inside a template
    pub fn name(&self) -> &'static str {
        match self {
            Self::CommandIndex => "CommandIndex",
            Self::CommandsCount => "CommandsCount",
            Self::ValidatorClient => "ValidatorClient",
            Self::ValidatorRpcUrl => "ValidatorRPCURL",
            Self::ValidatorRole => "ValidatorRole",
            Self::ValidatorRoleIsActive => "ValidatorRoleIsActive",
            Self::ValidatorRoleIsPassive => "ValidatorRoleIsPassive",
            Self::ValidatorIdentityPublicKey => "ValidatorIdentityPublicKey",
            Self::ClusterName => "ClusterName",
            Self::Hostname => "Hostname",
            Self::VersionFrom => "VersionFrom",
            Self::VersionTo => "VersionTo",
            Self::SyncIsSfdpComplianceEnabled => "SyncIsSFDPComplianceEnabled",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    pub fn all_names() -> Vec<&'static str> {
        Self::ALL.iter().map(TemplateField::name).collect()
    }
}

impl fmt::Display for TemplateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Values available to templates while one step renders
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub command_index: usize,
    pub commands_count: usize,
    pub client: Client,
    pub rpc_url: String,
    pub role: Role,
    pub identity_public_key: String,
    pub cluster: Cluster,
    pub hostname: String,
    pub version_from: String,
    pub version_to: String,
    pub sfdp_compliance_enabled: bool,
}

impl CommandContext {
    /// Copy of this context positioned at step `index`
    pub fn for_step(&self, index: usize, count: usize) -> Self {
        Self {
            command_index: index,
            commands_count: count,
            ..self.clone()
        }
    }

    pub fn value(&self, field: TemplateField) -> String {
        match field {
            TemplateField::CommandIndex => self.command_index.to_string(),
            TemplateField::CommandsCount => self.commands_count.to_string(),
            TemplateField::ValidatorClient => self.client.to_string(),
            TemplateField::ValidatorRpcUrl => self.rpc_url.clone(),
            TemplateField::ValidatorRole => self.role.to_string(),
            TemplateField::ValidatorRoleIsActive => self.role.is_active().to_string(),
            TemplateField::ValidatorRoleIsPassive => self.role.is_passive().to_string(),
            TemplateField::ValidatorIdentityPublicKey => self.identity_public_key.clone(),
            TemplateField::ClusterName => self.cluster.to_string(),
            TemplateField::Hostname => self.hostname.clone(),
            TemplateField::VersionFrom => self.version_from.clone(),
            TemplateField::VersionTo => self.version_to.clone(),
            TemplateField::SyncIsSfdpComplianceEnabled => self.sfdp_compliance_enabled.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(TemplateField),
}

/// A parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse `source`, returning the reason on failure
    pub fn parse(source: &str) -> std::result::Result<Self, String> {
        let mut segments = Vec::new();
        let mut rest = source;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or_else(|| {
                format!(
                    "unclosed action at offset {}",
                    source.len() - rest.len() + start
                )
            })?;

            let action = after[..end].trim();
            if action.is_empty() {
                return Err("empty action".to_string());
            }
            let name = action
                .strip_prefix('.')
                .filter(|n| !n.is_empty())
                .ok_or_else(|| format!("unsupported action \"{action}\" (expected .Name)"))?;
            let field = TemplateField::parse(name).ok_or_else(|| {
                format!(
                    "unknown field .{name} (must be one of {})",
                    TemplateField::all_names().join(", ")
                )
            })?;
            segments.push(Segment::Field(field));
            rest = &after[end + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Fields referenced by this template, in order of appearance
    pub fn fields(&self) -> impl Iterator<Item = TemplateField> + '_ {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(f) => Some(*f),
            Segment::Literal(_) => None,
        })
    }

    pub fn render(&self, context: &CommandContext) -> String {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(field) => out.push_str(&context.value(*field)),
            }
        }
        out
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
