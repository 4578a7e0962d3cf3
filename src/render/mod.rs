//! Config rendering through a `(role, platform)` template registry.
//!
//! Templates are tera templates rendered in raw text mode: autoescaping is switched
//! off for every template, since device configuration is not markup.

pub mod artifacts;
pub mod templates;

use serde_json::Value;
use std::collections::HashMap;
use tera::{Context, Tera};
use thiserror::Error;

use crate::models::{DeviceRole, PlatformId, RenderContext};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("no template registered for platform {platform} with role {role}")]
    UnknownPlatform { platform: String, role: String },
    #[error("{device}: required field {field} is missing for template {template}")]
    MissingRequiredField {
        device: String,
        field: String,
        template: String,
    },
    #[error("template {template} failed to render: {message}")]
    TemplateRenderError { template: String, message: String },
}

/// TemplateEntry is what the registry resolves a (role, platform) pair to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateEntry {
    pub name: String,
    pub required_fields: Vec<String>,
}

/// Context fields a role's template cannot render without
pub fn required_fields(role: DeviceRole) -> &'static [&'static str] {
    match role {
        DeviceRole::Spine => &["interface_roles.loopback"],
        DeviceRole::Leaf | DeviceRole::BorderLeaf => &["interface_roles.all_physical"],
        DeviceRole::Edge => &["interface_roles.loopback", "interface_roles.peering"],
        DeviceRole::Firewall | DeviceRole::Loadbalancer => &["interfaces"],
        DeviceRole::Console | DeviceRole::Oob => &[],
    }
}

/// Walk a dotted path through a JSON value. Absent means missing, null, or empty.
pub fn field_present(value: &Value, path: &str) -> bool {
    let mut current = value;
    for segment in path.split('.') {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(v) => current = v,
            None => return false,
        }
    }
    match current {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}

/// Flatten a tera error and its sources into one line
fn error_message(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

pub struct Renderer {
    tera: Tera,
    registry: HashMap<(DeviceRole, PlatformId), TemplateEntry>,
}

impl Renderer {
    /// Renderer with no templates registered
    pub fn empty() -> Self {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        Renderer {
            tera,
            registry: HashMap::new(),
        }
    }

    /// Renderer with the built-in vendor templates and the lab topology template
    pub fn new() -> Result<Self, RenderError> {
        let mut renderer = Self::empty();
        for builtin in templates::builtin_templates() {
            renderer.register(
                builtin.role,
                PlatformId::new(builtin.platform),
                builtin.name,
                builtin.content,
                required_fields(builtin.role).iter().map(|f| f.to_string()).collect(),
            )?;
        }
        renderer.add_template(templates::LAB_TOPOLOGY, templates::LAB_TOPOLOGY_TEMPLATE)?;
        tracing::debug!("Loaded {} template registrations", renderer.registry.len());
        Ok(renderer)
    }

    /// Load a template body; an existing template of the same name is replaced
    fn add_template(&mut self, name: &str, content: &str) -> Result<(), RenderError> {
        self.tera
            .add_raw_template(name, content)
            .map_err(|e| RenderError::TemplateRenderError {
                template: name.to_string(),
                message: error_message(&e),
            })
    }

    /// Register (or replace) the template for a role on a platform
    pub fn register(
        &mut self,
        role: DeviceRole,
        platform: PlatformId,
        name: &str,
        content: &str,
        required_fields: Vec<String>,
    ) -> Result<(), RenderError> {
        self.add_template(name, content)?;
        self.registry.insert(
            (role, platform),
            TemplateEntry {
                name: name.to_string(),
                required_fields,
            },
        );
        Ok(())
    }

    pub fn entry(&self, role: DeviceRole, platform: &PlatformId) -> Option<&TemplateEntry> {
        self.registry.get(&(role, platform.clone()))
    }

    /// Render the configuration for one device. Either full text or an error, never partial
    /// output.
    pub fn render(
        &self,
        context: &RenderContext,
        platform: &PlatformId,
    ) -> Result<String, RenderError> {
        let role = context.role.ok_or_else(|| RenderError::MissingRequiredField {
            device: context.hostname.clone(),
            field: "role".to_string(),
            template: platform.to_string(),
        })?;

        let entry = self.entry(role, platform).ok_or_else(|| RenderError::UnknownPlatform {
            platform: platform.to_string(),
            role: role.to_string(),
        })?;

        let value = serde_json::to_value(context).map_err(|e| RenderError::TemplateRenderError {
            template: entry.name.clone(),
            message: e.to_string(),
        })?;

        for field in &entry.required_fields {
            if !field_present(&value, field) {
                return Err(RenderError::MissingRequiredField {
                    device: context.hostname.clone(),
                    field: field.clone(),
                    template: entry.name.clone(),
                });
            }
        }

        self.render_value(&entry.name, value)
    }

    /// Render a registered template by name against an arbitrary serializable context
    pub fn render_value(&self, template: &str, value: Value) -> Result<String, RenderError> {
        let context = Context::from_value(value).map_err(|e| RenderError::TemplateRenderError {
            template: template.to_string(),
            message: error_message(&e),
        })?;
        self.tera
            .render(template, &context)
            .map_err(|e| RenderError::TemplateRenderError {
                template: template.to_string(),
                message: error_message(&e),
            })
    }
}
