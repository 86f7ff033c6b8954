/// Action handler registry
///
/// One handler per node type, registered in a lookup table built at
/// startup. Each handler validates its own required configuration
/// fields, performs exactly one category of side effect, and either
/// returns an ActionResult or fails the node with a descriptive error.
/// Handlers never retry; retry policy belongs to the transport.
///
/// Every configuration string passes through the variable resolver
/// before use - this is mandatory, not per-handler discretion.

use crate::automation::Node;
use crate::contact::{Contact, ContactStorage};
use crate::crm::DealStorage;
use crate::messaging::{ChannelProfile, MessageTransport, ReplyButton, TemplateStorage};
use crate::runtime::variables::{resolve_json_template, resolve_template, stringify, ResolveContext};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};

/// Everything a handler may read during one node execution
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a> {
    /// Acting contact, when the trigger resolved one
    pub contact: Option<&'a Contact>,
    /// Opaque trigger payload, read-only
    pub trigger_payload: Option<&'a Value>,
    /// The node being executed (configuration source)
    pub node: &'a Node,
    /// Automation being run
    pub automation_id: &'a str,
    /// Owning team identifier
    pub team_id: &'a str,
    /// Sending channel identity
    pub profile: &'a ChannelProfile,
}

impl<'a> ActionContext<'a> {
    /// Variable-resolver view of this context
    pub fn resolve_ctx(&self) -> ResolveContext<'a> {
        ResolveContext {
            contact: self.contact,
            trigger_payload: self.trigger_payload,
        }
    }

    /// The acting contact, or a descriptive error for entity-less runs
    fn require_contact(&self) -> Result<&'a Contact> {
        self.contact.ok_or_else(|| {
            anyhow::anyhow!(
                "{} node '{}' requires an acting contact, but this run has none",
                self.node.data.node_type,
                self.node.id
            )
        })
    }

    /// Required string field from the node configuration
    fn required_str(&self, field: &str) -> Result<&'a str> {
        self.node
            .data
            .config
            .get(field)
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "{} node missing '{}' parameter",
                    self.node.data.node_type,
                    field
                )
            })
    }

    /// Optional string field from the node configuration
    fn optional_str(&self, field: &str) -> Option<&'a str> {
        self.node.data.config.get(field).and_then(|v| v.as_str())
    }
}

/// Return contract of every action handler
#[derive(Debug, Clone, Default)]
pub struct ActionResult {
    /// Updated contact snapshot, present iff the handler mutated it
    pub updated_contact: Option<Contact>,
    /// Human-readable outcome detail for the node log
    pub details: Option<String>,
    /// Named exit selecting the outgoing edge (branching nodes only)
    pub output_handle: Option<String>,
}

impl ActionResult {
    fn with_details(details: String) -> Self {
        Self {
            details: Some(details),
            ..Self::default()
        }
    }
}

/// Async handler contract, one implementation per node type
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(&self, ctx: &ActionContext<'_>) -> Result<ActionResult>;
}

/// Lookup table from node type discriminator to handler
///
/// Re-registering a type overwrites the previous handler (last write
/// wins), mirroring map-insert semantics.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

/// Shared collaborators the built-in handlers are constructed over
#[derive(Clone)]
pub struct HandlerServices {
    pub contacts: ContactStorage,
    pub templates: TemplateStorage,
    pub deals: DealStorage,
    pub transport: Arc<dyn MessageTransport>,
    pub http: reqwest::Client,
}

impl HandlerRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with every built-in handler
    pub fn builtin(services: HandlerServices) -> Self {
        let mut registry = Self::new();

        registry.register(
            "send_template",
            Arc::new(SendTemplateHandler {
                templates: services.templates.clone(),
                transport: Arc::clone(&services.transport),
            }),
        );
        registry.register(
            "send_text_message",
            Arc::new(SendTextHandler {
                transport: Arc::clone(&services.transport),
            }),
        );
        registry.register(
            "send_media",
            Arc::new(SendMediaHandler {
                transport: Arc::clone(&services.transport),
            }),
        );
        registry.register(
            "send_interactive_message",
            Arc::new(SendInteractiveHandler {
                transport: Arc::clone(&services.transport),
            }),
        );
        registry.register(
            "add_tag",
            Arc::new(AddTagHandler {
                contacts: services.contacts.clone(),
            }),
        );
        registry.register(
            "remove_tag",
            Arc::new(RemoveTagHandler {
                contacts: services.contacts.clone(),
            }),
        );
        registry.register(
            "set_custom_field",
            Arc::new(SetCustomFieldHandler {
                contacts: services.contacts.clone(),
            }),
        );
        registry.register(
            "send_webhook",
            Arc::new(SendWebhookHandler {
                http: services.http.clone(),
            }),
        );
        registry.register(
            "create_deal",
            Arc::new(CreateDealHandler {
                deals: services.deals.clone(),
            }),
        );
        registry.register(
            "update_deal_stage",
            Arc::new(UpdateDealStageHandler {
                deals: services.deals.clone(),
            }),
        );
        registry.register("condition", Arc::new(ConditionHandler));
        registry.register("split_path", Arc::new(SplitPathHandler));

        registry
    }

    /// Register (or overwrite) the handler for a node type
    pub fn register(&mut self, node_type: &str, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(node_type.to_string(), handler);
    }

    /// Look up the handler for a node type
    pub fn get(&self, node_type: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(node_type).cloned()
    }
}

// ---------------------------------------------------------------------------
// Messaging handlers
// ---------------------------------------------------------------------------

/// Sends a pre-approved template message to the acting contact
///
/// Expected config: { "template_id": "tpl-welcome" }
struct SendTemplateHandler {
    templates: TemplateStorage,
    transport: Arc<dyn MessageTransport>,
}

#[async_trait]
impl ActionHandler for SendTemplateHandler {
    async fn execute(&self, ctx: &ActionContext<'_>) -> Result<ActionResult> {
        let contact = ctx.require_contact()?;
        let template_id = ctx.required_str("template_id")?;

        let template = self
            .templates
            .get_template(template_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Template not found: {}", template_id))?;

        let body = resolve_template(&template.body, &ctx.resolve_ctx());
        let message_id = self
            .transport
            .send_template(ctx.profile, &contact.phone, &template.name, &body)
            .await?;

        Ok(ActionResult::with_details(format!(
            "Sent template '{}' (message {}).",
            template.name, message_id
        )))
    }
}

/// Sends a free-form text message to the acting contact
///
/// Expected config: { "text": "Hello {{contact.name}}" }
struct SendTextHandler {
    transport: Arc<dyn MessageTransport>,
}

#[async_trait]
impl ActionHandler for SendTextHandler {
    async fn execute(&self, ctx: &ActionContext<'_>) -> Result<ActionResult> {
        let contact = ctx.require_contact()?;
        let text = resolve_template(ctx.required_str("text")?, &ctx.resolve_ctx());

        let message_id = self
            .transport
            .send_text(ctx.profile, &contact.phone, &text)
            .await?;

        Ok(ActionResult::with_details(format!(
            "Sent text message (message {}).",
            message_id
        )))
    }
}

/// Sends a media message by URL
///
/// Expected config: { "media_type": "image", "media_url": "https://...",
///                    "caption": "optional {{contact.name}}" }
struct SendMediaHandler {
    transport: Arc<dyn MessageTransport>,
}

#[async_trait]
impl ActionHandler for SendMediaHandler {
    async fn execute(&self, ctx: &ActionContext<'_>) -> Result<ActionResult> {
        let contact = ctx.require_contact()?;
        let media_type = ctx.required_str("media_type")?;
        let media_url = resolve_template(ctx.required_str("media_url")?, &ctx.resolve_ctx());
        let caption = ctx
            .optional_str("caption")
            .map(|c| resolve_template(c, &ctx.resolve_ctx()));

        let message_id = self
            .transport
            .send_media(
                ctx.profile,
                &contact.phone,
                media_type,
                &media_url,
                caption.as_deref(),
            )
            .await?;

        Ok(ActionResult::with_details(format!(
            "Sent {} message (message {}).",
            media_type, message_id
        )))
    }
}

/// Sends an interactive message with reply buttons
///
/// Expected config: { "text": "...", "buttons": [{ "id": "yes", "title": "Yes" }] }
struct SendInteractiveHandler {
    transport: Arc<dyn MessageTransport>,
}

#[async_trait]
impl ActionHandler for SendInteractiveHandler {
    async fn execute(&self, ctx: &ActionContext<'_>) -> Result<ActionResult> {
        let contact = ctx.require_contact()?;
        let text = resolve_template(ctx.required_str("text")?, &ctx.resolve_ctx());

        let buttons_value = ctx.node.data.config.get("buttons").cloned().ok_or_else(|| {
            anyhow::anyhow!("send_interactive_message node missing 'buttons' parameter")
        })?;
        let mut buttons: Vec<ReplyButton> = serde_json::from_value(buttons_value)
            .map_err(|e| anyhow::anyhow!("send_interactive_message 'buttons' malformed: {}", e))?;
        if buttons.is_empty() {
            return Err(anyhow::anyhow!(
                "send_interactive_message 'buttons' cannot be empty"
            ));
        }
        for button in &mut buttons {
            button.title = resolve_template(&button.title, &ctx.resolve_ctx());
        }

        let message_id = self
            .transport
            .send_interactive(ctx.profile, &contact.phone, &text, &buttons)
            .await?;

        Ok(ActionResult::with_details(format!(
            "Sent interactive message with {} buttons (message {}).",
            buttons.len(),
            message_id
        )))
    }
}

// ---------------------------------------------------------------------------
// Contact mutation handlers
// ---------------------------------------------------------------------------

/// Adds a tag to the acting contact and persists the change
///
/// Expected config: { "tag": "vip" }
struct AddTagHandler {
    contacts: ContactStorage,
}

#[async_trait]
impl ActionHandler for AddTagHandler {
    async fn execute(&self, ctx: &ActionContext<'_>) -> Result<ActionResult> {
        let contact = ctx.require_contact()?;
        let tag = resolve_template(ctx.required_str("tag")?, &ctx.resolve_ctx());

        if contact.has_tag(&tag) {
            return Ok(ActionResult::with_details(format!(
                "Contact already tagged '{}'.",
                tag
            )));
        }

        let mut updated = contact.clone();
        updated.tags.push(tag.clone());
        self.contacts.save_contact(&updated).await?;

        Ok(ActionResult {
            updated_contact: Some(updated),
            details: Some(format!("Added tag '{}'.", tag)),
            output_handle: None,
        })
    }
}

/// Removes a tag from the acting contact and persists the change
///
/// Expected config: { "tag": "lead" }
struct RemoveTagHandler {
    contacts: ContactStorage,
}

#[async_trait]
impl ActionHandler for RemoveTagHandler {
    async fn execute(&self, ctx: &ActionContext<'_>) -> Result<ActionResult> {
        let contact = ctx.require_contact()?;
        let tag = resolve_template(ctx.required_str("tag")?, &ctx.resolve_ctx());

        if !contact.has_tag(&tag) {
            return Ok(ActionResult::with_details(format!(
                "Contact was not tagged '{}'.",
                tag
            )));
        }

        let mut updated = contact.clone();
        updated.tags.retain(|t| t != &tag);
        self.contacts.save_contact(&updated).await?;

        Ok(ActionResult {
            updated_contact: Some(updated),
            details: Some(format!("Removed tag '{}'.", tag)),
            output_handle: None,
        })
    }
}

/// Sets a custom field on the acting contact and persists the change
///
/// Expected config: { "field": "city", "value": "{{trigger.body.city}}" }
/// Non-string values are stored as-is.
struct SetCustomFieldHandler {
    contacts: ContactStorage,
}

#[async_trait]
impl ActionHandler for SetCustomFieldHandler {
    async fn execute(&self, ctx: &ActionContext<'_>) -> Result<ActionResult> {
        let contact = ctx.require_contact()?;
        let field = ctx.required_str("field")?;
        let raw_value = ctx
            .node
            .data
            .config
            .get("value")
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("set_custom_field node missing 'value' parameter"))?;

        let value = match raw_value {
            Value::String(s) => Value::String(resolve_template(&s, &ctx.resolve_ctx())),
            other => other,
        };

        let mut updated = contact.clone();
        updated.custom_fields.insert(field.to_string(), value);
        self.contacts.save_contact(&updated).await?;

        Ok(ActionResult {
            updated_contact: Some(updated),
            details: Some(format!("Set custom field '{}'.", field)),
            output_handle: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Outbound webhook handler
// ---------------------------------------------------------------------------

/// Calls an arbitrary outbound webhook
///
/// Expected config: { "url": "https://...", "method": "POST",
///                    "headers": { "x-key": "{{contact.id}}" },
///                    "body": "{\"name\": \"{{contact.name}}\"}" }
/// The body is treated as a raw JSON template; a non-2xx response fails
/// the node.
struct SendWebhookHandler {
    http: reqwest::Client,
}

#[async_trait]
impl ActionHandler for SendWebhookHandler {
    async fn execute(&self, ctx: &ActionContext<'_>) -> Result<ActionResult> {
        let url = resolve_template(ctx.required_str("url")?, &ctx.resolve_ctx());
        let method = ctx.optional_str("method").unwrap_or("POST").to_uppercase();

        let mut request = match method.as_str() {
            "GET" => self.http.get(&url),
            "POST" => self.http.post(&url),
            "PUT" => self.http.put(&url),
            "PATCH" => self.http.patch(&url),
            "DELETE" => self.http.delete(&url),
            other => return Err(anyhow::anyhow!("Unsupported webhook method: {}", other)),
        };

        if let Some(headers) = ctx.node.data.config.get("headers").and_then(|h| h.as_object()) {
            for (key, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(key, resolve_template(value, &ctx.resolve_ctx()));
                }
            }
        }

        if let Some(body) = ctx.optional_str("body") {
            let resolved = resolve_json_template(body, &ctx.resolve_ctx());
            let payload: Value = serde_json::from_str(&resolved).map_err(|e| {
                anyhow::anyhow!("Webhook body is not valid JSON after substitution: {}", e)
            })?;
            request = request.json(&payload);
        }

        let response = request
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Webhook request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow::anyhow!(
                "Webhook {} {} responded {}",
                method,
                url,
                status.as_u16()
            ));
        }

        Ok(ActionResult::with_details(format!(
            "Webhook {} {} responded {}.",
            method,
            url,
            status.as_u16()
        )))
    }
}

// ---------------------------------------------------------------------------
// CRM handlers
// ---------------------------------------------------------------------------

/// Creates an open deal for the acting contact
///
/// Expected config: { "stage_id": "stage-new", "title": "{{contact.name}}'s deal" }
/// The title defaults to the contact name when omitted. The stage must
/// exist in the pipeline-stages reference table.
struct CreateDealHandler {
    deals: DealStorage,
}

#[async_trait]
impl ActionHandler for CreateDealHandler {
    async fn execute(&self, ctx: &ActionContext<'_>) -> Result<ActionResult> {
        let contact = ctx.require_contact()?;
        let stage_id = ctx.required_str("stage_id")?;
        let title = ctx
            .optional_str("title")
            .map(|t| resolve_template(t, &ctx.resolve_ctx()))
            .unwrap_or_else(|| contact.name.clone());

        let stage = self
            .deals
            .get_stage(stage_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Pipeline stage not found: {}", stage_id))?;

        let deal = self
            .deals
            .create_deal(&contact.id, ctx.team_id, &title, &stage.id)
            .await?;

        Ok(ActionResult::with_details(format!(
            "Created deal '{}' in stage '{}' ({}).",
            deal.title, stage.name, deal.id
        )))
    }
}

/// Advances the contact's most recent open deal to another stage
///
/// Expected config: { "stage_id": "stage-won" }
struct UpdateDealStageHandler {
    deals: DealStorage,
}

#[async_trait]
impl ActionHandler for UpdateDealStageHandler {
    async fn execute(&self, ctx: &ActionContext<'_>) -> Result<ActionResult> {
        let contact = ctx.require_contact()?;
        let stage_id = ctx.required_str("stage_id")?;

        let deal = self
            .deals
            .find_open_deal(&contact.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("No open deal found for contact {}", contact.id))?;

        self.deals.update_deal_stage(&deal.id, stage_id).await?;

        Ok(ActionResult::with_details(format!(
            "Moved deal '{}' to stage '{}'.",
            deal.title, stage_id
        )))
    }
}

// ---------------------------------------------------------------------------
// Logic handlers
// ---------------------------------------------------------------------------

/// Evaluates a structured predicate over the run context
///
/// Expected config: { "field": "contact.tags", "operator": "contains", "value": "vip" }
/// Returns output handle "true" or "false"; the graph keys its edges on
/// "{nodeId}-true" / "{nodeId}-false".
struct ConditionHandler;

#[async_trait]
impl ActionHandler for ConditionHandler {
    async fn execute(&self, ctx: &ActionContext<'_>) -> Result<ActionResult> {
        let outcome = evaluate_predicate(&ctx.node.data.config, ctx)?;
        let handle = if outcome { "true" } else { "false" };

        Ok(ActionResult {
            updated_contact: None,
            details: Some(format!("Condition evaluated to {}.", handle)),
            output_handle: Some(handle.to_string()),
        })
    }
}

/// Selects the first matching branch among several predicates
///
/// Expected config: { "branches": [{ "handle": "pt", "field": "...",
///                    "operator": "...", "value": "..." }],
///                    "fallback_handle": "other" }
struct SplitPathHandler;

#[async_trait]
impl ActionHandler for SplitPathHandler {
    async fn execute(&self, ctx: &ActionContext<'_>) -> Result<ActionResult> {
        let branches = ctx
            .node
            .data
            .config
            .get("branches")
            .and_then(|b| b.as_array())
            .ok_or_else(|| anyhow::anyhow!("split_path node missing 'branches' parameter"))?;

        for branch in branches {
            let handle = branch.get("handle").and_then(|h| h.as_str()).ok_or_else(|| {
                anyhow::anyhow!("split_path branch missing 'handle' parameter")
            })?;

            if evaluate_predicate(branch, ctx)? {
                return Ok(ActionResult {
                    updated_contact: None,
                    details: Some(format!("Selected path '{}'.", handle)),
                    output_handle: Some(handle.to_string()),
                });
            }
        }

        let fallback = ctx.optional_str("fallback_handle").unwrap_or("fallback");
        Ok(ActionResult {
            updated_contact: None,
            details: Some(format!("No branch matched, selected path '{}'.", fallback)),
            output_handle: Some(fallback.to_string()),
        })
    }
}

/// Evaluate one { field, operator, value } predicate against the context
fn evaluate_predicate(config: &Value, ctx: &ActionContext<'_>) -> Result<bool> {
    let field = config
        .get("field")
        .and_then(|f| f.as_str())
        .ok_or_else(|| anyhow::anyhow!("{} node missing 'field' parameter", ctx.node.data.node_type))?;
    let operator = config
        .get("operator")
        .and_then(|o| o.as_str())
        .ok_or_else(|| {
            anyhow::anyhow!("{} node missing 'operator' parameter", ctx.node.data.node_type)
        })?;

    let resolve_ctx = ctx.resolve_ctx();
    let actual = resolve_ctx.lookup(field);

    // exists/not_exists need no comparison value
    match operator {
        "exists" => return Ok(actual.is_some()),
        "not_exists" => return Ok(actual.is_none()),
        _ => {}
    }

    let expected_raw = config
        .get("value")
        .ok_or_else(|| anyhow::anyhow!("{} node missing 'value' parameter", ctx.node.data.node_type))?;
    let expected = match expected_raw {
        Value::String(s) => resolve_template(s, &resolve_ctx),
        other => stringify(other),
    };

    let Some(actual) = actual else {
        // Unresolved operand: every comparison is false
        return Ok(false);
    };
    let actual_text = stringify(&actual);

    let result = match operator {
        "equals" => actual_text == expected,
        "not_equals" => actual_text != expected,
        "contains" => match &actual {
            Value::Array(items) => items.iter().any(|item| stringify(item) == expected),
            _ => actual_text.contains(&expected),
        },
        "greater_than" => match (actual_text.parse::<f64>(), expected.parse::<f64>()) {
            (Ok(a), Ok(b)) => a > b,
            _ => false,
        },
        "less_than" => match (actual_text.parse::<f64>(), expected.parse::<f64>()) {
            (Ok(a), Ok(b)) => a < b,
            _ => false,
        },
        other => {
            return Err(anyhow::anyhow!(
                "Unknown predicate operator '{}' on node '{}'",
                other,
                ctx.node.id
            ))
        }
    };

    Ok(result)
}
