//! Response rendering with Handlebars
//!
//! Prompt templates use `{{arg}}` placeholders filled from the command's
//! arguments. Output is not HTML-escaped.
use handlebars::{no_escape, Context, Handlebars, Helper, HelperDef, HelperResult, Output, RenderContext};
use orchestra_core::{OrchestraError, Result};
use serde::Serialize;
use serde_json::{Map, Value};

const RESPONSE_TEMPLATE: &str = "\
{{#if system_prompt}}{{system_prompt}}\n\n{{/if}}\
{{body}}\
{{#if style}}\n\nStyle: {{style}}{{/if}}\
{{#if criteria}}\n\n## Quality Gates ({{join gate_ids \", \"}})\n{{#each criteria}}- {{this}}\n{{/each}}\
{{#if review}}\nAfter completing the step respond with `GATE_REVIEW: PASS|FAIL - <reason>`.{{/if}}{{/if}}\
{{#if retry}}\n\n[Retry] Previous attempt rejected: {{retry}}{{/if}}\
{{#if reminder}}\n\n---\n{{reminder}}{{/if}}";

/// Data for the response template
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResponseView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    pub gate_ids: Vec<String>,
    pub criteria: Vec<String>,
    /// Whether a verdict is requested for the criteria
    pub review: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder: Option<String>,
}

pub struct ResponseRenderer {
    handlebars: Handlebars<'static>,
}

impl ResponseRenderer {
    pub fn new() -> Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        handlebars.register_escape_fn(no_escape);
        handlebars.register_helper("join", Box::new(JoinHelper));
        handlebars
            .register_template_string("response", RESPONSE_TEMPLATE)
            .map_err(|e| OrchestraError::Config(format!("response template: {}", e)))?;
        Ok(Self { handlebars })
    }

    /// Fill a prompt template with command arguments
    pub fn render_prompt(&self, template: &str, args: &Map<String, Value>) -> Result<String> {
        self.handlebars
            .render_template(template, &Value::Object(args.clone()))
            .map_err(|e| OrchestraError::ExternalLookup(format!("prompt template: {}", e)))
    }

    pub fn render_response(&self, view: &ResponseView) -> Result<String> {
        let rendered = self
            .handlebars
            .render("response", view)
            .map_err(|e| OrchestraError::Config(format!("response template: {}", e)))?;
        Ok(rendered.trim_end().to_string())
    }
}

/// `{{join list ", "}}`
struct JoinHelper;

impl HelperDef for JoinHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _r: &'reg Handlebars<'reg>,
        _ctx: &'rc Context,
        _rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let separator = h.param(1).and_then(|v| v.value().as_str()).unwrap_or(", ");
        if let Some(items) = h.param(0).and_then(|v| v.value().as_array()) {
            let strings: Vec<String> = items
                .iter()
                .map(|v| v.as_str().map(String::from).unwrap_or_else(|| v.to_string()))
                .collect();
            out.write(&strings.join(separator))?;
        }
        Ok(())
    }
}
