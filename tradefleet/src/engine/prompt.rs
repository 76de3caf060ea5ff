use super::context::PromptContext;
use chrono::{DateTime, FixedOffset};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tradefleet_market::calendar::china_now;
use uuid::Uuid;

/// A reusable prompt template with `{{variable}}` placeholders over the flat
/// context dictionary.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct PromptTemplate {
    pub id: Uuid,
    pub name: String,
    pub content: String,
    pub version: u32,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum TemplateError {
    #[error("template not found: {0}")]
    NotFound(Uuid),

    #[error("template content is empty")]
    Empty,

    #[error("unclosed placeholder at byte {0}")]
    UnclosedPlaceholder(usize),
}

/// In-memory template registry with versioned updates.
#[derive(Debug, Default)]
pub struct PromptLibrary {
    templates: RwLock<HashMap<Uuid, PromptTemplate>>,
}

impl PromptLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store a new template.
    pub fn create(&self, name: &str, content: &str) -> Result<PromptTemplate, TemplateError> {
        validate_template(content)?;

        let now = china_now();
        let template = PromptTemplate {
            id: Uuid::new_v4(),
            name: name.to_string(),
            content: content.to_string(),
            version: 1,
            created_at: now,
            updated_at: now,
        };
        self.templates
            .write()
            .insert(template.id, template.clone());
        Ok(template)
    }

    pub fn get(&self, id: Uuid) -> Option<PromptTemplate> {
        self.templates.read().get(&id).cloned()
    }

    /// Update a template's name and/or content, bumping its version.
    pub fn update(
        &self,
        id: Uuid,
        name: Option<&str>,
        content: Option<&str>,
    ) -> Result<PromptTemplate, TemplateError> {
        if let Some(content) = content {
            validate_template(content)?;
        }

        let mut templates = self.templates.write();
        let template = templates.get_mut(&id).ok_or(TemplateError::NotFound(id))?;

        if let Some(name) = name {
            template.name = name.to_string();
        }
        if let Some(content) = content {
            template.content = content.to_string();
        }
        template.version += 1;
        template.updated_at = china_now();
        Ok(template.clone())
    }

    pub fn delete(&self, id: Uuid) -> bool {
        self.templates.write().remove(&id).is_some()
    }

    pub fn list(&self) -> Vec<PromptTemplate> {
        let mut templates = self
            .templates
            .read()
            .values()
            .cloned()
            .collect::<Vec<_>>();
        templates.sort_by_key(|template| template.created_at);
        templates
    }

    /// Render the identified template over the context's flat dictionary.
    pub fn render(&self, id: Uuid, context: &PromptContext) -> Result<String, TemplateError> {
        let template = self.get(id).ok_or(TemplateError::NotFound(id))?;
        render_template(&template.content, &context.flat_map())
    }
}

/// Check a template parses: non-empty, every `{{` closed by `}}`.
pub fn validate_template(content: &str) -> Result<(), TemplateError> {
    if content.trim().is_empty() {
        return Err(TemplateError::Empty);
    }

    let mut rest = content;
    let mut offset = 0;
    while let Some(open) = rest.find("{{") {
        let after = &rest[open + 2..];
        match after.find("}}") {
            Some(close) => {
                offset += open + 2 + close + 2;
                rest = &after[close + 2..];
            }
            None => return Err(TemplateError::UnclosedPlaceholder(offset + open)),
        }
    }
    Ok(())
}

/// Substitute `{{variable}}` placeholders from `vars`; unknown variables
/// render empty so templates tolerate missing context fields.
pub fn render_template(
    content: &str,
    vars: &HashMap<&'static str, String>,
) -> Result<String, TemplateError> {
    validate_template(content)?;

    let mut rendered = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(open) = rest.find("{{") {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        // validate_template guarantees the closing braces exist.
        let close = after.find("}}").unwrap_or(after.len());
        let key = after[..close].trim();
        if let Some(value) = vars.get(key) {
            rendered.push_str(value);
        }
        rest = &after[(close + 2).min(after.len())..];
    }
    rendered.push_str(rest);

    Ok(rendered)
}

/// Built-in prompt used when an agent has no template or its template fails
/// to render. Carries the same core blocks every template receives.
pub fn default_prompt(context: &PromptContext) -> String {
    let vars = context.flat_map();
    let block = |key: &str| vars.get(key).map(String::as_str).unwrap_or("n/a");

    format!(
        "You are a professional A-share quantitative trading analyst. Review the \
         data below and decide what to trade today.\n\
         \n\
         ## Time\n\
         {date} ({weekday}) {time}, trading day: {trading_day}\n\
         \n\
         ## Portfolio\n\
         cash: {cash}\n\
         market value: {market_value}\n\
         total assets: {total_assets}\n\
         return rate: {return_rate}\n\
         positions: {positions}\n\
         \n\
         ## Market summary\n\
         {market_summary}\n\
         \n\
         ## Hot stocks (recent quotes)\n\
         {hot_stocks_quotes}\n\
         \n\
         ## Position quotes\n\
         {positions_quotes}\n\
         \n\
         ## Sentiment score\n\
         {sentiment}\n\
         \n\
         Reply with a JSON array of decisions. Each decision:\n\
         {{\"decision\": \"buy\" | \"sell\" | \"hold\" | \"wait\", \
         \"stock_code\": \"6-digit code\", \
         \"quantity\": multiple of 100, \
         \"price\": limit price, \
         \"reason\": \"your rationale\"}}\n\
         Reply with [] if no action is warranted.",
        date = block("current_date"),
        weekday = block("current_weekday"),
        time = block("current_time"),
        trading_day = block("is_trading_day"),
        cash = block("cash"),
        market_value = block("market_value"),
        total_assets = block("total_assets"),
        return_rate = block("return_rate"),
        positions = block("positions"),
        market_summary = block("market_summary"),
        hot_stocks_quotes = block("hot_stocks_quotes"),
        positions_quotes = block("positions_quotes"),
        sentiment = block("sentiment_score"),
    )
}
