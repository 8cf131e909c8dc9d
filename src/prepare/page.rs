//! HTML pages for the browser session.
//!
//! Every provider field is prefixed with `<index>-<ProviderClass>.` where
//! index is the requirement's position, so several providers can share
//! one form.

use std::collections::BTreeMap;

use crate::plugins::{ConfigForm, FormField, Provider, ProviderConfig, RequirementStatus, SOURCE_FIELD};
use crate::sys::{decode_form, html_escape};

const STYLE: &str = "body{font-family:sans-serif;max-width:48em;margin:2em auto}\
.requirement{border:1px solid #ccc;border-radius:4px;padding:0.5em 1em;margin:1em 0}\
.error{color:#b00}ul.choices{list-style:none;padding-left:0}";

/// Form prefix for one provider of the requirement at `index`.
pub(crate) fn field_prefix(index: usize, provider: &dyn Provider) -> String {
    format!("{}-{}", index, provider.class_name())
}

/// One unmet requirement as it appears on the page.
pub(crate) struct Section<'a> {
    pub index: usize,
    pub status: &'a RequirementStatus,
    pub provider: Option<&'a dyn Provider>,
    pub form: Option<ConfigForm>,
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{title}</title>\
<style>{STYLE}</style></head><body>\n{body}</body></html>\n",
        title = html_escape(title),
    )
}

fn render_field(prefix: &str, field: &FormField) -> String {
    match field {
        FormField::Text {
            name,
            value,
            secret,
        } => format!(
            "<input type=\"{}\" name=\"{}.{}\" value=\"{}\">",
            if *secret { "password" } else { "text" },
            html_escape(prefix),
            html_escape(name),
            if *secret { String::new() } else { html_escape(value) }
        ),
        FormField::Select {
            name,
            options,
            selected,
        } => {
            let options: String = options
                .iter()
                .map(|option| {
                    format!(
                        "<option value=\"{0}\"{1}>{0}</option>",
                        html_escape(option),
                        if option == selected { " selected" } else { "" }
                    )
                })
                .collect();
            format!(
                "<select name=\"{}.{}\">{}</select>",
                html_escape(prefix),
                html_escape(name),
                options
            )
        }
    }
}

fn render_section(section: &Section<'_>) -> String {
    let requirement = section.status.requirement();
    let mut html = format!(
        "<div class=\"requirement\">\n<h3>{}</h3>\n<p>{}</p>\n",
        html_escape(&requirement.title()),
        html_escape(section.status.status_description())
    );
    if let Some(error) = section.status.provide_error() {
        html.push_str(&format!("<p class=\"error\">{}</p>\n", html_escape(error)));
    }

    if let (Some(provider), Some(form)) = (section.provider, &section.form) {
        let prefix = field_prefix(section.index, provider);
        html.push_str("<ul class=\"choices\">\n");
        for choice in &form.choices {
            let checked = if choice.value == form.selected { " checked" } else { "" };
            html.push_str(&format!(
                "<li><label><input type=\"radio\" name=\"{}.{}\" value=\"{}\"{}> {}</label>",
                html_escape(&prefix),
                SOURCE_FIELD,
                html_escape(&choice.value),
                checked,
                html_escape(&choice.label)
            ));
            if let Some(field) = &choice.field {
                html.push(' ');
                html.push_str(&render_field(&prefix, field));
            }
            html.push_str("</li>\n");
        }
        html.push_str("</ul>\n");
    }
    html.push_str("</div>\n");
    html
}

/// The page asking the user to resolve unmet requirements.
pub(crate) fn render_form(project_name: &str, sections: &[Section<'_>]) -> String {
    let mut body = format!(
        "<h1>Set up {}</h1>\n<form method=\"post\" action=\"/\">\n",
        html_escape(project_name)
    );
    for section in sections {
        body.push_str(&render_section(section));
    }
    body.push_str("<input type=\"submit\" value=\"Continue\">\n</form>\n");
    page(&format!("Set up {}", project_name), &body)
}

/// The page shown once everything is met.
pub(crate) fn render_done(project_name: &str, statuses: &[RequirementStatus]) -> String {
    let items: String = statuses
        .iter()
        .map(|s| format!("<li>{}</li>\n", html_escape(s.status_description())))
        .collect();
    page(
        &format!("{} is ready", project_name),
        &format!(
            "<h1>Done!</h1>\n<p>You can close this window now.</p>\n<ul>\n{}</ul>\n",
            items
        ),
    )
}

/// The page shown when the session ends without success.
pub(crate) fn render_failed(project_name: &str, errors: &[String]) -> String {
    let items: String = errors
        .iter()
        .map(|e| format!("<li>{}</li>\n", html_escape(e)))
        .collect();
    page(
        &format!("{} could not be prepared", project_name),
        &format!(
            "<h1>Something went wrong</h1>\n<ul class=\"error\">\n{}</ul>\n",
            items
        ),
    )
}

/// Group a form body by field prefix.
///
/// `0-EnvVarProvider.source=variables` lands in the `0-EnvVarProvider`
/// group as `source`. Fields without a prefix are ignored.
pub(crate) fn parse_form(body: &str) -> BTreeMap<String, ProviderConfig> {
    let mut groups: BTreeMap<String, ProviderConfig> = BTreeMap::new();
    for (key, value) in decode_form(body) {
        if let Some((prefix, field)) = key.split_once('.') {
            groups
                .entry(prefix.to_string())
                .or_default()
                .insert(field.to_string(), value);
        }
    }
    groups
}
