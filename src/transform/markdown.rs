//! Markdown rendering for issue documents.
//!
//! Output follows the Kapa.ai ingestion guidance: one H1 per document, bold
//! metadata lines with readable timestamps, `## Description` and
//! `## Conversation` sections, one `###` header per message.

use crate::store::StoredRecord;
use crate::Platform;
use chrono::DateTime;
use serde_json::{json, Value};

/// A rendered markdown document plus its index fields.
#[derive(Debug, Clone)]
pub struct Document {
    /// Output filename, `<identifier>_<cleaned-title>.md`
    pub file_name: String,
    /// Index title
    pub title: String,
    /// Link back to the source platform, if the payload carried one
    pub url: Option<String>,
    /// Index metadata object
    pub metadata: Value,
    /// Full markdown body
    pub body: String,
}

/// Render one issue and its comment thread.
///
/// Returns `None` when the payload has no usable title, which in practice
/// means the record is not an issue at all.
pub fn render_issue(
    platform: Platform,
    issue: &StoredRecord,
    comments: &[StoredRecord],
) -> Option<Document> {
    match platform {
        Platform::Pylon => render_pylon(issue, comments),
        Platform::Linear => render_linear(issue, comments),
    }
}

fn render_pylon(issue: &StoredRecord, comments: &[StoredRecord]) -> Option<Document> {
    let payload = &issue.payload;
    let title = str_field(payload, "title")?;
    let number = payload
        .get("number")
        .and_then(Value::as_u64)
        .map(|n| n.to_string())
        .unwrap_or_else(|| issue.external_id.clone());
    let state = str_field(payload, "state").unwrap_or_else(|| "unknown".to_string());
    let link = str_field(payload, "link");
    let created_at = str_field(payload, "created_at");

    let mut md = Vec::new();
    md.push(format!("# Pylon Issue: #{number} - {title}"));
    md.push(String::new());
    md.push(format!("**Status**: {}", title_case(&state)));
    md.push(String::new());
    if let Some(created) = &created_at {
        md.push(format!("**Created**: {}", format_timestamp(created)));
        md.push(String::new());
    }
    if let Some(link) = &link {
        md.push(format!("**Pylon Link**: {link}"));
        md.push(String::new());
    }
    push_custom_fields(&mut md, payload);
    md.push("---".to_string());
    md.push(String::new());

    if let Some(body_html) = str_field(payload, "body_html").filter(|b| !b.is_empty()) {
        md.push("## Description".to_string());
        md.push(String::new());
        md.push(html_to_markdown(&body_html));
        md.push(String::new());
    }

    if !comments.is_empty() {
        md.push("## Conversation".to_string());
        md.push(String::new());
        for comment in comments {
            push_pylon_message(&mut md, &comment.payload);
        }
    }

    let file_name = format!("{number}_{}.md", clean_filename(&title));
    let metadata = json!({
        "ticket_id": issue.external_id,
        "ticket_number": number,
        "state": state,
        "created_at": created_at,
        "total_messages": comments.len(),
    });
    Some(Document {
        file_name,
        title: format!("Support Ticket #{number}: {title}"),
        url: link,
        metadata,
        body: md.join("\n"),
    })
}

fn push_pylon_message(md: &mut Vec<String>, message: &Value) {
    let author = message.get("author").cloned().unwrap_or(Value::Null);
    let author_name = author
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
        .to_string();
    // Pylon distinguishes customers from agents by which identity object
    // the author carries.
    let author_type = if author.get("contact").is_some() {
        "Customer"
    } else if author.get("user").is_some() {
        "Support"
    } else {
        "Unknown"
    };
    let private = message
        .get("is_private")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let privacy = if private { " (Private)" } else { "" };

    md.push(format!("### {author_type}: {author_name}{privacy}"));
    if let Some(ts) = str_field(message, "timestamp") {
        md.push(format!("*{}*", format_timestamp(&ts)));
    }
    md.push(String::new());
    if let Some(html) = str_field(message, "message_html").filter(|h| !h.is_empty()) {
        md.push(html_to_markdown(&html));
    }
    if let Some(urls) = message.get("file_urls").and_then(Value::as_array) {
        if !urls.is_empty() {
            md.push(String::new());
            md.push("**Attachments:**".to_string());
            for url in urls.iter().filter_map(Value::as_str) {
                md.push(format!("- {url}"));
            }
        }
    }
    md.push(String::new());
    md.push("---".to_string());
    md.push(String::new());
}

fn push_custom_fields(md: &mut Vec<String>, payload: &Value) {
    let fields = match payload.get("custom_fields").and_then(Value::as_object) {
        Some(fields) => fields,
        None => return,
    };
    for (name, data) in fields {
        let values: Vec<&str> = data
            .get("values")
            .and_then(Value::as_array)
            .map(|v| v.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        if !values.is_empty() {
            md.push(format!(
                "**{}**: {}",
                title_case(&name.replace('_', " ")),
                values.join(", ")
            ));
            md.push(String::new());
        }
    }
}

fn render_linear(issue: &StoredRecord, comments: &[StoredRecord]) -> Option<Document> {
    let payload = &issue.payload;
    let title = str_field(payload, "title")?;
    let identifier =
        str_field(payload, "identifier").unwrap_or_else(|| issue.external_id.clone());
    let url = str_field(payload, "url");
    let state = nested_str(payload, "state", "name").unwrap_or_else(|| "Unknown".to_string());

    let mut md = Vec::new();
    md.push(format!("# Linear Issue: {identifier} - {title}"));
    md.push(String::new());
    if let Some(created) = str_field(payload, "createdAt") {
        md.push(format!("**Timestamp**: {}", format_timestamp(&created)));
        md.push(String::new());
    }
    md.push(format!("**Status**: {state}"));
    md.push(String::new());
    if let Some(completed) = str_field(payload, "completedAt") {
        md.push(format!("**Completed**: {}", format_timestamp(&completed)));
        md.push(String::new());
    }
    if let Some(team) = nested_str(payload, "team", "name") {
        md.push(format!("**Team**: {team}"));
        md.push(String::new());
    }
    if let Some(priority) = str_field(payload, "priorityLabel").filter(|p| !p.is_empty()) {
        md.push(format!("**Priority**: {priority}"));
        md.push(String::new());
    }
    if let Some(assignee) = nested_str(payload, "assignee", "name") {
        md.push(format!("**Assignee**: {assignee}"));
        md.push(String::new());
    }
    if let Some(creator) = nested_str(payload, "creator", "name") {
        md.push(format!("**Creator**: {creator}"));
        md.push(String::new());
    }
    let labels: Vec<String> = payload
        .get("labels")
        .and_then(|l| l.get("nodes"))
        .and_then(Value::as_array)
        .map(|nodes| {
            nodes
                .iter()
                .filter_map(|n| n.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if !labels.is_empty() {
        md.push(format!("**Tags**: {}", labels.join(", ")));
        md.push(String::new());
    }
    if let Some(project) = nested_str(payload, "project", "name") {
        md.push(format!("**Project**: {project}"));
        md.push(String::new());
    }

    md.push("## Description".to_string());
    md.push(String::new());
    match str_field(payload, "description").filter(|d| !d.is_empty()) {
        Some(description) => md.push(description),
        None => md.push("No description provided.".to_string()),
    }
    md.push(String::new());

    if !comments.is_empty() {
        md.push("## Conversation".to_string());
        md.push(String::new());
        for comment in comments {
            push_linear_comment(&mut md, &comment.payload);
        }
    }

    let file_name = format!("{identifier}_{}.md", clean_filename(&title));
    let metadata = json!({
        "issue_id": issue.external_id,
        "identifier": identifier,
        "state": state,
        "created_at": str_field(payload, "createdAt"),
        "total_comments": comments.len(),
    });
    Some(Document {
        file_name,
        title: format!("{identifier}: {title}"),
        url,
        metadata,
        body: md.join("\n"),
    })
}

fn push_linear_comment(md: &mut Vec<String>, comment: &Value) {
    let author = match nested_str(comment, "botActor", "name") {
        Some(bot) => format!("{bot} (Bot)"),
        None => nested_str(comment, "user", "name").unwrap_or_else(|| "Unknown".to_string()),
    };
    md.push(format!("### {author}"));
    if let Some(created) = str_field(comment, "createdAt") {
        md.push(format!("*{}*", format_timestamp(&created)));
    }
    md.push(String::new());
    match str_field(comment, "body").filter(|b| !b.is_empty()) {
        Some(body) => md.push(body),
        None => md.push("_No body content._".to_string()),
    }
    md.push(String::new());
    md.push("---".to_string());
    md.push(String::new());
}

/// Convert HTML to markdown, collapsing runs of blank lines.
pub fn html_to_markdown(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }
    let md = html2md::parse_html(html);
    collapse_blank_lines(md.trim())
}

fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim_end().to_string()
}

/// Make a title filesystem-safe: strip tags, replace reserved characters,
/// collapse whitespace to underscores, cap at 100 chars.
pub fn clean_filename(title: &str) -> String {
    let mut cleaned = String::with_capacity(title.len());
    let mut in_tag = false;
    for c in title.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if in_tag => {}
            '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => cleaned.push('_'),
            c => cleaned.push(c),
        }
    }
    let collapsed: String = cleaned
        .trim()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    collapsed.chars().take(100).collect()
}

/// Readable timestamp for document metadata lines, e.g. `2026-02-17 16:29 UTC`.
pub fn format_timestamp(iso: &str) -> String {
    match DateTime::parse_from_rfc3339(iso) {
        Ok(dt) => dt.format("%Y-%m-%d %H:%M UTC").to_string(),
        Err(_) => iso.to_string(),
    }
}

fn str_field(payload: &Value, field: &str) -> Option<String> {
    payload.get(field).and_then(Value::as_str).map(str::to_string)
}

fn nested_str(payload: &Value, outer: &str, inner: &str) -> Option<String> {
    payload
        .get(outer)
        .and_then(|v| v.get(inner))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
