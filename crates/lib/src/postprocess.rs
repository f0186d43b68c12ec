//! Assistant-reply post-processing.
//!
//! Fenced code blocks are found with a small outside/inside scanner (an
//! unterminated fence is discarded), persisted server-side as AI-authored
//! files, and the first block activates the code viewer. Persistence is
//! fire-and-forget: a failure is logged and never shown to the user.

use crate::backend::Backend;
use crate::surface::Surface;

/// One fenced code block, in order of appearance. The body is trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub lang: Option<String>,
    pub body: String,
}

/// Scan `text` for fenced code blocks: an opening fence, an optional word
/// tag directly after it, optional whitespace, then a body running to the
/// next fence.
pub fn extract_code_blocks(text: &str) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find("```") {
        let after_open = &rest[open + 3..];
        let tag_len = after_open
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after_open.len());
        let lang = if tag_len > 0 {
            Some(after_open[..tag_len].to_string())
        } else {
            None
        };
        let after_tag = &after_open[tag_len..];
        let body_start = after_tag
            .find(|c: char| !c.is_whitespace())
            .unwrap_or(after_tag.len());
        let body_area = &after_tag[body_start..];
        let Some(close) = body_area.find("```") else {
            break;
        };
        blocks.push(CodeBlock {
            lang,
            body: body_area[..close].trim().to_string(),
        });
        rest = &body_area[close + 3..];
    }
    blocks
}

/// Languages the extension table knows about; everything else is text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Python,
    Javascript,
    Html,
    Css,
    C,
    Cpp,
    Java,
    Json,
    Markdown,
    Text,
}

impl Language {
    /// Total mapping from a fence tag; unmapped tags become `Text`.
    pub fn from_tag(tag: &str) -> Language {
        match tag.to_ascii_lowercase().as_str() {
            "python" => Language::Python,
            "javascript" | "js" => Language::Javascript,
            "html" => Language::Html,
            "css" => Language::Css,
            "c" => Language::C,
            "cpp" => Language::Cpp,
            "java" => Language::Java,
            "json" => Language::Json,
            "markdown" | "md" => Language::Markdown,
            _ => Language::Text,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Language::Python => ".py",
            Language::Javascript => ".js",
            Language::Html => ".html",
            Language::Css => ".css",
            Language::C => ".c",
            Language::Cpp => ".cpp",
            Language::Java => ".java",
            Language::Json => ".json",
            Language::Markdown => ".md",
            Language::Text => ".txt",
        }
    }
}

/// Filename for the n-th generated block of a session (n starts at 1).
pub fn generated_filename(session_id: i64, index: usize, tag: Option<&str>) -> String {
    let ext = Language::from_tag(tag.unwrap_or("txt")).extension();
    format!("ai_code_{}_{}{}", session_id, index, ext)
}

/// Representative display filename the code viewer shows for a language
/// hint. Checks are substring-based and ordered.
pub fn viewer_filename(lang_hint: &str) -> &'static str {
    let lang = lang_hint.to_ascii_lowercase();
    if lang.contains("html") {
        "index.html"
    } else if lang.contains("css") {
        "style.css"
    } else if lang.contains("js") || lang.contains("javascript") {
        "script.js"
    } else if lang.contains("py") || lang.contains("python") {
        "app.py"
    } else if lang.contains("c") {
        "main.c"
    } else if lang.contains("java") {
        "Main.java"
    } else if lang.contains("md") || lang.contains("markdown") {
        "README.md"
    } else if lang.contains("json") {
        "data.json"
    } else {
        "AI Generated Code"
    }
}

/// Persist every non-empty block of `reply` as an AI-authored file (skipped
/// when no session id is known yet) and open the code viewer with the first
/// block. Save failures are logged only; they never block later blocks.
pub async fn process_reply<B: Backend, S: Surface>(
    backend: &B,
    surface: &mut S,
    session_id: Option<i64>,
    reply: &str,
) {
    let blocks = extract_code_blocks(reply);

    if let Some(sid) = session_id {
        let mut index = 1;
        for block in &blocks {
            if block.body.is_empty() {
                continue;
            }
            let filename = generated_filename(sid, index, block.lang.as_deref());
            index += 1;
            match backend.save_ai_file(sid, &filename, &block.body).await {
                Ok(ack) if ack.success => {}
                Ok(ack) => log::warn!(
                    "saving {} failed: {}",
                    filename,
                    ack.error.unwrap_or_else(|| "unknown error".to_string())
                ),
                Err(e) => log::warn!("saving {} failed: {}", filename, e),
            }
        }
    }

    if let Some(first) = blocks.first() {
        surface.open_code_viewer(&first.body, first.lang.as_deref().unwrap_or("txt"));
    }
}
