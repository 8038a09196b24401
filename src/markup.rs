//! Lightweight response formatting.
//!
//! Responses get two transforms and nothing else: fenced code blocks are
//! lifted out into their own blocks, and `**text**` becomes emphasized.
//! Everything else is shown verbatim.

use once_cell::sync::Lazy;
use regex::Regex;

/// Language assumed for a fence without an info string.
pub const DEFAULT_CODE_LANGUAGE: &str = "python";

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```([\s\S]*?)```").expect("code fence pattern is valid"));

static BOLD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("bold pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub strong: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Text(Vec<Span>),
    Code { language: String, code: String },
}

/// A rendered message body, ready to be laid out by the view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub blocks: Vec<Block>,
}

impl Block {
    /// An empty block of the same kind, used when revealing a fragment piece by piece.
    pub fn empty_like(&self) -> Block {
        match self {
            Block::Text(_) => Block::Text(Vec::new()),
            Block::Code { language, .. } => Block::Code {
                language: language.clone(),
                code: String::new(),
            },
        }
    }

    /// Appends text, merging into the previous span when the emphasis matches.
    pub fn push(&mut self, text: &str, strong: bool) {
        match self {
            Block::Text(spans) => match spans.last_mut() {
                Some(last) if last.strong == strong => last.text.push_str(text),
                _ => spans.push(Span {
                    text: text.to_string(),
                    strong,
                }),
            },
            Block::Code { code, .. } => code.push_str(text),
        }
    }

    fn plain_text(&self) -> String {
        match self {
            Block::Text(spans) => spans.iter().map(|s| s.text.as_str()).collect(),
            Block::Code { code, .. } => code.clone(),
        }
    }
}

impl Fragment {
    /// A single unformatted text block. Used for user input and error messages,
    /// which are never run through the markdown-ish transforms.
    pub fn plain(text: &str) -> Self {
        if text.is_empty() {
            return Fragment::default();
        }
        Fragment {
            blocks: vec![Block::Text(vec![Span {
                text: text.to_string(),
                strong: false,
            }])],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|block| match block {
            Block::Text(spans) => spans.iter().all(|s| s.text.is_empty()),
            Block::Code { code, .. } => code.is_empty(),
        })
    }

    pub fn has_code(&self) -> bool {
        self.blocks
            .iter()
            .any(|block| matches!(block, Block::Code { .. }))
    }

    /// The text a reader sees, with no emphasis markers. This is what gets copied.
    pub fn plain_text(&self) -> String {
        self.blocks
            .iter()
            .map(Block::plain_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Serializes the fragment as the markup string stored with each turn.
    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            match block {
                Block::Text(spans) => {
                    for span in spans {
                        if span.strong {
                            out.push_str("<strong>");
                            out.push_str(&escape(&span.text));
                            out.push_str("</strong>");
                        } else {
                            out.push_str(&escape(&span.text));
                        }
                    }
                }
                Block::Code { language, code } => {
                    out.push_str(&extract_code_blocks(&format!("```{language}\n{code}\n```")))
                }
            }
        }
        out
    }
}

/// Parses a raw response into text and code blocks, applying bold emphasis to the text.
pub fn parse(text: &str) -> Fragment {
    let mut blocks = Vec::new();
    let mut last = 0;

    for caps in CODE_FENCE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let before = &text[last..whole.start()];
        let before = if last == 0 {
            before.trim_end_matches('\n')
        } else {
            before.trim_matches('\n')
        };
        push_text_block(&mut blocks, before);

        let (language, code) = split_info_string(caps.get(1).map_or("", |m| m.as_str()));
        blocks.push(Block::Code { language, code });
        last = whole.end();
    }

    let rest = &text[last..];
    let rest = if last == 0 { rest } else { rest.trim_start_matches('\n') };
    push_text_block(&mut blocks, rest);

    Fragment { blocks }
}

/// Replaces every fenced block with `<pre><code class="language-…">` markup,
/// escaping angle brackets inside the code. Text outside fences is untouched.
pub fn extract_code_blocks(text: &str) -> String {
    CODE_FENCE
        .replace_all(text, |caps: &regex::Captures| {
            let (language, code) = split_info_string(caps.get(1).map_or("", |m| m.as_str()));
            code_markup(&language, &code)
        })
        .into_owned()
}

/// Splits `**bold**` runs out of a piece of text. Unmatched markers stay literal.
pub fn emphasize(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut last = 0;

    for caps in BOLD.captures_iter(text) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > last {
            spans.push(Span {
                text: text[last..whole.start()].to_string(),
                strong: false,
            });
        }
        spans.push(Span {
            text: inner.as_str().to_string(),
            strong: true,
        });
        last = whole.end();
    }

    if last < text.len() {
        spans.push(Span {
            text: text[last..].to_string(),
            strong: false,
        });
    }

    spans
}

pub fn escape(text: &str) -> String {
    text.replace('<', "&lt;").replace('>', "&gt;")
}

fn push_text_block(blocks: &mut Vec<Block>, text: &str) {
    let text = collapse_whitespace(text);
    if text.is_empty() {
        return;
    }
    blocks.push(Block::Text(emphasize(&text)));
}

/// Trims the text and collapses each whitespace run: a run with a blank line
/// becomes one blank line, a run with a line break becomes one line break, and
/// anything else becomes a single space.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0;
    let mut in_run = false;

    for ch in text.trim().chars() {
        if ch.is_whitespace() {
            in_run = true;
            if ch == '\n' {
                newlines += 1;
            }
            continue;
        }
        if in_run {
            out.push_str(match newlines {
                0 => " ",
                1 => "\n",
                _ => "\n\n",
            });
            in_run = false;
            newlines = 0;
        }
        out.push(ch);
    }
    out
}

fn code_markup(language: &str, code: &str) -> String {
    format!(
        "<pre><code class=\"language-{}\">{}</code></pre>",
        language,
        escape(code)
    )
}

/// ```` ```rust\nfn main() {}``` ```` carries `rust` on its first line. A
/// single-line fence body is all code.
fn split_info_string(inner: &str) -> (String, String) {
    if let Some((first, rest)) = inner.split_once('\n') {
        let info = first.trim();
        let is_language = !info.is_empty()
            && info
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '#' | '-' | '_' | '.'));
        if is_language {
            return (info.to_string(), rest.trim_end_matches('\n').to_string());
        }
        if info.is_empty() {
            return (
                DEFAULT_CODE_LANGUAGE.to_string(),
                rest.trim_end_matches('\n').to_string(),
            );
        }
    }
    (
        DEFAULT_CODE_LANGUAGE.to_string(),
        inner.trim_end_matches('\n').to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(text: &str, strong: bool) -> Span {
        Span {
            text: text.to_string(),
            strong,
        }
    }

    #[test]
    fn test_bold_is_emphasized_without_markers() {
        let fragment = parse("This is **bold** text");
        assert_eq!(
            fragment.blocks,
            vec![Block::Text(vec![
                span("This is ", false),
                span("bold", true),
                span(" text", false),
            ])]
        );
        assert_eq!(fragment.plain_text(), "This is bold text");
        assert!(!fragment.plain_text().contains("**"));
        assert_eq!(fragment.to_markup(), "This is <strong>bold</strong> text");
    }

    #[test]
    fn test_unmatched_markers_stay_literal() {
        assert_eq!(emphasize("a ** b"), vec![span("a ** b", false)]);
        assert_eq!(emphasize("****"), vec![span("****", false)]);
    }

    #[test]
    fn test_code_fence_with_language() {
        let fragment = parse("Try this:\n```rust\nfn id<T>(x: T) -> T { x }\n```\nDone.");
        assert_eq!(fragment.blocks.len(), 3);
        assert_eq!(fragment.blocks[0], Block::Text(vec![span("Try this:", false)]));
        assert_eq!(
            fragment.blocks[1],
            Block::Code {
                language: "rust".to_string(),
                code: "fn id<T>(x: T) -> T { x }".to_string(),
            }
        );
        assert_eq!(fragment.blocks[2], Block::Text(vec![span("Done.", false)]));
        assert!(fragment.has_code());
    }

    #[test]
    fn test_code_fence_defaults_to_python() {
        let fragment = parse("```print('hi')```");
        assert_eq!(
            fragment.blocks,
            vec![Block::Code {
                language: DEFAULT_CODE_LANGUAGE.to_string(),
                code: "print('hi')".to_string(),
            }]
        );
    }

    #[test]
    fn test_bold_inside_code_is_untouched() {
        let fragment = parse("```\nx = a ** b\n```");
        assert_eq!(
            fragment.blocks,
            vec![Block::Code {
                language: DEFAULT_CODE_LANGUAGE.to_string(),
                code: "x = a ** b".to_string(),
            }]
        );
    }

    #[test]
    fn test_extract_code_blocks_escapes_angle_brackets() {
        let html = extract_code_blocks("see ```html\n<b>hi</b>\n``` ok");
        assert_eq!(
            html,
            "see <pre><code class=\"language-html\">&lt;b&gt;hi&lt;/b&gt;</code></pre> ok"
        );
        assert_eq!(extract_code_blocks("no fences here"), "no fences here");
    }

    #[test]
    fn test_markup_matches_extracted_code() {
        let text = "```js\nlet a = 1 < 2;\n```";
        assert_eq!(parse(text).to_markup(), extract_code_blocks(text));
    }

    #[test]
    fn test_text_whitespace_is_collapsed_but_code_is_not() {
        let fragment = parse("  a\tb   c\n  d\n\n\n\ne  \n```\nif x:\n    y()\n```");
        assert_eq!(fragment.blocks[0], Block::Text(vec![span("a b c\nd\n\ne", false)]));
        assert_eq!(
            fragment.blocks[1],
            Block::Code {
                language: DEFAULT_CODE_LANGUAGE.to_string(),
                code: "if x:\n    y()".to_string(),
            }
        );
    }

    #[test]
    fn test_markup_of_empty_code_block() {
        let fragment = Fragment {
            blocks: vec![Block::Code {
                language: "sh".to_string(),
                code: String::new(),
            }],
        };
        assert_eq!(fragment.to_markup(), "<pre><code class=\"language-sh\"></code></pre>");
    }

    #[test]
    fn test_empty_response_is_empty_fragment() {
        assert!(parse("").is_empty());
        assert!(parse("").blocks.is_empty());
        assert!(Fragment::plain("").is_empty());
        assert!(!Fragment::plain("x").is_empty());
    }
}
