//! Comment pre-pass.
//!
//! The Nunjucks lexer discards `{# … #}` before any node exists, so comments
//! are swapped for `{{ __COMMENT_n__ }}` placeholders ahead of parsing and
//! recovered from a side table while walking the tree. This exists only to
//! work around that lexer.

use regex::Regex;
use std::sync::LazyLock;

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{#(.*?)#\}").expect("comment pattern compiles"));

const PREFIX: &str = "__COMMENT_";
const SUFFIX: &str = "__";

/// A comment lifted out of the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedComment {
    /// Body without delimiters, whitespace-control markers or padding.
    pub body: String,
    /// `{#-`
    pub trim_left: bool,
    /// `-#}`
    pub trim_right: bool,
    /// The comment exactly as written.
    pub original: String,
}

/// Source with comments replaced, plus the captured comments by index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preprocessed {
    pub source: String,
    pub comments: Vec<CapturedComment>,
}

impl Preprocessed {
    /// Comment referenced by a placeholder symbol name.
    pub fn comment(&self, symbol: &str) -> Option<&CapturedComment> {
        let index = symbol.strip_prefix(PREFIX)?.strip_suffix(SUFFIX)?;
        self.comments.get(index.parse::<usize>().ok()?)
    }

    /// Put original comments back into text that must stay verbatim.
    pub fn restore(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (index, comment) in self.comments.iter().enumerate() {
            out = out.replace(&placeholder(index), &comment.original);
        }
        out
    }
}

fn placeholder(index: usize) -> String {
    format!("{{{{ {PREFIX}{index}{SUFFIX} }}}}")
}

/// Replace every comment with an output placeholder.
pub fn extract_comments(source: &str) -> Preprocessed {
    let mut comments = Vec::new();
    let rewritten = COMMENT.replace_all(source, |caps: &regex::Captures<'_>| {
        let inner = &caps[1];
        let trim_left = inner.starts_with('-');
        let trim_right = inner.len() > usize::from(trim_left) && inner.ends_with('-');
        let body = &inner[usize::from(trim_left)..inner.len() - usize::from(trim_right)];
        comments.push(CapturedComment {
            body: body.trim().to_string(),
            trim_left,
            trim_right,
            original: caps[0].to_string(),
        });
        placeholder(comments.len() - 1)
    });

    Preprocessed {
        source: rewritten.into_owned(),
        comments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_comments_with_placeholders() {
        let pre = extract_comments("a{# one #}b{#- two -#}c");
        assert_eq!(pre.source, "a{{ __COMMENT_0__ }}b{{ __COMMENT_1__ }}c");
        assert_eq!(pre.comments[0].body, "one");
        assert_eq!(pre.comments[1].body, "two");
        assert_eq!(pre.comments[1].original, "{#- two -#}");
        assert!(!pre.comments[0].trim_left && !pre.comments[0].trim_right);
        assert!(pre.comments[1].trim_left && pre.comments[1].trim_right);
    }

    #[test]
    fn markers_must_touch_the_delimiter() {
        let pre = extract_comments("{# - item -#}{#-#}");
        assert_eq!(pre.comments[0].body, "- item");
        assert!(!pre.comments[0].trim_left && pre.comments[0].trim_right);
        assert_eq!(pre.comments[1].body, "");
        assert!(pre.comments[1].trim_left && !pre.comments[1].trim_right);
    }

    #[test]
    fn multiline_comment() {
        let pre = extract_comments("{# line one\nline two #}");
        assert_eq!(pre.comments[0].body, "line one\nline two");
    }

    #[test]
    fn placeholder_lookup() {
        let pre = extract_comments("{# x #}");
        assert_eq!(pre.comment("__COMMENT_0__").map(|c| c.body.as_str()), Some("x"));
        assert!(pre.comment("__COMMENT_9__").is_none());
        assert!(pre.comment("name").is_none());
    }

    #[test]
    fn restore_reverses_replacement() {
        let source = "{% raw %}{# keep #}{% endraw %}";
        let pre = extract_comments(source);
        assert_eq!(pre.restore(&pre.source), source);
    }
}
