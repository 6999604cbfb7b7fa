//! # Markup Rendering Tests
//!
//! Tests for rendering model output into Telegram HTML and MarkdownV2, and
//! for splitting rendered text into message-sized chunks.

use proptest::prelude::*;
use tarot_chat_bot::render::{chunk_plain, chunk_rendered, render, strip_reasoning, Dialect};

/// Fragments that stress MarkdownV2: delimiters, escapes, fences and reasoning markers
const MARKDOWN_FRAGMENTS: &[&str] = &[
    "a", "b", " ", "\n", "*", "**", "`", "```", "```rust\n", "\\", "_", ".", "(", "<think>",
    "</think>",
];

/// Fragments that stress HTML: delimiters, existing tags, entities, fences and reasoning markers
const HTML_FRAGMENTS: &[&str] = &[
    "a", " ", "\n", "*", "**", "`", "```", "```rust\n", "\\", "_", "<b>", "</b>", "<i>", "</i>",
    "<pre>", "&amp;", "&", "<", "<think>", "</think>",
];

/// Fragments for chunking: long enough words to force splits, without stray backticks
const CHUNK_FRAGMENTS: &[&str] = &[
    "lorem ", "ipsum", " ", "\n", "**", "```", "```rust\n", "\\", ".", "<b>", "</b>", "<pre>",
    "&amp;", "<",
];

/// Raw model output built by concatenating fragments
fn raw_from(fragments: &'static [&'static str], max_len: usize) -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(fragments), 0..max_len).prop_map(|parts| parts.concat())
}

/// Undo the HTML escaping applied to code content
fn decode_html(s: &str) -> String {
    s.replace("&lt;", "<").replace("&gt;", ">").replace("&amp;", "&")
}

/// True when every `&` in `chunk` starts one of the entities the renderer emits
fn entities_intact(chunk: &str) -> bool {
    chunk
        .match_indices('&')
        .all(|(i, _)| ["&amp;", "&lt;", "&gt;", "&#42;", "&#96;"].iter().any(|e| chunk[i..].starts_with(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test bold conversion and entity escaping in HTML
    #[test]
    fn test_html_bold_and_escaping() {
        assert_eq!(
            render("Hello **world** & <you>", Dialect::Html),
            "Hello <b>world</b> &amp; &lt;you&gt;"
        );
        assert_eq!(render("Use `x<y`", Dialect::Html), "Use <code>x&lt;y</code>");
    }

    /// Test that reasoning blocks never reach the user
    #[test]
    fn test_reasoning_removed() {
        assert_eq!(render("<think>plan</think>Answer", Dialect::Html), "Answer");
        assert_eq!(
            render("<think>a</think>One <think>b</think>two", Dialect::MarkdownV2),
            "One two"
        );
        assert_eq!(strip_reasoning("<think>\nplan\n</think>\n\nHi"), "Hi");
    }

    /// Test that an unterminated reasoning block is shown as escaped text
    #[test]
    fn test_unterminated_reasoning_is_plain_text() {
        assert_eq!(
            render("Hi <think>secret **x**", Dialect::Html),
            "Hi &lt;think&gt;secret &#42;&#42;x&#42;&#42;"
        );
        assert_eq!(render("Hi <think>x.", Dialect::MarkdownV2), "Hi <think\\>x\\.");
    }

    /// Test fenced code blocks in both dialects
    #[test]
    fn test_fenced_code() {
        assert_eq!(
            render("```python\nprint(1 < 2)\n```", Dialect::Html),
            "<pre><code class=\"language-python\">print(1 &lt; 2)\n</code></pre>"
        );
        assert_eq!(
            render("```rust\nlet x = a.b();\n```", Dialect::MarkdownV2),
            "```rust\nlet x = a.b();\n```"
        );
    }

    /// Test that an unterminated fence degrades the rest of the reply
    #[test]
    fn test_unterminated_fence_is_plain_text() {
        assert_eq!(
            render("ok\n```rust\nfn *x", Dialect::Html),
            "ok\n&#96;&#96;&#96;rust\nfn &#42;x"
        );
    }

    /// Test MarkdownV2 bold, padding and punctuation escaping
    #[test]
    fn test_markdown_bold_and_escaping() {
        assert_eq!(
            render("Hello **world**! (test)", Dialect::MarkdownV2),
            "Hello *world* \\! \\(test\\)"
        );
        assert_eq!(render("5 * 3 = 15.", Dialect::MarkdownV2), "5 \\* 3 \\= 15\\.");
    }

    /// Test that a closing MarkdownV2 star keeps its space before code and escaped tails
    #[test]
    fn test_markdown_padding_across_segments() {
        let cases = [
            ("*a*```", "*a* \\`\\`\\`"),
            ("**a**```rust\nx\n```", "*a* ```rust\nx\n```"),
            ("*</think>*<think>", "*</think\\>* <think\\>"),
        ];
        for (raw, expected) in cases {
            let once = render(raw, Dialect::MarkdownV2);
            assert_eq!(once, expected, "{raw:?}");
            assert_eq!(render(&once, Dialect::MarkdownV2), once, "{raw:?}");
        }
    }

    /// Test that star runs longer than two never become emphasis
    #[test]
    fn test_markdown_long_star_runs_are_literal() {
        assert_eq!(render("***x***", Dialect::MarkdownV2), "\\*\\*\\*x\\*\\*\\*");
    }

    /// Test that already rendered output is stable for hand-picked inputs
    #[test]
    fn test_rendering_twice_is_stable() {
        let samples = [
            "**Title**\n\nSome *emphasis* and `code` & <tags>",
            "```\n<b>not bold</b>\n```\nafter",
            "a**b**c (x) [y] {z} 1.2.3!",
            "<think>hidden</think>Visible **bold",
        ];
        for dialect in [Dialect::Html, Dialect::MarkdownV2] {
            for sample in samples {
                let once = render(sample, dialect);
                assert_eq!(render(&once, dialect), once, "{dialect:?}: {sample:?}");
            }
        }
    }

    /// Test that a long rendered reply splits on line boundaries
    #[test]
    fn test_long_reply_splits_on_newlines() {
        let paragraph = "word ".repeat(150);
        let raw = format!("{paragraph}\n{paragraph}\n{paragraph}");
        let rendered = render(&raw, Dialect::Html);
        let chunks = chunk_rendered(&rendered, Dialect::Html, 1000);
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 1000);
            assert!(chunk.starts_with("word"));
        }
    }

    /// Test plain chunking by characters
    #[test]
    fn test_chunk_plain_counts_characters() {
        let text = "塔".repeat(150);
        let chunks = chunk_plain(&text, 100);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks.concat(), text);
    }

    proptest! {
        /// Rendering HTML output again changes nothing
        #[test]
        fn prop_html_idempotent(raw in raw_from(HTML_FRAGMENTS, 24)) {
            let once = render(&raw, Dialect::Html);
            prop_assert_eq!(render(&once, Dialect::Html), once);
        }

        /// Rendering MarkdownV2 output again changes nothing
        #[test]
        fn prop_markdown_idempotent(raw in raw_from(MARKDOWN_FRAGMENTS, 24)) {
            let once = render(&raw, Dialect::MarkdownV2);
            prop_assert_eq!(render(&once, Dialect::MarkdownV2), once);
        }

        /// HTML code blocks keep their content once entities are decoded
        #[test]
        fn prop_html_code_preserved(code in "[a-z<>& \n]{0,60}") {
            let raw = format!("```\n{code}\n```");
            let rendered = render(&raw, Dialect::Html);
            let inner = rendered
                .strip_prefix("<pre>")
                .and_then(|r| r.strip_suffix("</pre>"))
                .map(decode_html);
            prop_assert_eq!(inner, Some(format!("{code}\n")));
        }

        /// MarkdownV2 code blocks keep backslash-free content byte for byte
        #[test]
        fn prop_markdown_code_preserved(code in "[a-z_.*()!# \n]{0,60}") {
            let raw = format!("```\n{code}\n```");
            prop_assert_eq!(render(&raw, Dialect::MarkdownV2), format!("```\n{code}\n```"));
        }

        /// HTML chunks respect the limit and never cut an entity
        #[test]
        fn prop_html_chunks_bounded(raw in "[a-z&< \n]{0,400}") {
            let rendered = render(&raw, Dialect::Html);
            for chunk in chunk_rendered(&rendered, Dialect::Html, 64) {
                prop_assert!(chunk.chars().count() <= 64);
                prop_assert!(entities_intact(&chunk), "severed entity in {:?}", chunk);
            }
        }

        /// MarkdownV2 chunks respect the limit and never end inside an escape
        #[test]
        fn prop_markdown_chunks_bounded(raw in "[a-z. \n]{0,400}") {
            let rendered = render(&raw, Dialect::MarkdownV2);
            for chunk in chunk_rendered(&rendered, Dialect::MarkdownV2, 64) {
                prop_assert!(chunk.chars().count() <= 64);
                let trailing = chunk.len() - chunk.trim_end_matches('\\').len();
                prop_assert!(trailing % 2 == 0, "dangling escape in {:?}", chunk);
            }
        }

        /// Every HTML chunk closes the tags it opens
        #[test]
        fn prop_html_chunks_balanced(raw in raw_from(CHUNK_FRAGMENTS, 80)) {
            let rendered = render(&raw, Dialect::Html);
            for chunk in chunk_rendered(&rendered, Dialect::Html, 64) {
                prop_assert!(chunk.chars().count() <= 64);
                for (open, close) in [("<b>", "</b>"), ("<pre>", "</pre>"), ("<code", "</code>")] {
                    prop_assert_eq!(
                        chunk.matches(open).count(),
                        chunk.matches(close).count(),
                        "unbalanced {} in {:?}", open, chunk
                    );
                }
            }
        }

        /// Every MarkdownV2 chunk closes the code fences it opens
        #[test]
        fn prop_markdown_chunks_balanced(raw in raw_from(CHUNK_FRAGMENTS, 80)) {
            let rendered = render(&raw, Dialect::MarkdownV2);
            for chunk in chunk_rendered(&rendered, Dialect::MarkdownV2, 64) {
                prop_assert!(chunk.chars().count() <= 64);
                prop_assert!(chunk.matches("```").count() % 2 == 0, "open fence in {:?}", chunk);
            }
        }
    }
}
