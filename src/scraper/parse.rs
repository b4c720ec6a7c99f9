//! Streaming HTML extraction
//!
//! The page body is streamed through a rewriting tokenizer once, collecting
//! four things in document order:
//!
//! - term frequencies from visible text (script/style content excluded),
//! - outgoing link URLs (`<a href>`),
//! - image URLs (`<img src>`),
//! - a capped buffer of raw visible text for the summarizer and indexer.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use lol_html::html_content::TextChunk;
use lol_html::{doc_text, element, HtmlRewriter, Settings};

/// Cap on the visible-text buffer, in bytes
pub const MAX_TEXT_BYTES: usize = 100_000;

/// Punctuation stripped from the edges of each token
const PUNCTUATION: &[char] = &['.', ',', '!', '?', ':', ';', '"', '\'', '(', ')'];

/// Tokens dropped regardless of frequency
const STOP_WORDS: &[&str] = &["the", "and", "is", "in", "to", "of", "a"];

/// Everything extracted from one page
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageExtract {
    /// Term frequencies from visible text
    pub terms: HashMap<String, u64>,
    /// `href` values of `<a>` tags, in document order
    pub links: Vec<String>,
    /// `src` values of `<img>` tags, in document order
    pub images: Vec<String>,
    /// Raw visible text, capped at [`MAX_TEXT_BYTES`]
    pub text: String,
}

#[derive(Default)]
struct ParseState {
    extract: PageExtract,
    in_script: u32,
    in_style: u32,
    pending_text: String,
}

impl ParseState {
    fn in_excluded_element(&self) -> bool {
        self.in_script > 0 || self.in_style > 0
    }

    /// Handle one text chunk; chunks are accumulated until the end of the
    /// text node so tokenization never splits a word at a buffer boundary.
    fn on_text(&mut self, chunk: &TextChunk) {
        if self.in_excluded_element() {
            return;
        }
        self.pending_text.push_str(chunk.as_str());
        if chunk.last_in_text_node() {
            let text = std::mem::take(&mut self.pending_text);
            self.on_text_node(&text);
        }
    }

    fn on_text_node(&mut self, text: &str) {
        for word in text.split_whitespace() {
            let word = word.to_lowercase();
            let word = word.trim_matches(PUNCTUATION);
            // Length is measured in bytes, so short multi-byte tokens survive.
            if word.len() > 2 && !STOP_WORDS.contains(&word) {
                *self.extract.terms.entry(word.to_string()).or_insert(0) += 1;
            }
        }
        self.append_visible_text(text);
    }

    fn append_visible_text(&mut self, text: &str) {
        let remaining = MAX_TEXT_BYTES.saturating_sub(self.extract.text.len());
        if remaining == 0 {
            return;
        }
        if text.len() <= remaining {
            self.extract.text.push_str(text);
        } else {
            // Truncate on a character boundary so the buffer stays valid UTF-8.
            let mut cut = remaining;
            while cut > 0 && !text.is_char_boundary(cut) {
                cut -= 1;
            }
            self.extract.text.push_str(&text[..cut]);
        }
    }
}

/// Parse one HTML body
///
/// Tokenizer errors are tolerated: whatever was extracted before the error is
/// returned, matching the crawl's log-and-continue posture toward malformed
/// pages.
pub fn parse_page(body: &[u8]) -> PageExtract {
    let state = Rc::new(RefCell::new(ParseState::default()));

    let result = run_rewriter(body, &state);
    if let Err(e) = result {
        tracing::warn!(error = %e, "html tokenizer stopped early, keeping partial extract");
    }

    let mut state = state.borrow_mut();
    // Flush a trailing text node the tokenizer never closed.
    if !state.pending_text.is_empty() {
        let text = std::mem::take(&mut state.pending_text);
        state.on_text_node(&text);
    }
    std::mem::take(&mut state.extract)
}

fn run_rewriter(
    body: &[u8],
    state: &Rc<RefCell<ParseState>>,
) -> std::result::Result<(), lol_html::errors::RewritingError> {
    let text_state = Rc::clone(state);
    let link_state = Rc::clone(state);
    let image_state = Rc::clone(state);
    let script_state = Rc::clone(state);
    let style_state = Rc::clone(state);

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![
                element!("a[href]", move |el| {
                    if let Some(href) = el.get_attribute("href") {
                        link_state.borrow_mut().extract.links.push(href);
                    }
                    Ok(())
                }),
                element!("img[src]", move |el| {
                    if let Some(src) = el.get_attribute("src") {
                        image_state.borrow_mut().extract.images.push(src);
                    }
                    Ok(())
                }),
                element!("script", move |el| {
                    // A self-closing script has no end tag and no content; it
                    // must not flip the flag.
                    let handlers = match el.end_tag_handlers() {
                        Some(handlers) => handlers,
                        None => return Ok(()),
                    };
                    script_state.borrow_mut().in_script += 1;
                    let state = Rc::clone(&script_state);
                    handlers.push(Box::new(move |_end| {
                        let mut state = state.borrow_mut();
                        state.in_script = state.in_script.saturating_sub(1);
                        Ok(())
                    }));
                    Ok(())
                }),
                element!("style", move |el| {
                    let handlers = match el.end_tag_handlers() {
                        Some(handlers) => handlers,
                        None => return Ok(()),
                    };
                    style_state.borrow_mut().in_style += 1;
                    let state = Rc::clone(&style_state);
                    handlers.push(Box::new(move |_end| {
                        let mut state = state.borrow_mut();
                        state.in_style = state.in_style.saturating_sub(1);
                        Ok(())
                    }));
                    Ok(())
                }),
            ],
            document_content_handlers: vec![doc_text!(move |chunk| {
                text_state.borrow_mut().on_text(chunk);
                Ok(())
            })],
            ..Settings::default()
        },
        |_: &[u8]| {},
    );

    rewriter.write(body)?;
    rewriter.end()
}
