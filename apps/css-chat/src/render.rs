//! Markup for the streamed page.
//!
//! Every chunk is a self-contained block plus a `<style>` element. The style
//! hides the previous chunk and binds each control's `:active` state to a
//! background image whose URL is the next state transition.

use std::fmt::Write;

use crate::connection::ConnectionId;
use crate::draft::display_text;
use crate::keyboard::Keyboard;

pub const PAGE_TITLE: &str = "CSS Web Chat!";

/// Everything one chunk needs, captured at render time.
pub struct ChunkView<'a> {
    pub chunk_id: u64,
    pub connection_id: &'a ConnectionId,
    pub display_name: &'a str,
    /// Draft in path encoding.
    pub draft: &'a str,
    pub submission_seq: u64,
    pub messages: &'a [String],
    pub keyboard: &'a Keyboard,
}

pub fn page_shell() -> String {
    format!(
        "<!DOCTYPE html><html><head><title>{PAGE_TITLE}</title></head>\
         <body><h1>{PAGE_TITLE}</h1>\
         <style>.messages{{height:500px;overflow-y:scroll;}}</style>"
    )
}

pub fn chunk(view: &ChunkView<'_>) -> String {
    let mut out = String::with_capacity(4096);
    let id = view.chunk_id;

    // `write!` into a String cannot fail.
    let _ = write!(out, "<div id=\"chunk-{id}\"><div class=\"messages\">");
    for message in view.messages {
        let _ = write!(out, "<p>{message}</p>");
    }
    let _ = write!(
        out,
        "</div><br/><p>{}: {}</p><div>",
        escape_html(view.display_name),
        display_text(view.draft)
    );
    for (index, symbol) in view.keyboard.symbols().iter().enumerate() {
        let _ = write!(
            out,
            "<button class=\"key-{index}\">{}</button>",
            symbol.label()
        );
        if symbol.ends_row() {
            out.push_str("<br/>");
        }
    }
    out.push_str("<button class=\"send\">Send</button></div></div><style>");

    if let Some(previous) = id.checked_sub(1) {
        let _ = write!(out, "#chunk-{previous}{{display:none}}");
    }
    for (index, symbol) in view.keyboard.symbols().iter().enumerate() {
        let _ = write!(
            out,
            "#chunk-{id} .key-{index}:active{{background:url({})}}",
            letter_url(view.connection_id, view.submission_seq, view.draft, symbol.path_char())
        );
    }
    let _ = write!(
        out,
        "#chunk-{id} .send:active{{background:url({})}}</style>",
        send_url(view.connection_id, view.submission_seq)
    );
    out
}

pub fn letter_url(id: &ConnectionId, seq: u64, draft: &str, symbol: char) -> String {
    format!("/letter/{id}/{seq}/{draft}{symbol}")
}

pub fn send_url(id: &ConnectionId, seq: u64) -> String {
    format!("/send/{id}/{seq}")
}

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
