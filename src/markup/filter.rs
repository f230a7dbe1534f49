//! Streaming tag filter.
//!
//! Input arrives in arbitrary chunks, so anything that cannot be decided yet
//! (an unterminated `<`, a trailing partial entity, a partial `<xml>`
//! sentinel) is held back and re-examined with the next chunk. Splitting a
//! stream differently never changes the plain text or the events.

use log::{debug, info, warn};
use regex::Regex;
use std::sync::OnceLock;
use tokio::sync::mpsc;

use crate::logutil::escape_log;
use crate::markup::scouting::ScoutingState;
use crate::markup::{
    FilterEvent, MarkupMode, Tag, GRATUITOUS_TAG, LOGIN_CUES, MARKUP_OFFER_WINDOW, MAX_TAG_DEPTH,
    MAX_TAG_TEXT, ROOM_TAGS, XML_MODE_REQUEST, XML_OPEN,
};
use crate::metrics;

/// Longest line kept while waiting for a login cue.
const MAX_CUE_LINE: usize = 256;

const ENTITIES: &[(&str, char)] = &[("&lt;", '<'), ("&gt;", '>'), ("&amp;", '&')];

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^<(/?)(\w+)(?: ([^/>]+))?(/?)>$").expect("static regex"))
}

/// Replace the three entities MUME emits; anything else is literal.
pub fn decode_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    'scan: while let Some(i) = rest.find('&') {
        out.push_str(&rest[..i]);
        let tail = &rest[i..];
        for (entity, ch) in ENTITIES {
            if let Some(after) = tail.strip_prefix(entity) {
                out.push(*ch);
                rest = after;
                continue 'scan;
            }
        }
        out.push('&');
        rest = &tail[1..];
    }
    out.push_str(rest);
    out
}

/// Length of the suffix of `s` that is a proper prefix of `pattern`.
fn partial_suffix_len(s: &str, pattern: &str) -> usize {
    (1..pattern.len())
        .rev()
        .find(|&k| s.ends_with(&pattern[..k]))
        .unwrap_or(0)
}

/// Length of a trailing entity that more input could still complete.
fn partial_entity_len(s: &str) -> usize {
    let Some(amp) = s.rfind('&') else {
        return 0;
    };
    let suffix = &s[amp..];
    let incomplete = ENTITIES
        .iter()
        .any(|(entity, _)| entity.len() > suffix.len() && entity.starts_with(suffix));
    if incomplete {
        suffix.len()
    } else {
        0
    }
}

/// Whether `s` (starting with `<`, no `>` yet) could still turn into a tag.
fn could_become_tag(s: &str) -> bool {
    let body = &s[1..];
    let body = body.strip_prefix('/').unwrap_or(body);
    let name_len = body
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(body.len());
    if name_len == body.len() {
        return true;
    }
    if name_len == 0 {
        return false;
    }
    let after = &body[name_len..];
    match after.as_bytes()[0] {
        b'/' => after.len() == 1,
        b' ' => match after[1..].find('/') {
            None => true,
            Some(slash) => slash + 2 == after.len(),
        },
        _ => false,
    }
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    index = index.min(s.len());
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Strips MUME XML tags from the output stream.
///
/// Returns the text meant for the player from [`filter_input_text`] and
/// sends [`FilterEvent`]s on the channel given at construction.
///
/// [`filter_input_text`]: TagStreamFilter::filter_input_text
pub struct TagStreamFilter {
    mode: MarkupMode,
    tag_stack: Vec<Tag>,
    /// Opening tags refused at the depth cap, innermost last.
    dropped: Vec<String>,
    plain_text: String,
    pending: String,
    offered_bytes: usize,
    cue_line: String,
    scouting: ScoutingState,
    events: mpsc::UnboundedSender<FilterEvent>,
}

impl TagStreamFilter {
    pub fn new(events: mpsc::UnboundedSender<FilterEvent>) -> Self {
        Self {
            mode: MarkupMode::Off,
            tag_stack: Vec::new(),
            dropped: Vec::new(),
            plain_text: String::new(),
            pending: String::new(),
            offered_bytes: 0,
            cue_line: String::new(),
            scouting: ScoutingState::default(),
            events,
        }
    }

    /// A filter together with the receiving end of its events.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<FilterEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn mode(&self) -> MarkupMode {
        self.mode
    }

    /// Number of currently open tags.
    pub fn depth(&self) -> usize {
        self.tag_stack.len()
    }

    pub fn is_scouting(&self) -> bool {
        self.scouting.is_active()
    }

    /// Reset all state, e.g. on reconnect. Markup is off afterwards.
    pub fn clear(&mut self) {
        self.mode = MarkupMode::Off;
        self.tag_stack.clear();
        self.dropped.clear();
        self.plain_text.clear();
        self.pending.clear();
        self.offered_bytes = 0;
        self.cue_line.clear();
        self.scouting = ScoutingState::default();
    }

    /// A new connection was made: wait for the login prompt, then ask for
    /// XML mode.
    pub fn connected(&mut self) {
        self.clear();
        self.mode = MarkupMode::NegotiationPending;
        debug!("Tag filter: waiting for login prompt");
    }

    /// XML mode was requested out of band; accept `<xml>` if it arrives
    /// within [`MARKUP_OFFER_WINDOW`] bytes.
    pub fn offer_markup(&mut self) {
        self.mode = MarkupMode::MarkupOffered;
        self.offered_bytes = 0;
        self.cue_line.clear();
    }

    /// Filter one chunk of server output, returning the text to display.
    pub fn filter_input_text(&mut self, raw: &str) -> String {
        let mut input = std::mem::take(&mut self.pending);
        input.push_str(raw);

        let mut rest: &str = &input;
        while !rest.is_empty() {
            let before = self.mode;
            let consumed = match self.mode {
                MarkupMode::Off => {
                    self.plain_text.push_str(rest);
                    rest.len()
                }
                MarkupMode::NegotiationPending => self.watch_for_cue(rest),
                MarkupMode::MarkupOffered => self.watch_for_sentinel(rest),
                MarkupMode::MarkupActive => self.parse_markup(rest),
            };
            if consumed == 0 && self.mode == before {
                self.pending.push_str(rest);
                break;
            }
            rest = &rest[consumed..];
        }

        std::mem::take(&mut self.plain_text)
    }

    fn watch_for_cue(&mut self, rest: &str) -> usize {
        for (i, ch) in rest.char_indices() {
            if ch == '\n' {
                self.cue_line.clear();
            } else if self.cue_line.len() < MAX_CUE_LINE {
                self.cue_line.push(ch);
            }
            if LOGIN_CUES.iter().any(|cue| self.cue_line == *cue) {
                let end = i + ch.len_utf8();
                self.plain_text.push_str(&rest[..end]);
                info!("Tag filter: login prompt seen, requesting XML mode");
                self.send(FilterEvent::NegotiationRequest(XML_MODE_REQUEST.to_string()));
                self.offer_markup();
                return end;
            }
        }
        self.plain_text.push_str(rest);
        rest.len()
    }

    fn watch_for_sentinel(&mut self, rest: &str) -> usize {
        if let Some(pos) = rest.find(XML_OPEN) {
            if self.offered_bytes + pos <= MARKUP_OFFER_WINDOW {
                self.plain_text.push_str(&rest[..pos]);
                self.mode = MarkupMode::MarkupActive;
                self.offered_bytes = 0;
                info!("Tag filter: XML mode on");
                return pos;
            }
            warn!(
                "Tag filter: {} arrived after {} bytes, leaving markup off",
                XML_OPEN,
                self.offered_bytes + pos
            );
            self.mode = MarkupMode::Off;
            return 0;
        }

        let emit = rest.len() - partial_suffix_len(rest, XML_OPEN);
        self.plain_text.push_str(&rest[..emit]);
        self.offered_bytes += emit;
        if self.offered_bytes > MARKUP_OFFER_WINDOW {
            warn!(
                "Tag filter: no {} within {} bytes, leaving markup off",
                XML_OPEN, MARKUP_OFFER_WINDOW
            );
            self.mode = MarkupMode::Off;
        }
        emit
    }

    fn parse_markup(&mut self, rest: &str) -> usize {
        let mut pos = 0;
        while pos < rest.len() {
            let tail = &rest[pos..];
            let Some(lt) = tail.find('<') else {
                let end = tail.len() - partial_entity_len(tail);
                self.push_text(&tail[..end]);
                return pos + end;
            };
            if lt > 0 {
                self.push_text(&tail[..lt]);
                pos += lt;
                continue;
            }

            let Some(gt) = tail.find('>') else {
                if tail.len() > MAX_TAG_TEXT || !could_become_tag(tail) {
                    self.push_text("<");
                    pos += 1;
                    continue;
                }
                return pos;
            };

            let candidate = &tail[..=gt];
            let Some(caps) = tag_re().captures(candidate) else {
                self.push_text("<");
                pos += 1;
                continue;
            };
            let is_end = !caps[1].is_empty();
            let name = &caps[2];
            let attr = caps.get(3).map_or("", |m| m.as_str());
            let is_leaf = !caps[4].is_empty();
            pos += gt + 1;

            if is_leaf {
                self.deliver(Tag::new(name, attr));
            } else if is_end {
                self.end_tag(name);
            } else {
                self.start_tag(name, attr);
            }
            if self.mode != MarkupMode::MarkupActive {
                break;
            }
        }
        pos
    }

    fn start_tag(&mut self, name: &str, attr: &str) {
        if self.tag_stack.len() >= MAX_TAG_DEPTH {
            warn!(
                "Tag filter: dropping <{}> nested in {}",
                name,
                self.open_tags()
            );
            metrics::inc_tags_dropped();
            self.dropped.push(name.to_string());
            return;
        }
        self.tag_stack.push(Tag::new(name, attr));
    }

    fn end_tag(&mut self, name: &str) {
        // Refused opens sit deeper than every open tag, so they match first.
        if let Some(idx) = self.dropped.iter().rposition(|n| n == name) {
            self.dropped.truncate(idx);
            return;
        }
        let Some(idx) = self.tag_stack.iter().rposition(|t| t.name == name) else {
            warn!("Tag filter: unmatched </{}> in {}", name, self.open_tags());
            metrics::inc_tags_dropped();
            return;
        };
        for unclosed in self.tag_stack.drain(idx + 1..) {
            warn!(
                "Tag filter: <{}> left open by </{}>, discarded",
                unclosed.name, name
            );
            metrics::inc_tags_dropped();
        }
        self.dropped.clear();
        if let Some(tag) = self.tag_stack.pop() {
            let closes_xml = tag.name == "xml";
            self.deliver(tag);
            if closes_xml {
                info!("Tag filter: XML mode off");
                self.offer_markup();
            }
        }
    }

    fn deliver(&mut self, tag: Tag) {
        self.scouting.end_tag(&tag.name);
        if self.scouting.is_active() && ROOM_TAGS.contains(&tag.name.as_str()) {
            debug!(
                "Tag filter: scouted <{}> withheld: {}",
                tag.name,
                escape_log(&tag.text)
            );
            return;
        }
        self.send(FilterEvent::TagEnd(tag));
    }

    fn send(&self, event: FilterEvent) {
        if self.events.send(event).is_err() {
            debug!("Tag filter: event receiver gone");
        }
    }

    fn push_text(&mut self, raw: &str) {
        if raw.is_empty() {
            return;
        }
        let text = decode_entities(raw);
        self.scouting.push_text(&text);
        self.route_text(&text);
    }

    /// Send text to the display and to the innermost open tag.
    fn route_text(&mut self, mut text: &str) {
        loop {
            let gratuitous = self.tag_stack.iter().any(|t| t.name == GRATUITOUS_TAG);
            let Some(top) = self.tag_stack.last_mut() else {
                self.plain_text.push_str(text);
                return;
            };
            if top.name == "xml" {
                self.plain_text.push_str(text);
                return;
            }

            let room = MAX_TAG_TEXT.saturating_sub(top.text.len());
            let fits = text.len() <= room;
            let cut = if fits {
                text.len()
            } else {
                floor_char_boundary(text, room)
            };
            top.text.push_str(&text[..cut]);
            if !gratuitous {
                self.plain_text.push_str(&text[..cut]);
            }
            if fits {
                return;
            }

            if let Some(runaway) = self.tag_stack.pop() {
                warn!(
                    "Tag filter: <{}> exceeded {} bytes, force-closed: {}",
                    runaway.name,
                    MAX_TAG_TEXT,
                    escape_log(&runaway.text)
                );
                metrics::inc_tags_dropped();
            }
            self.dropped.clear();
            text = &text[cut..];
        }
    }

    fn open_tags(&self) -> String {
        let names: Vec<&str> = self.tag_stack.iter().map(|t| t.name.as_str()).collect();
        format!("[{}]", names.join(", "))
    }
}
