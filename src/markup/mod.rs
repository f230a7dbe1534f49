//! # MUME XML mode
//!
//! When asked to, MUME interleaves its output with a narrow pseudo-XML
//! vocabulary (`<room>`, `<name>`, `<description>`, `<exits>`, `<prompt>`,
//! `<movement dir=north/>`, ...). This module filters those tags out of the
//! character stream and reports each closed tag as an event.
//!
//! Sample input:
//!
//! ```text
//! <xml>XML mode is now on.
//! <prompt>!f- CW&gt;</prompt>f
//! You flee north.
//! <movement dir=north/>
//! <room><name>A Flat Marsh</name>
//! <description>The few, low patches of tangled rushes add a clear tone...
//! </description>A large green shrub grows in the middle of a large pool of mud.
//! </room><exits>Exits: north, east, south.
//! </exits>
//! </xml>XML mode is now off.
//! ```
//!
//! produces, in order, tag-close events for `prompt` (`!f- CW>`),
//! `movement` (attr `dir=north`), `name`, `description`, `room`, `exits`
//! and `xml`. Tag hierarchy is not conveyed. The `xml` tag never accumulates
//! text, since it would only grow for the whole session.
//!
//! MUME emits at most one attribute per tag during mortal sessions and never
//! quotes it; that is all the grammar accepts.

pub mod filter;
mod scouting;

pub use filter::TagStreamFilter;

/// Tags deeper than this are dropped.
pub const MAX_TAG_DEPTH: usize = 5;

/// Bytes of text a single tag may accumulate before it is force-closed.
pub const MAX_TAG_TEXT: usize = 1500;

/// Bytes allowed between offering XML mode and seeing `<xml>`.
pub const MARKUP_OFFER_WINDOW: usize = 1024;

/// Bytes of text after which a scouting peek is assumed to be over.
pub const SCOUTING_BUDGET: usize = 1024;

/// Opening sentinel of XML mode.
pub const XML_OPEN: &str = "<xml>";

/// Out-of-band request sent to the server to turn XML mode on.
pub const XML_MODE_REQUEST: &str = "~$#EX2\n3G\n";

/// Lines announcing that the session reached the login prompt. Asking for
/// XML mode earlier makes MUME repeat its banner.
pub const LOGIN_CUES: &[&str] = &["By what name do you wish to be known?", "Reconnecting."];

/// Tag wrapping text meant for the client only.
pub const GRATUITOUS_TAG: &str = "gratuitous";

/// Tags describing the room the player is in; withheld while scouting.
pub const ROOM_TAGS: &[&str] = &["room", "name", "description"];

/// A closed tag and the text it enclosed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub attr: String,
    pub text: String,
}

impl Tag {
    pub fn new(name: &str, attr: &str) -> Self {
        Self {
            name: name.to_string(),
            attr: attr.to_string(),
            text: String::new(),
        }
    }
}

/// Side-channel output of the filter, delivered in stream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterEvent {
    /// A tag was closed (or was self-closing).
    TagEnd(Tag),
    /// The server should be sent this request to enable XML mode.
    NegotiationRequest(String),
}

/// Whether and how the filter interprets markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupMode {
    /// Everything passes through verbatim; nothing can inject tags.
    Off,
    /// Waiting for the login prompt before asking for XML mode.
    NegotiationPending,
    /// XML mode was requested; watching for `<xml>` within a byte budget.
    MarkupOffered,
    /// Everything is parsed as markup.
    MarkupActive,
}
