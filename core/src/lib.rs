//! Verbatim core engine.
//! Checks that machine-extracted structured data is backed by the literal
//! text of its source document, block by block, and maps every word back to
//! its range in the serialized document so editors can highlight it.

pub mod assist;
pub mod config;
pub mod document;
pub mod error;
pub mod escape;
pub mod extract;
pub mod matcher;
pub mod normalize;
pub mod position;
pub mod segment;
pub mod serialize;
pub mod source;
pub mod verify;

pub use assist::{CommandAssistant, FixAssistant, FixRequest, FixResponse};
pub use config::{AssistantConfig, Config, EligibilityRules, SourceOptions};
pub use error::VerifyError;
pub use extract::{extract, extract_eligible, Anchor, FieldEntry, PathSegment};
pub use matcher::{matches, SourceIndex};
pub use normalize::normalize;
pub use position::{LineIndex, Location};
pub use serialize::to_canonical_string;
pub use verify::{
    resolve_fix_target, Classification, Highlight, MatchStats, VerificationState, Verifier,
};
