//! Broadcasting for application-wide assist events.

pub mod assist_events;

pub use assist_events::{AssistEvent, AssistEventBroadcaster, NoticeKind};
