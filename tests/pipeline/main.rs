//! Pipeline tests against the in-memory broker
//!
//! The consumer runtime is wired exactly as the binary wires it, with the
//! production order handler wrapped in scripted fault injection. Time is
//! paused, so backoff intervals elapse instantly but remain measurable.

mod end_to_end;
mod harness;
mod lifecycle;
mod ordering;
mod scenarios;
