//! State-change projector
//!
//! Turns change-feed records into one plain-text line each:
//! `POST + <record>` for inserts and `DELETE <record>` for removals.
//! Records arrive either from the in-process store's feed ([`consumer`]) or
//! as a Lambda-style `{"Records": [...]}` event ([`event`]).

pub mod consumer;
pub mod event;
pub mod projector;

pub use consumer::{run_projector, ProjectorTotals};
pub use event::{ChangeImages, ChangeRecord, StreamEvent};
pub use projector::{handle_batch, handle_event, project, render, unwrap_image, BatchReport, StreamError};
