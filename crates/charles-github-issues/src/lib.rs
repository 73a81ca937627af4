//! Shared, IO-free helpers for the Charles GitHub issues bot.
//! This crate provides GitHub wire types, actionable-mention scanning,
//! command classification, reply rendering, `.charles.yml` parsing and
//! transport retry helpers consumed by the runtime crate.

pub mod charles_yml;
pub mod command_classifier;
pub mod command_text;
pub mod comment_scanner;
pub mod english;
pub mod github_transport_helpers;
pub mod github_types;
pub mod issue_comment;
pub mod mention;
