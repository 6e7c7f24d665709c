//! Shared domain types for the monitoring engine: the template/trigger
//! entity graph, alert events, id generation and the text sanitization rule
//! applied to every stored alert message.

pub mod id;
pub mod text;
pub mod types;
