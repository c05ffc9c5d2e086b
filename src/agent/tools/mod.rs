pub mod base;
pub mod browser;
pub mod cron;
pub mod filesystem;
pub mod github;
pub mod google_calendar;
pub mod google_common;
pub mod google_mail;
pub mod http;
pub mod image_gen;
pub mod mcp;
pub mod media;
pub mod memory_search;
pub mod obsidian;
pub mod reddit;
pub mod registry;
pub mod setup;
pub mod shell;
pub mod spawn;
pub mod subagent_control;
pub mod tmux;
pub mod todoist;
pub mod weather;
pub mod web;

pub use base::{
    ActionDescriptor, ExecutionContext, SubagentAccess, Tool, ToolCapabilities, ToolMiddleware,
    ToolResult, ToolVersion,
};
pub use registry::ToolRegistry;
