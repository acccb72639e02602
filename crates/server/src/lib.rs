//! MCP server: dispatcher, registries, and built-in tools.
//!
//! An [`McpServer`] owns the tool/resource/prompt registries, dispatches
//! inbound JSON-RPC requests, and runs one execution loop per
//! network-facing transport. Built-in tools consume a generic
//! [`CommandExecutor`] capability — the concrete SQL engine is supplied by
//! the host.
//!
//! # Architecture
//!
//! - **server**: lifecycle, dispatch table, per-transport loops
//! - **registry**: concurrency-safe named registries with shared handles
//! - **tool** / **tools**: the tool handler seam and the built-in handlers
//! - **executor**: the command executor capability and statement
//!   classification
//! - **resources**: content-producing resource providers
//! - **prompts**: parameterized prompt templates
//! - **pending**: registrations queued before a server exists
//! - **stats**: atomic counters and the status snapshot

pub mod executor;
pub mod format;
pub mod pending;
pub mod prompts;
pub mod registry;
pub mod resources;
pub mod server;
pub mod stats;
pub mod tool;
pub mod tools;

pub use executor::{ColumnInfo, CommandExecutor, ExecutorError, FixtureExecutor, StatementKind, TableData};
pub use pending::{PendingRegistration, RegistrationQueue};
pub use prompts::{PromptArgument, PromptError, PromptTemplate};
pub use registry::{Registry, RegistryError};
pub use resources::{
    LiveResource, RefreshPolicy, ResourceEntry, ResourceError, ResourceProvider, SnapshotResource,
    StaticResource, TemplatedResource,
};
pub use server::{Lifecycle, McpServer, ServerError};
pub use stats::{ServerStats, ServerStatus};
pub use tool::{ToolError, ToolHandler};
